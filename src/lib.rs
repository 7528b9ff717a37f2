//! Greenwave core library.
//!
//! Comparative benchmark harness for traffic-signal control: runs a learned
//! multi-agent controller and the simulator's built-in fixed-time plan
//! through K stochastic trials each, extracts a standardized metric tuple
//! from every trial's trip report, and reduces the tuples into a
//! mean/std/improvement comparison report. The binary (`src/main.rs`) is a
//! thin CLI around these components.
//!
//! # Architecture
//!
//! - **Environment boundary** (`env`): `TrafficEnv` trait (reset / step /
//!   advance / close) plus the deterministic synthetic simulator used for
//!   benchmarking; one simulator session per trial.
//! - **Policy boundary** (`policy`): `LearnedPolicy` loaded from a JSON
//!   weights file, and `PolicyVariant`, the tagged Learned/Static variant
//!   whose arms keep their own termination predicates.
//! - **Trial runner** (`trial`): drives one episode, releases the session,
//!   settles the artifact with bounded retry-backoff, and stages it under a
//!   trial-unique path.
//! - **Metric extraction** (`metrics`): pure function of the staged trip
//!   report; fixed metric tuple, 2-decimal reporting precision.
//! - **Aggregation** (`aggregate`): per-variant mean and unbiased sample
//!   std (0 for a single sample), percent improvement with an explicit
//!   zero-baseline guard, K'-of-K sample accounting.
//! - **Reporting** (`report`): console / Markdown / JSON renderers behind a
//!   sink trait.
//! - **Orchestration** (`harness`): forward-only phase machine; per-trial
//!   failures degrade the sample count instead of aborting the run.

pub mod aggregate;
pub mod config;
pub mod env;
pub mod harness;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod policy;
pub mod report;
pub mod scenario;
pub mod trial;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use aggregate::{AggregateError, ComparisonReport, TrialAggregator, TrialFailure, VariantStats};
pub use config::{BenchConfig, ConfigError};
pub use env::{AdapterError, EnvFactory, SimEnvFactory, SimTrafficEnv, TrafficEnv};
pub use harness::{BenchHarness, HarnessError, HarnessPhase};
pub use logging::{FileSink, NoopSink, TrialSink};
pub use metrics::{extract, MetricError, MetricTuple, METRIC_NAMES};
pub use output::{create_run_dirs, write_trial_summary, RunPaths, TrialSummary};
pub use policy::{
    Decision, EpisodeStats, LearnedPolicy, PolicyError, PolicyVariant, POLICY_VERSION,
};
pub use report::{
    print_console_summary, write_json_report, write_markdown_report, ConsoleRenderer,
    JsonRenderer, MarkdownRenderer, ReportRenderer,
};
pub use scenario::{AgentSpec, HorizonSpec, RunSpec, SpecError, TrafficSpec, RUN_SPEC_VERSION};
pub use trial::{SettlePolicy, Trial, TrialError, TrialRunner};
pub use types::{AgentObs, PhaseAction, PolicyKind, SimTime, StepOutcome, TrialKey};
