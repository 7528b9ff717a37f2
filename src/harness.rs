// src/harness.rs
//
// Orchestrator: drives K trials per variant through the trial runner and
// metric extractor, feeds the aggregator, and hands the finalized report to
// the renderers.
//
// Phases move strictly forward: Init -> RunningTrials -> Aggregating ->
// Reporting -> Done. A single trial failure is recorded and degrades the
// sample count; it never aborts the run.

use std::fmt;
use std::io;

use crate::aggregate::{AggregateError, ComparisonReport, TrialAggregator};
use crate::config::BenchConfig;
use crate::env::EnvFactory;
use crate::logging::{NoopSink, TrialSink};
use crate::metrics::{self, METRIC_NAMES};
use crate::output::{self, RunPaths};
use crate::policy::PolicyVariant;
use crate::report::{self, ReportRenderer};
use crate::trial::TrialRunner;
use crate::types::PolicyKind;

/// Orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HarnessPhase {
    Init,
    RunningTrials,
    Aggregating,
    Reporting,
    Done,
}

/// Errors that end the whole run (per-trial failures do not).
#[derive(Debug)]
pub enum HarnessError {
    Aggregate(AggregateError),
    Render { source: io::Error },
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessError::Aggregate(e) => write!(f, "Aggregation failed: {}", e),
            HarnessError::Render { source } => write!(f, "Report rendering failed: {}", source),
        }
    }
}

impl std::error::Error for HarnessError {}

/// Benchmark orchestrator for one run.
pub struct BenchHarness<F: EnvFactory> {
    cfg: BenchConfig,
    paths: RunPaths,
    runner: TrialRunner<F>,
    learned: PolicyVariant,
    baseline: PolicyVariant,
    sink: Box<dyn TrialSink>,
    renderers: Vec<Box<dyn ReportRenderer>>,
    verbosity: u8,
    phase: HarnessPhase,
}

impl<F: EnvFactory> BenchHarness<F> {
    /// Wire a harness from pre-resolved paths and an adapter factory.
    pub fn new(cfg: BenchConfig, paths: RunPaths, factory: F, learned: PolicyVariant) -> Self {
        let runner = TrialRunner::new(
            factory,
            paths.trials_dir.clone(),
            cfg.settle.clone(),
            cfg.max_steps,
        );
        Self {
            cfg,
            paths,
            runner,
            learned,
            baseline: PolicyVariant::Static,
            sink: Box::new(NoopSink),
            renderers: Vec::new(),
            verbosity: 0,
            phase: HarnessPhase::Init,
        }
    }

    /// Set the per-trial telemetry sink.
    pub fn with_sink(mut self, sink: Box<dyn TrialSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Add a report renderer.
    pub fn with_renderer(mut self, renderer: Box<dyn ReportRenderer>) -> Self {
        self.renderers.push(renderer);
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn phase(&self) -> HarnessPhase {
        self.phase
    }

    fn enter(&mut self, next: HarnessPhase) {
        debug_assert!(next >= self.phase, "no backward phase transitions");
        self.phase = next;
    }

    /// Execute the full run and return the finalized report.
    pub fn run(&mut self) -> Result<ComparisonReport, HarnessError> {
        self.enter(HarnessPhase::RunningTrials);

        let metric_names: Vec<String> = METRIC_NAMES.iter().map(|s| s.to_string()).collect();
        let mut agg = TrialAggregator::new(metric_names, self.cfg.trials);

        for run_index in 1..=self.cfg.trials {
            let seed = self.cfg.run_seed(run_index);
            if self.verbosity >= 1 {
                println!("run {}/{} seed={}", run_index, self.cfg.trials, seed);
            }
            self.run_one(&mut agg, PolicyKind::Learned, run_index, seed);
            self.run_one(&mut agg, PolicyKind::Static, run_index, seed);
        }

        self.enter(HarnessPhase::Aggregating);
        let failures = agg.failures();
        let report = agg.finalize().map_err(HarnessError::Aggregate)?;

        self.enter(HarnessPhase::Reporting);
        for renderer in self.renderers.iter_mut() {
            renderer
                .render(&report)
                .map_err(|source| HarnessError::Render { source })?;
        }
        if !failures.is_empty() {
            let _ = report::print_failures(&failures, io::stderr());
        }

        self.enter(HarnessPhase::Done);
        Ok(report)
    }

    /// Run one trial for one variant; failures are recorded, not raised.
    fn run_one(
        &mut self,
        agg: &mut TrialAggregator,
        kind: PolicyKind,
        run_index: usize,
        seed: u64,
    ) {
        let runner = &self.runner;
        let variant = match kind {
            PolicyKind::Learned => &mut self.learned,
            PolicyKind::Static => &mut self.baseline,
        };

        let trial = match runner.run(variant, run_index, seed) {
            Ok(trial) => trial,
            Err(e) => {
                let reason = e.to_string();
                eprintln!("trial {}#{} failed: {}", kind.as_str(), run_index, reason);
                self.sink.trial_failed(kind, run_index, &reason);
                agg.record_failure(kind, run_index, reason);
                return;
            }
        };

        match metrics::extract(&trial.artifact_path) {
            Ok(tuple) => {
                let mut trial = trial;
                trial.metrics = Some(tuple.clone());

                if let Err(e) = output::write_trial_summary(&self.paths.trials_dir, &trial) {
                    eprintln!(
                        "trial {}#{}: summary write failed: {}",
                        kind.as_str(),
                        run_index,
                        e
                    );
                }
                self.sink.trial_completed(&trial);

                if self.verbosity >= 1 {
                    println!(
                        "  {:<8} steps={:<6} tt={:>8.2} co2={:>8.2} fuel={:>6.2}",
                        kind.as_str(),
                        trial.steps,
                        tuple.values()[0],
                        tuple.values()[1],
                        tuple.values()[2],
                    );
                }

                if let Err(e) = agg.add(kind, tuple) {
                    agg.record_failure(kind, run_index, e.to_string());
                }
            }
            Err(e) => {
                let reason = e.to_string();
                eprintln!("trial {}#{} failed: {}", kind.as_str(), run_index, reason);
                self.sink.trial_failed(kind, run_index, &reason);
                agg.record_failure(kind, run_index, reason);
            }
        }
    }
}
