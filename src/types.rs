// src/types.rs
//
// Small shared types for the benchmark harness: policy variant tags,
// trial keys, and the per-step environment exchange types.

use serde::{Deserialize, Serialize};

/// Simulation clock in whole seconds from episode start.
pub type SimTime = u64;

/// Observation slice for one signalised intersection (fixed arity per run).
pub type AgentObs = Vec<f64>;

/// Discrete phase command for one intersection: index of the approach
/// that receives green this step.
pub type PhaseAction = usize;

/// Which control policy drove a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Learned controller selects phases from per-agent observations.
    Learned,
    /// The environment's own fixed-time plan drives the episode.
    Static,
}

impl PolicyKind {
    /// Stable lowercase name (used in paths, logs, report keys).
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Learned => "learned",
            PolicyKind::Static => "static",
        }
    }

    /// Human-readable label for report tables.
    pub fn label(&self) -> &'static str {
        match self {
            PolicyKind::Learned => "Learned controller",
            PolicyKind::Static => "Static baseline",
        }
    }
}

/// Unique key for one trial: variant plus 1-based run index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrialKey {
    pub variant: PolicyKind,
    pub run_index: usize,
}

impl TrialKey {
    pub fn new(variant: PolicyKind, run_index: usize) -> Self {
        Self { variant, run_index }
    }

    /// File stem for staged artifacts and summaries, e.g. `learned_003`.
    pub fn file_stem(&self) -> String {
        format!("{}_{:03}", self.variant.as_str(), self.run_index)
    }
}

/// Outcome of one environment step under external (learned) control.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Post-step observation per agent.
    pub states: Vec<AgentObs>,
    /// Per-agent step reward (negative congestion). Not consumed by the
    /// benchmark core; surfaced for parity with the training interface.
    pub rewards: Vec<f64>,
    /// Whether the episode has terminated.
    pub done: bool,
}
