// src/policy.rs
//
// Control policy boundary.
// - LearnedPolicy: per-agent linear heads loaded from a JSON weights file;
//   deterministic argmax action selection with log-prob and value outputs.
// - PolicyVariant: tagged variant over Learned / Static exposing a common
//   run_episode capability. The two arms keep their own termination
//   predicates: Learned stops when the adapter reports done, Static when the
//   environment reports no vehicles remaining.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::env::{AdapterError, TrafficEnv};
use crate::types::{PhaseAction, PolicyKind};

/// Current learned policy schema version.
pub const POLICY_VERSION: &str = "linear-v1";

/// Errors raised while loading or validating a weights file.
#[derive(Debug, Clone)]
pub enum PolicyError {
    WeightsIo { path: String, source: String },
    WeightsParse { path: String, source: String },
    Shape { path: String, message: String },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::WeightsIo { path, source } => {
                write!(f, "Failed to read weights file '{}': {}", path, source)
            }
            PolicyError::WeightsParse { path, source } => {
                write!(f, "Failed to parse weights file '{}': {}", path, source)
            }
            PolicyError::Shape { path, message } => {
                write!(f, "Bad weights shape in '{}': {}", path, message)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Decision returned for one agent. Only `action` is consumed by the
/// benchmark core; log_prob and value mirror the training-side interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub action: PhaseAction,
    pub log_prob: f64,
    pub value: f64,
}

/// Linear heads for one agent: `w` is act_dim x obs_dim, `b` is act_dim,
/// `v` is the obs_dim value head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHeads {
    pub w: Vec<Vec<f64>>,
    pub b: Vec<f64>,
    pub v: Vec<f64>,
}

/// On-disk weights schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsFile {
    #[serde(default = "default_policy_version")]
    pub policy_version: String,
    pub obs_dim: usize,
    pub act_dim: usize,
    pub agents: Vec<AgentHeads>,
}

fn default_policy_version() -> String {
    POLICY_VERSION.to_string()
}

/// Learned signal controller: one linear policy head per agent.
#[derive(Debug, Clone)]
pub struct LearnedPolicy {
    version: String,
    obs_dim: usize,
    act_dim: usize,
    agents: Vec<AgentHeads>,
}

impl LearnedPolicy {
    /// Load weights from a JSON file, validating every head's shape.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        let path_str = path.as_ref().display().to_string();
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| PolicyError::WeightsIo {
            path: path_str.clone(),
            source: e.to_string(),
        })?;
        let file: WeightsFile =
            serde_json::from_str(&contents).map_err(|e| PolicyError::WeightsParse {
                path: path_str.clone(),
                source: e.to_string(),
            })?;
        Self::from_weights(file, &path_str)
    }

    fn from_weights(file: WeightsFile, path: &str) -> Result<Self, PolicyError> {
        if file.obs_dim == 0 || file.act_dim == 0 {
            return Err(PolicyError::Shape {
                path: path.to_string(),
                message: "obs_dim and act_dim must be >= 1".to_string(),
            });
        }
        if file.agents.is_empty() {
            return Err(PolicyError::Shape {
                path: path.to_string(),
                message: "agents list cannot be empty".to_string(),
            });
        }
        for (i, heads) in file.agents.iter().enumerate() {
            if heads.w.len() != file.act_dim {
                return Err(PolicyError::Shape {
                    path: path.to_string(),
                    message: format!(
                        "agents[{}].w has {} rows, expected act_dim={}",
                        i,
                        heads.w.len(),
                        file.act_dim
                    ),
                });
            }
            if heads.w.iter().any(|row| row.len() != file.obs_dim) {
                return Err(PolicyError::Shape {
                    path: path.to_string(),
                    message: format!("agents[{}].w rows must have obs_dim={} columns", i, file.obs_dim),
                });
            }
            if heads.b.len() != file.act_dim {
                return Err(PolicyError::Shape {
                    path: path.to_string(),
                    message: format!("agents[{}].b must have act_dim={} entries", i, file.act_dim),
                });
            }
            if heads.v.len() != file.obs_dim {
                return Err(PolicyError::Shape {
                    path: path.to_string(),
                    message: format!("agents[{}].v must have obs_dim={} entries", i, file.obs_dim),
                });
            }
        }

        Ok(Self {
            version: file.policy_version,
            obs_dim: file.obs_dim,
            act_dim: file.act_dim,
            agents: file.agents,
        })
    }

    /// Zero-initialised policy (uniform over actions, argmax picks phase 0).
    /// Used when no weights file is supplied.
    pub fn untrained(n_agents: usize, obs_dim: usize, act_dim: usize) -> Self {
        let n_agents = n_agents.max(1);
        let obs_dim = obs_dim.max(1);
        let act_dim = act_dim.max(1);
        let heads = AgentHeads {
            w: vec![vec![0.0; obs_dim]; act_dim],
            b: vec![0.0; act_dim],
            v: vec![0.0; obs_dim],
        };
        Self {
            version: format!("{}-untrained", POLICY_VERSION),
            obs_dim,
            act_dim,
            agents: vec![heads; n_agents],
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    /// Deterministic action selection for one agent.
    ///
    /// Same observation always produces the same decision. Observations
    /// shorter than obs_dim are treated as zero-padded.
    pub fn select_action(&self, agent_index: usize, obs: &[f64]) -> Decision {
        let heads = &self.agents[agent_index % self.agents.len()];

        let logits: Vec<f64> = heads
            .w
            .iter()
            .zip(heads.b.iter())
            .map(|(row, b)| *b + row.iter().zip(obs.iter()).map(|(w, x)| w * x).sum::<f64>())
            .collect();

        // Argmax with lowest-index tie-break.
        let mut best = 0usize;
        for (i, &l) in logits.iter().enumerate() {
            if l > logits[best] {
                best = i;
            }
        }

        // Stable log-softmax for the chosen action's log-probability.
        let max_logit = logits[best];
        let log_sum: f64 = logits.iter().map(|l| (l - max_logit).exp()).sum::<f64>().ln();
        let log_prob = (logits[best] - max_logit) - log_sum;

        let value = heads
            .v
            .iter()
            .zip(obs.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>();

        Decision {
            action: best,
            log_prob,
            value,
        }
    }
}

/// Outcome of one driven episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeStats {
    /// Steps executed.
    pub steps: u64,
    /// Whether the variant's own termination predicate fired (false when the
    /// step bound cut the episode short).
    pub completed: bool,
}

/// The two interchangeable simulation-driving policies.
pub enum PolicyVariant {
    Learned(LearnedPolicy),
    Static,
}

impl PolicyVariant {
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyVariant::Learned(_) => PolicyKind::Learned,
            PolicyVariant::Static => PolicyKind::Static,
        }
    }

    /// Drive one full episode against a fresh adapter.
    ///
    /// Both arms are bounded by `max_steps` to guard against an environment
    /// that never terminates; hitting the bound is recorded, not an error.
    pub fn run_episode(
        &mut self,
        env: &mut dyn TrafficEnv,
        max_steps: u64,
    ) -> Result<EpisodeStats, AdapterError> {
        match self {
            PolicyVariant::Learned(policy) => {
                let mut states = env.reset()?;
                let mut steps = 0u64;
                let mut done = false;
                while !done && steps < max_steps {
                    let actions: Vec<PhaseAction> = states
                        .iter()
                        .enumerate()
                        .map(|(i, obs)| policy.select_action(i, obs).action)
                        .collect();
                    let out = env.step(&actions)?;
                    states = out.states;
                    done = out.done;
                    steps += 1;
                }
                Ok(EpisodeStats {
                    steps,
                    completed: done,
                })
            }
            PolicyVariant::Static => {
                env.reset()?;
                let mut steps = 0u64;
                let mut drained = false;
                while steps < max_steps {
                    let remaining = env.advance()?;
                    steps += 1;
                    if remaining == 0 {
                        drained = true;
                        break;
                    }
                }
                Ok(EpisodeStats {
                    steps,
                    completed: drained,
                })
            }
        }
    }
}
