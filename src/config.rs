// src/config.rs
//
// Central run configuration for the benchmark harness. All parameters are
// fixed for the lifetime of a run: trial count, seeding, agent shape,
// synthetic traffic knobs, output locations, and the artifact settle policy.
//
// Resolution precedence: CLI > GREENWAVE_* environment > run spec > default.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::scenario::RunSpec;
use crate::trial::SettlePolicy;

/// Errors raised by configuration validation.
#[derive(Debug, Clone)]
pub enum ConfigError {
    Invalid { field: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { field, message } => {
                write!(f, "Invalid config '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Full configuration for one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Human-readable config / release version.
    pub version: &'static str,
    /// Scenario identifier carried into artifacts and logs.
    pub scenario_id: String,
    /// Number of trials per variant (K).
    pub trials: usize,
    /// Base seed; run i uses `seed + (i - 1)`, shared by both variants.
    pub seed: u64,
    /// Signalised intersections (agents).
    pub n_agents: usize,
    /// Observation vector length per agent.
    pub obs_dim: usize,
    /// Approaches per intersection = discrete action count.
    pub act_dim: usize,
    /// Step bound per episode; guards a non-terminating environment.
    pub max_steps: u64,
    /// Steps during which new vehicles may enter.
    pub spawn_horizon: u64,
    /// Per-approach arrival probability per step.
    pub arrival_rate: f64,
    /// Fixed-time plan: steps each approach holds green.
    pub green_period: u64,
    /// Vehicles served per green approach per step.
    pub saturation: usize,
    /// Output directory for artifacts and reports.
    pub out_dir: PathBuf,
    /// Learned policy weights; untrained fallback when absent.
    pub weights_path: Option<PathBuf>,
    /// Artifact settle retry policy.
    pub settle: SettlePolicy,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            version: "greenwave-0.3.0",
            scenario_id: "uniform_grid".to_string(),
            trials: 5,
            seed: 42,
            n_agents: 2,
            obs_dim: 10,
            act_dim: 2,
            max_steps: 5_000,
            spawn_horizon: 600,
            arrival_rate: 0.25,
            green_period: 10,
            saturation: 2,
            out_dir: PathBuf::from("runs/bench"),
            weights_path: None,
            settle: SettlePolicy::default(),
        }
    }
}

impl BenchConfig {
    /// Defaults overridden by `GREENWAVE_*` environment variables.
    ///
    /// Recognized:
    /// - GREENWAVE_TRIALS, GREENWAVE_SEED, GREENWAVE_AGENTS
    /// - GREENWAVE_OBS_DIM, GREENWAVE_ACT_DIM, GREENWAVE_MAX_STEPS
    /// - GREENWAVE_SPAWN_HORIZON, GREENWAVE_ARRIVAL_RATE
    /// - GREENWAVE_GREEN_PERIOD, GREENWAVE_SATURATION
    /// - GREENWAVE_OUT_DIR, GREENWAVE_WEIGHTS
    /// - GREENWAVE_SETTLE_MAX, GREENWAVE_SETTLE_BACKOFF_MS
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Apply `GREENWAVE_*` overrides on top of the current values.
    pub fn apply_env(&mut self) {
        let cfg = self;

        if let Some(v) = env_parse::<usize>("GREENWAVE_TRIALS") {
            cfg.trials = v;
        }
        if let Some(v) = env_parse::<u64>("GREENWAVE_SEED") {
            cfg.seed = v;
        }
        if let Some(v) = env_parse::<usize>("GREENWAVE_AGENTS") {
            cfg.n_agents = v;
        }
        if let Some(v) = env_parse::<usize>("GREENWAVE_OBS_DIM") {
            cfg.obs_dim = v;
        }
        if let Some(v) = env_parse::<usize>("GREENWAVE_ACT_DIM") {
            cfg.act_dim = v;
        }
        if let Some(v) = env_parse::<u64>("GREENWAVE_MAX_STEPS") {
            cfg.max_steps = v;
        }
        if let Some(v) = env_parse::<u64>("GREENWAVE_SPAWN_HORIZON") {
            cfg.spawn_horizon = v;
        }
        if let Some(v) = env_parse::<f64>("GREENWAVE_ARRIVAL_RATE") {
            cfg.arrival_rate = v;
        }
        if let Some(v) = env_parse::<u64>("GREENWAVE_GREEN_PERIOD") {
            cfg.green_period = v;
        }
        if let Some(v) = env_parse::<usize>("GREENWAVE_SATURATION") {
            cfg.saturation = v;
        }
        if let Ok(v) = env::var("GREENWAVE_OUT_DIR") {
            if !v.is_empty() {
                cfg.out_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = env::var("GREENWAVE_WEIGHTS") {
            if !v.is_empty() {
                cfg.weights_path = Some(PathBuf::from(v));
            }
        }
        if let Some(v) = env_parse::<u32>("GREENWAVE_SETTLE_MAX") {
            cfg.settle.max_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("GREENWAVE_SETTLE_BACKOFF_MS") {
            cfg.settle.initial_backoff = Duration::from_millis(v);
        }
    }

    /// Replace the spec-covered fields from a run spec.
    ///
    /// Callers apply env and CLI overrides afterwards so precedence stays
    /// CLI > env > spec > default.
    pub fn apply_spec(&mut self, spec: &RunSpec) {
        self.scenario_id = spec.spec_id.clone();
        self.trials = spec.trials;
        self.seed = spec.seed;
        self.n_agents = spec.agents.count;
        self.obs_dim = spec.agents.obs_dim;
        self.act_dim = spec.agents.act_dim;
        self.max_steps = spec.horizon.max_steps;
        self.spawn_horizon = spec.traffic.spawn_horizon;
        self.arrival_rate = spec.traffic.arrival_rate;
        self.green_period = spec.traffic.green_period;
        self.saturation = spec.traffic.saturation;
        self.out_dir = PathBuf::from(&spec.out_dir);
        if let Some(w) = &spec.weights {
            self.weights_path = Some(PathBuf::from(w));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &str, message: &str) -> ConfigError {
            ConfigError::Invalid {
                field: field.to_string(),
                message: message.to_string(),
            }
        }

        if self.trials == 0 {
            return Err(invalid("trials", "must be >= 1"));
        }
        if self.n_agents == 0 {
            return Err(invalid("n_agents", "must be >= 1"));
        }
        if self.act_dim == 0 {
            return Err(invalid("act_dim", "must be >= 1"));
        }
        if self.obs_dim == 0 {
            return Err(invalid("obs_dim", "must be >= 1"));
        }
        if self.max_steps == 0 {
            return Err(invalid("max_steps", "must be >= 1"));
        }
        if self.spawn_horizon == 0 {
            return Err(invalid("spawn_horizon", "must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.arrival_rate) {
            return Err(invalid("arrival_rate", "must be within [0, 1]"));
        }
        if self.green_period == 0 {
            return Err(invalid("green_period", "must be >= 1"));
        }
        if self.saturation == 0 {
            return Err(invalid("saturation", "must be >= 1"));
        }
        if self.settle.max_attempts == 0 {
            return Err(invalid("settle.max_attempts", "must be >= 1"));
        }
        Ok(())
    }

    /// Seed for a 1-based run index; both variants of a run share it.
    pub fn run_seed(&self, run_index: usize) -> u64 {
        self.seed.wrapping_add(run_index as u64 - 1)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
