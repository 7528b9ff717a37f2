// src/scenario.rs
//
// Versioned run spec (YAML-parsed). A spec fully defines a benchmark run:
// trial count, seeding, agent shape, traffic model knobs, and output
// directory, so runs are reproducible and CI-comparable.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Current run spec schema version.
pub const RUN_SPEC_VERSION: u32 = 1;

/// Agent shape: intersection count and policy interface dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default = "default_agent_count")]
    pub count: usize,
    #[serde(default = "default_obs_dim")]
    pub obs_dim: usize,
    #[serde(default = "default_act_dim")]
    pub act_dim: usize,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            count: default_agent_count(),
            obs_dim: default_obs_dim(),
            act_dim: default_act_dim(),
        }
    }
}

fn default_agent_count() -> usize {
    2
}

fn default_obs_dim() -> usize {
    10
}

fn default_act_dim() -> usize {
    2
}

/// Synthetic traffic model knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficSpec {
    #[serde(default = "default_arrival_rate")]
    pub arrival_rate: f64,
    #[serde(default = "default_spawn_horizon")]
    pub spawn_horizon: u64,
    #[serde(default = "default_green_period")]
    pub green_period: u64,
    #[serde(default = "default_saturation")]
    pub saturation: usize,
}

impl Default for TrafficSpec {
    fn default() -> Self {
        Self {
            arrival_rate: default_arrival_rate(),
            spawn_horizon: default_spawn_horizon(),
            green_period: default_green_period(),
            saturation: default_saturation(),
        }
    }
}

fn default_arrival_rate() -> f64 {
    0.25
}

fn default_spawn_horizon() -> u64 {
    600
}

fn default_green_period() -> u64 {
    10
}

fn default_saturation() -> usize {
    2
}

/// Episode horizon bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonSpec {
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

impl Default for HorizonSpec {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> u64 {
    5_000
}

/// Run spec manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpec {
    /// Unique spec identifier (used for artifact labeling).
    pub spec_id: String,
    /// Schema version.
    pub spec_version: u32,
    /// Trials per variant (K).
    #[serde(default = "default_trials")]
    pub trials: usize,
    /// Base seed for the run.
    #[serde(default)]
    pub seed: u64,
    /// Output directory for run artifacts.
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    #[serde(default)]
    pub agents: AgentSpec,
    #[serde(default)]
    pub traffic: TrafficSpec,
    #[serde(default)]
    pub horizon: HorizonSpec,
    /// Optional learned policy weights path.
    #[serde(default)]
    pub weights: Option<String>,
}

fn default_trials() -> usize {
    5
}

fn default_out_dir() -> String {
    "runs/bench".to_string()
}

impl RunSpec {
    /// Load a run spec from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SpecError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| SpecError::IoError {
            path: path.as_ref().display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a run spec from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SpecError> {
        let spec: RunSpec = serde_yaml::from_str(yaml).map_err(|e| SpecError::ParseError {
            source: e.to_string(),
        })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the run spec.
    pub fn validate(&self) -> Result<(), SpecError> {
        fn invalid(field: &str, message: &str) -> SpecError {
            SpecError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            }
        }

        if self.spec_id.is_empty() {
            return Err(invalid("spec_id", "spec_id cannot be empty"));
        }
        if self.spec_version == 0 {
            return Err(invalid("spec_version", "spec_version must be >= 1"));
        }
        if self.spec_version > RUN_SPEC_VERSION {
            return Err(invalid(
                "spec_version",
                "spec_version is newer than this binary supports",
            ));
        }
        if self.trials == 0 {
            return Err(invalid("trials", "trials must be >= 1"));
        }
        if self.agents.count == 0 {
            return Err(invalid("agents.count", "agent count must be >= 1"));
        }
        if self.agents.act_dim == 0 {
            return Err(invalid("agents.act_dim", "act_dim must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.traffic.arrival_rate) {
            return Err(invalid("traffic.arrival_rate", "must be within [0, 1]"));
        }
        if self.horizon.max_steps == 0 {
            return Err(invalid("horizon.max_steps", "max_steps must be >= 1"));
        }
        Ok(())
    }
}

/// Errors that can occur when working with run specs.
#[derive(Debug, Clone)]
pub enum SpecError {
    IoError { path: String, source: String },
    ParseError { source: String },
    ValidationError { field: String, message: String },
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecError::IoError { path, source } => {
                write!(f, "Failed to read run spec '{}': {}", path, source)
            }
            SpecError::ParseError { source } => {
                write!(f, "Failed to parse run spec YAML: {}", source)
            }
            SpecError::ValidationError { field, message } => {
                write!(f, "Run spec validation error in '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for SpecError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_spec() {
        let yaml = r#"
spec_id: grid_smoke_v1
spec_version: 1
trials: 3
seed: 42
out_dir: runs/smoke

agents:
  count: 2
  obs_dim: 10
  act_dim: 2

traffic:
  arrival_rate: 0.3
  spawn_horizon: 200
  green_period: 12
  saturation: 2

horizon:
  max_steps: 4000

weights: models/grid.json
"#;
        let spec = RunSpec::from_yaml_str(yaml).expect("Should parse");
        assert_eq!(spec.spec_id, "grid_smoke_v1");
        assert_eq!(spec.trials, 3);
        assert_eq!(spec.seed, 42);
        assert_eq!(spec.agents.count, 2);
        assert_eq!(spec.traffic.green_period, 12);
        assert_eq!(spec.horizon.max_steps, 4000);
        assert_eq!(spec.weights.as_deref(), Some("models/grid.json"));
    }

    #[test]
    fn defaults_apply_for_omitted_sections() {
        let yaml = r#"
spec_id: minimal
spec_version: 1
"#;
        let spec = RunSpec::from_yaml_str(yaml).expect("Should parse");
        assert_eq!(spec.trials, 5);
        assert_eq!(spec.seed, 0);
        assert_eq!(spec.out_dir, "runs/bench");
        assert_eq!(spec.agents.count, 2);
        assert_eq!(spec.traffic.arrival_rate, 0.25);
        assert_eq!(spec.horizon.max_steps, 5_000);
        assert!(spec.weights.is_none());
    }

    #[test]
    fn empty_spec_id_rejected() {
        let yaml = r#"
spec_id: ""
spec_version: 1
"#;
        assert!(RunSpec::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn zero_trials_rejected() {
        let yaml = r#"
spec_id: t
spec_version: 1
trials: 0
"#;
        assert!(RunSpec::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn future_schema_version_rejected() {
        let yaml = r#"
spec_id: t
spec_version: 99
"#;
        let result = RunSpec::from_yaml_str(yaml);
        assert!(matches!(
            result,
            Err(SpecError::ValidationError { .. })
        ));
    }

    #[test]
    fn out_of_range_arrival_rate_rejected() {
        let yaml = r#"
spec_id: t
spec_version: 1
traffic:
  arrival_rate: 1.5
"#;
        assert!(RunSpec::from_yaml_str(yaml).is_err());
    }
}
