// src/trial.rs
//
// Trial runner: drives one full episode for a policy variant against a fresh
// adapter, then settles and stages the raw trip report under a trial-unique
// path. The settle step is a bounded retry with exponential backoff, not a
// fixed sleep; the simulator's artifact flush is a known-flaky boundary.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::env::{AdapterError, EnvFactory};
use crate::metrics::MetricTuple;
use crate::policy::PolicyVariant;
use crate::types::{PolicyKind, TrialKey};

/// Bounded retry-with-backoff policy for the artifact settle after close.
#[derive(Debug, Clone)]
pub struct SettlePolicy {
    /// Maximum number of existence polls.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier (exponential backoff).
    pub backoff_multiplier: f64,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl SettlePolicy {
    /// Backoff to sleep after the given 0-based failed attempt.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(ms as u64).min(self.max_backoff)
    }
}

/// Errors raised while running or staging one trial.
#[derive(Debug)]
pub enum TrialError {
    /// The simulator session failed to start, step, or close.
    Adapter {
        key: TrialKey,
        source: AdapterError,
    },
    /// The raw artifact never became readable within the settle budget.
    ArtifactMissing { key: TrialKey, path: PathBuf },
    /// Copying the artifact to its trial-unique path failed.
    Stage {
        key: TrialKey,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for TrialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialError::Adapter { key, source } => write!(
                f,
                "Trial {}#{}: adapter failure: {}",
                key.variant.as_str(),
                key.run_index,
                source
            ),
            TrialError::ArtifactMissing { key, path } => write!(
                f,
                "Trial {}#{}: artifact '{}' missing after settle retries",
                key.variant.as_str(),
                key.run_index,
                path.display()
            ),
            TrialError::Stage { key, path, source } => write!(
                f,
                "Trial {}#{}: failed to stage artifact to '{}': {}",
                key.variant.as_str(),
                key.run_index,
                path.display(),
                source
            ),
        }
    }
}

impl std::error::Error for TrialError {}

/// One trial's record. Created by the runner with metrics unset; the
/// orchestrator assigns the extracted tuple exactly once.
#[derive(Debug, Clone)]
pub struct Trial {
    pub variant: PolicyKind,
    pub run_index: usize,
    pub seed: u64,
    pub steps: u64,
    /// Whether the variant's termination predicate fired before the bound.
    pub completed: bool,
    /// Trial-unique staged artifact path.
    pub artifact_path: PathBuf,
    pub metrics: Option<MetricTuple>,
}

/// Runs one episode per call against a fresh adapter and stages its output.
pub struct TrialRunner<F: EnvFactory> {
    factory: F,
    staging_dir: PathBuf,
    settle: SettlePolicy,
    max_steps: u64,
}

impl<F: EnvFactory> TrialRunner<F> {
    pub fn new(factory: F, staging_dir: PathBuf, settle: SettlePolicy, max_steps: u64) -> Self {
        Self {
            factory,
            staging_dir,
            settle,
            max_steps,
        }
    }

    /// Run one trial: acquire adapter, drive the episode, release, settle,
    /// stage. The adapter is released on every exit path, including an
    /// episode failure mid-run.
    pub fn run(
        &self,
        variant: &mut PolicyVariant,
        run_index: usize,
        seed: u64,
    ) -> Result<Trial, TrialError> {
        let key = TrialKey::new(variant.kind(), run_index);

        let mut env = self
            .factory
            .open(seed)
            .map_err(|source| TrialError::Adapter { key, source })?;

        let episode = variant.run_episode(env.as_mut(), self.max_steps);

        // Release the session before surfacing any episode error; the
        // adapter's Drop is only the backstop.
        let close_result = env.close();

        let stats = episode.map_err(|source| TrialError::Adapter { key, source })?;
        close_result.map_err(|source| TrialError::Adapter { key, source })?;

        let raw = env.artifact_path().to_path_buf();
        let staged = self.stage_artifact(&raw, key)?;

        Ok(Trial {
            variant: key.variant,
            run_index,
            seed,
            steps: stats.steps,
            completed: stats.completed,
            artifact_path: staged,
            metrics: None,
        })
    }

    /// Wait for the raw artifact to settle, then copy it to the trial-unique
    /// staged path `<staging_dir>/<variant>_<run>.tripinfo.xml`.
    fn stage_artifact(&self, raw: &Path, key: TrialKey) -> Result<PathBuf, TrialError> {
        if !wait_for_artifact(raw, &self.settle) {
            return Err(TrialError::ArtifactMissing {
                key,
                path: raw.to_path_buf(),
            });
        }

        let staged = self.staged_path(key);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(|source| TrialError::Stage {
                key,
                path: staged.clone(),
                source,
            })?;
        }
        fs::copy(raw, &staged).map_err(|source| TrialError::Stage {
            key,
            path: staged.clone(),
            source,
        })?;
        Ok(staged)
    }

    /// Trial-unique staged artifact path for a key.
    pub fn staged_path(&self, key: TrialKey) -> PathBuf {
        self.staging_dir
            .join(format!("{}.tripinfo.xml", key.file_stem()))
    }
}

/// Poll until the artifact exists and is non-empty, sleeping with
/// exponential backoff between attempts. Returns false once the retry
/// budget is exhausted.
fn wait_for_artifact(path: &Path, settle: &SettlePolicy) -> bool {
    for attempt in 0..settle.max_attempts {
        if fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false) {
            return true;
        }
        if attempt + 1 < settle.max_attempts {
            thread::sleep(settle.backoff_for(attempt));
        }
    }
    false
}
