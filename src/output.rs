// src/output.rs
//
// Output layout for one benchmark run:
//   <out_dir>/tripinfo.xml                      raw simulator output (reused per trial)
//   <out_dir>/trials/<variant>_<run>.tripinfo.xml   staged per-trial artifact
//   <out_dir>/trials/<variant>_<run>.summary.json   per-trial summary
//   <out_dir>/report.md / report.json           finalized comparison report
//   <out_dir>/trials.jsonl                      per-trial telemetry stream

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::metrics::MetricTuple;
use crate::trial::Trial;
use crate::types::{PolicyKind, TrialKey};

/// Resolved paths for one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub trials_dir: PathBuf,
    pub raw_artifact: PathBuf,
    pub report_md: PathBuf,
    pub report_json: PathBuf,
    pub trial_log: PathBuf,
}

/// Create the output directory structure for a run.
pub fn create_run_dirs(out_dir: &Path) -> io::Result<RunPaths> {
    let root = out_dir.to_path_buf();
    let trials_dir = root.join("trials");
    fs::create_dir_all(&trials_dir)?;

    Ok(RunPaths {
        raw_artifact: root.join("tripinfo.xml"),
        report_md: root.join("report.md"),
        report_json: root.join("report.json"),
        trial_log: root.join("trials.jsonl"),
        root,
        trials_dir,
    })
}

/// On-disk per-trial summary.
#[derive(Debug, Clone, Serialize)]
pub struct TrialSummary<'a> {
    pub variant: PolicyKind,
    pub run_index: usize,
    pub seed: u64,
    pub steps: u64,
    pub terminated: bool,
    pub artifact: String,
    pub metric_names: Vec<&'static str>,
    pub metrics: Option<&'a MetricTuple>,
}

impl<'a> TrialSummary<'a> {
    pub fn from_trial(trial: &'a Trial) -> Self {
        Self {
            variant: trial.variant,
            run_index: trial.run_index,
            seed: trial.seed,
            steps: trial.steps,
            terminated: trial.completed,
            artifact: trial.artifact_path.display().to_string(),
            metric_names: crate::metrics::METRIC_NAMES.to_vec(),
            metrics: trial.metrics.as_ref(),
        }
    }
}

/// Write `<trials_dir>/<variant>_<run>.summary.json` for a trial.
pub fn write_trial_summary(trials_dir: &Path, trial: &Trial) -> io::Result<PathBuf> {
    let key = TrialKey::new(trial.variant, trial.run_index);
    let path = trials_dir.join(format!("{}.summary.json", key.file_stem()));
    let file = File::create(&path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &TrialSummary::from_trial(trial))?;
    Ok(path)
}
