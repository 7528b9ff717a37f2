// src/logging.rs
//
// Per-trial telemetry sinks.
// - TrialSink: trait used by the orchestrator
// - NoopSink:  discards all events
// - FileSink:  writes one JSON line per trial for downstream analysis

use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::trial::Trial;
use crate::types::PolicyKind;

/// Abstract sink for per-trial telemetry.
pub trait TrialSink {
    fn trial_completed(&mut self, trial: &Trial);
    fn trial_failed(&mut self, variant: PolicyKind, run_index: usize, reason: &str);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TrialSink for NoopSink {
    fn trial_completed(&mut self, _trial: &Trial) {
        // intentionally no-op
    }

    fn trial_failed(&mut self, _variant: PolicyKind, _run_index: usize, _reason: &str) {
        // intentionally no-op
    }
}

/// JSONL file sink.
///
/// Each trial is written as a single JSON object on its own line. The
/// payload is small and encoded manually to keep the hot path allocation
/// light.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create a new sink writing to `path`.
    pub fn create(path: &std::path::Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl TrialSink for FileSink {
    fn trial_completed(&mut self, trial: &Trial) {
        let metrics = trial
            .metrics
            .as_ref()
            .map(|t| {
                t.values()
                    .iter()
                    .map(|v| format!("{}", v))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();

        let line = format!(
            "{{\"event\":\"completed\",\"variant\":\"{}\",\"run\":{},\"seed\":{},\"steps\":{},\"terminated\":{},\"artifact\":\"{}\",\"metrics\":[{}]}}\n",
            trial.variant.as_str(),
            trial.run_index,
            trial.seed,
            trial.steps,
            trial.completed,
            trial.artifact_path.display(),
            metrics,
        );

        // Telemetry must never take down a run; I/O errors are ignored.
        let _ = self.writer.write_all(line.as_bytes());
        let _ = self.writer.flush();
    }

    fn trial_failed(&mut self, variant: PolicyKind, run_index: usize, reason: &str) {
        let line = format!(
            "{{\"event\":\"failed\",\"variant\":\"{}\",\"run\":{},\"reason\":{}}}\n",
            variant.as_str(),
            run_index,
            serde_json::to_string(reason).unwrap_or_else(|_| "\"?\"".to_string()),
        );
        let _ = self.writer.write_all(line.as_bytes());
        let _ = self.writer.flush();
    }
}
