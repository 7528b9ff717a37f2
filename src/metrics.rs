// src/metrics.rs
//
// Metric extraction from a staged trip report artifact.
//
// Extraction is a pure function of artifact content, keyed strictly by the
// trial's own artifact handle; there is no shared intermediate file. The
// attribute scan is hand-rolled: the extractor depends only on a handful of
// per-trip attributes, not the full report schema.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Metric names, in report order. Lower is better for all three.
pub const METRIC_NAMES: [&str; 3] = ["travel_time_s", "co2_g_per_km", "fuel_l_per_100km"];

/// Reporting precision: every extracted metric is rounded to 2 decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Ordered fixed-arity tuple of metric values for one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTuple(pub Vec<f64>);

impl MetricTuple {
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// Errors raised by metric extraction.
#[derive(Debug, Clone)]
pub enum MetricError {
    /// The staged artifact could not be read.
    ArtifactRead { path: String, source: String },
    /// The artifact contains zero completed trips; no metrics exist.
    Unavailable { path: String },
    /// A trip entry is missing or has an unparsable attribute.
    Malformed { path: String, reason: String },
}

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricError::ArtifactRead { path, source } => {
                write!(f, "Failed to read artifact '{}': {}", path, source)
            }
            MetricError::Unavailable { path } => {
                write!(f, "Artifact '{}' contains no completed trips", path)
            }
            MetricError::Malformed { path, reason } => {
                write!(f, "Malformed trip entry in '{}': {}", path, reason)
            }
        }
    }
}

impl std::error::Error for MetricError {}

/// Pull a numeric attribute value out of a trip line.
fn attr(line: &str, name: &str) -> Option<f64> {
    let needle = format!("{}=\"", name);
    let start = line.find(&needle)? + needle.len();
    let rest = &line[start..];
    let end = rest.find('"')?;
    rest[..end].parse::<f64>().ok()
}

/// Extract the metric tuple from a staged trip report.
///
/// Computes, over completed trips: mean travel time (s), mean CO2 rate
/// (mg/m, i.e. g/km), and mean fuel rate (ml/m scaled to L/100km). Each
/// metric is rounded to 2 decimals for reporting stability. Calling this
/// twice on an unmodified artifact returns identical tuples.
pub fn extract(artifact: &Path) -> Result<MetricTuple, MetricError> {
    let path_str = artifact.display().to_string();
    let contents = fs::read_to_string(artifact).map_err(|e| MetricError::ArtifactRead {
        path: path_str.clone(),
        source: e.to_string(),
    })?;

    let mut trips = 0usize;
    let mut sum_duration = 0.0f64;
    let mut sum_co2_rate = 0.0f64;
    let mut sum_fuel_rate = 0.0f64;

    for line in contents.lines() {
        if !line.trim_start().starts_with("<trip ") {
            continue;
        }

        let duration = attr(line, "duration").ok_or_else(|| MetricError::Malformed {
            path: path_str.clone(),
            reason: "missing or unparsable 'duration'".to_string(),
        })?;
        let route_m = attr(line, "routeLength").ok_or_else(|| MetricError::Malformed {
            path: path_str.clone(),
            reason: "missing or unparsable 'routeLength'".to_string(),
        })?;
        let co2_mg = attr(line, "co2Abs").ok_or_else(|| MetricError::Malformed {
            path: path_str.clone(),
            reason: "missing or unparsable 'co2Abs'".to_string(),
        })?;
        let fuel_ml = attr(line, "fuelAbs").ok_or_else(|| MetricError::Malformed {
            path: path_str.clone(),
            reason: "missing or unparsable 'fuelAbs'".to_string(),
        })?;

        if route_m <= 0.0 {
            return Err(MetricError::Malformed {
                path: path_str.clone(),
                reason: format!("non-positive routeLength {}", route_m),
            });
        }

        trips += 1;
        sum_duration += duration;
        // mg per metre is numerically g per km.
        sum_co2_rate += co2_mg / route_m;
        // ml per metre is L per km; scale to L per 100 km.
        sum_fuel_rate += fuel_ml / route_m * 100.0;
    }

    if trips == 0 {
        return Err(MetricError::Unavailable { path: path_str });
    }

    let n = trips as f64;
    Ok(MetricTuple(vec![
        round2(sum_duration / n),
        round2(sum_co2_rate / n),
        round2(sum_fuel_rate / n),
    ]))
}
