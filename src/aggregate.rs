// src/aggregate.rs
//
// Aggregator: collects per-trial metric tuples for both variants and reduces
// them into the comparison report. Sample std is the unbiased (n-1) estimate
// and is exactly 0.0 for a single sample; percent improvement divides by the
// baseline mean and is explicitly guarded against a zero denominator.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::metrics::{round2, MetricTuple};
use crate::types::PolicyKind;

/// Errors raised while aggregating or finalizing a run.
#[derive(Debug, Clone)]
pub enum AggregateError {
    /// A tuple's arity does not match the run's fixed metric set.
    ArityMismatch { expected: usize, got: usize },
    /// finalize() was called before all requested trials were recorded.
    IncompleteRun {
        variant: PolicyKind,
        recorded: usize,
        requested: usize,
    },
    /// A variant has zero successful samples; no statistics exist.
    EmptySamples { variant: PolicyKind },
    /// The baseline mean for a metric is zero; improvement is undefined.
    DivisionByZero { metric: String },
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::ArityMismatch { expected, got } => {
                write!(f, "Metric tuple arity {} does not match run arity {}", got, expected)
            }
            AggregateError::IncompleteRun {
                variant,
                recorded,
                requested,
            } => write!(
                f,
                "Cannot finalize: {} has {}/{} trials recorded",
                variant.as_str(),
                recorded,
                requested
            ),
            AggregateError::EmptySamples { variant } => {
                write!(f, "No successful {} trials to aggregate", variant.as_str())
            }
            AggregateError::DivisionByZero { metric } => {
                write!(f, "Baseline mean for '{}' is zero; improvement undefined", metric)
            }
        }
    }
}

impl std::error::Error for AggregateError {}

/// A trial that failed and contributed no sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialFailure {
    pub variant: PolicyKind,
    pub run_index: usize,
    pub reason: String,
}

/// Aggregate statistics for one variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantStats {
    pub label: String,
    /// Trials requested for this variant (K).
    pub requested: usize,
    /// Trials that contributed a sample (K' <= K).
    pub completed: usize,
    /// Per-metric arithmetic mean over the K' samples.
    pub mean: Vec<f64>,
    /// Per-metric unbiased sample standard deviation; 0.0 when K' = 1.
    pub sample_std: Vec<f64>,
}

/// Terminal artifact of a run, consumed by the report renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub metric_names: Vec<String>,
    pub learned: VariantStats,
    pub baseline: VariantStats,
    /// Percent improvement of learned over baseline per metric, rounded to
    /// 2 decimals. Positive when the learned mean is lower (less is better).
    pub improvement_pct: Vec<f64>,
    /// SHA-256 over the numeric payload, for determinism comparison.
    pub checksum: String,
}

impl ComparisonReport {
    /// Checksum over metric names, sample counts, and fixed-precision stats.
    fn compute_checksum(
        metric_names: &[String],
        learned: &VariantStats,
        baseline: &VariantStats,
        improvement_pct: &[f64],
    ) -> String {
        let mut hasher = Sha256::new();
        for name in metric_names {
            hasher.update(name.as_bytes());
        }
        for stats in [learned, baseline] {
            hasher.update((stats.requested as u64).to_le_bytes());
            hasher.update((stats.completed as u64).to_le_bytes());
            for xs in [&stats.mean, &stats.sample_std] {
                for &x in xs {
                    // Fixed precision for floating point stability.
                    hasher.update((((x * 1_000_000.0).round()) as i64).to_le_bytes());
                }
            }
        }
        for &x in improvement_pct {
            hasher.update((((x * 1_000_000.0).round()) as i64).to_le_bytes());
        }
        hex_encode(&hasher.finalize())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Per-variant sample store (insertion order = run order).
#[derive(Debug, Clone, Default)]
struct VariantSamples {
    tuples: Vec<MetricTuple>,
    failures: Vec<TrialFailure>,
}

impl VariantSamples {
    fn recorded(&self) -> usize {
        self.tuples.len() + self.failures.len()
    }
}

/// Collects metric tuples across K trials per variant.
#[derive(Debug, Clone)]
pub struct TrialAggregator {
    metric_names: Vec<String>,
    requested: usize,
    learned: VariantSamples,
    baseline: VariantSamples,
}

impl TrialAggregator {
    pub fn new(metric_names: Vec<String>, requested: usize) -> Self {
        Self {
            metric_names,
            requested,
            learned: VariantSamples::default(),
            baseline: VariantSamples::default(),
        }
    }

    fn samples(&self, variant: PolicyKind) -> &VariantSamples {
        match variant {
            PolicyKind::Learned => &self.learned,
            PolicyKind::Static => &self.baseline,
        }
    }

    fn samples_mut(&mut self, variant: PolicyKind) -> &mut VariantSamples {
        match variant {
            PolicyKind::Learned => &mut self.learned,
            PolicyKind::Static => &mut self.baseline,
        }
    }

    /// Record a completed trial's tuple.
    pub fn add(&mut self, variant: PolicyKind, tuple: MetricTuple) -> Result<(), AggregateError> {
        if tuple.arity() != self.metric_names.len() {
            return Err(AggregateError::ArityMismatch {
                expected: self.metric_names.len(),
                got: tuple.arity(),
            });
        }
        self.samples_mut(variant).tuples.push(tuple);
        Ok(())
    }

    /// Record a failed trial; it degrades the sample count instead of
    /// aborting the run.
    pub fn record_failure(&mut self, variant: PolicyKind, run_index: usize, reason: String) {
        self.samples_mut(variant).failures.push(TrialFailure {
            variant,
            run_index,
            reason,
        });
    }

    /// Successful samples recorded so far for a variant.
    pub fn completed(&self, variant: PolicyKind) -> usize {
        self.samples(variant).tuples.len()
    }

    /// All failures recorded so far, learned first, in run order.
    pub fn failures(&self) -> Vec<TrialFailure> {
        let mut out = self.learned.failures.clone();
        out.extend(self.baseline.failures.iter().cloned());
        out
    }

    fn variant_stats(&self, variant: PolicyKind) -> Result<VariantStats, AggregateError> {
        let samples = self.samples(variant);
        if samples.recorded() < self.requested {
            return Err(AggregateError::IncompleteRun {
                variant,
                recorded: samples.recorded(),
                requested: self.requested,
            });
        }
        if samples.tuples.is_empty() {
            return Err(AggregateError::EmptySamples { variant });
        }

        let arity = self.metric_names.len();
        let mut mean = Vec::with_capacity(arity);
        let mut sample_std = Vec::with_capacity(arity);
        for m in 0..arity {
            let column: Vec<f64> = samples.tuples.iter().map(|t| t.values()[m]).collect();
            let mu = column.iter().sum::<f64>() / column.len() as f64;
            mean.push(mu);
            sample_std.push(std_sample(&column, mu));
        }

        Ok(VariantStats {
            label: variant.label().to_string(),
            requested: self.requested,
            completed: samples.tuples.len(),
            mean,
            sample_std,
        })
    }

    /// Reduce both variants into the comparison report.
    ///
    /// Callable only once all K trials per variant have been recorded
    /// (completed or failed); fails with `IncompleteRun` otherwise.
    pub fn finalize(&self) -> Result<ComparisonReport, AggregateError> {
        let learned = self.variant_stats(PolicyKind::Learned)?;
        let baseline = self.variant_stats(PolicyKind::Static)?;

        let mut improvement_pct = Vec::with_capacity(self.metric_names.len());
        for (m, name) in self.metric_names.iter().enumerate() {
            let b = baseline.mean[m];
            if b == 0.0 {
                return Err(AggregateError::DivisionByZero {
                    metric: name.clone(),
                });
            }
            improvement_pct.push(round2((b - learned.mean[m]) / b * 100.0));
        }

        let checksum = ComparisonReport::compute_checksum(
            &self.metric_names,
            &learned,
            &baseline,
            &improvement_pct,
        );

        Ok(ComparisonReport {
            metric_names: self.metric_names.clone(),
            learned,
            baseline,
            improvement_pct,
            checksum,
        })
    }
}

/// Unbiased sample standard deviation; exactly 0.0 for n <= 1 by policy.
fn std_sample(xs: &[f64], mean: f64) -> f64 {
    if xs.len() <= 1 {
        return 0.0;
    }
    let ss: f64 = xs.iter().map(|x| (x - mean) * (x - mean)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        crate::metrics::METRIC_NAMES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn tuple(tt: f64, co2: f64, fuel: f64) -> MetricTuple {
        MetricTuple(vec![tt, co2, fuel])
    }

    #[test]
    fn std_of_single_sample_is_exactly_zero() {
        let mut agg = TrialAggregator::new(names(), 1);
        agg.add(PolicyKind::Learned, tuple(10.0, 100.0, 5.0)).unwrap();
        agg.add(PolicyKind::Static, tuple(20.0, 200.0, 10.0)).unwrap();

        let report = agg.finalize().unwrap();
        assert_eq!(report.learned.sample_std, vec![0.0, 0.0, 0.0]);
        assert_eq!(report.baseline.sample_std, vec![0.0, 0.0, 0.0]);
        assert_eq!(report.improvement_pct, vec![50.0, 50.0, 50.0]);
    }

    #[test]
    fn three_run_travel_time_comparison() {
        let mut agg = TrialAggregator::new(names(), 3);
        for &tt in &[10.0, 20.0, 30.0] {
            agg.add(PolicyKind::Learned, tuple(tt, 100.0, 5.0)).unwrap();
        }
        for _ in 0..3 {
            agg.add(PolicyKind::Static, tuple(40.0, 100.0, 5.0)).unwrap();
        }

        let report = agg.finalize().unwrap();
        assert_eq!(report.learned.mean[0], 20.0);
        assert_eq!(report.learned.sample_std[0], 10.0);
        assert_eq!(report.baseline.mean[0], 40.0);
        assert_eq!(report.baseline.sample_std[0], 0.0);
        assert_eq!(report.improvement_pct[0], 50.0);
        assert_eq!(report.learned.completed, 3);
        assert_eq!(report.baseline.completed, 3);
    }

    #[test]
    fn mean_is_insertion_order_independent() {
        let mut forward = TrialAggregator::new(names(), 3);
        let mut reverse = TrialAggregator::new(names(), 3);
        let samples = [12.5, 7.25, 30.0];
        for &tt in &samples {
            forward.add(PolicyKind::Learned, tuple(tt, 1.0, 1.0)).unwrap();
            forward.add(PolicyKind::Static, tuple(tt, 1.0, 1.0)).unwrap();
        }
        for &tt in samples.iter().rev() {
            reverse.add(PolicyKind::Learned, tuple(tt, 1.0, 1.0)).unwrap();
            reverse.add(PolicyKind::Static, tuple(tt, 1.0, 1.0)).unwrap();
        }

        let f = forward.finalize().unwrap();
        let r = reverse.finalize().unwrap();
        assert_eq!(f.learned.mean, r.learned.mean);
        assert_eq!(f.learned.sample_std, r.learned.sample_std);
    }

    #[test]
    fn improvement_is_zero_at_equality_and_signed() {
        let mut agg = TrialAggregator::new(names(), 1);
        // Equal travel time, learned better co2, learned worse fuel.
        agg.add(PolicyKind::Learned, tuple(40.0, 80.0, 12.0)).unwrap();
        agg.add(PolicyKind::Static, tuple(40.0, 100.0, 10.0)).unwrap();

        let report = agg.finalize().unwrap();
        assert_eq!(report.improvement_pct[0], 0.0);
        assert_eq!(report.improvement_pct[1], 20.0);
        assert_eq!(report.improvement_pct[2], -20.0);
    }

    #[test]
    fn zero_baseline_mean_is_division_by_zero() {
        let mut agg = TrialAggregator::new(names(), 1);
        agg.add(PolicyKind::Learned, tuple(10.0, 1.0, 1.0)).unwrap();
        agg.add(PolicyKind::Static, tuple(0.0, 1.0, 1.0)).unwrap();

        let result = agg.finalize();
        match result {
            Err(AggregateError::DivisionByZero { metric }) => {
                assert_eq!(metric, "travel_time_s");
            }
            other => panic!("expected DivisionByZero, got {:?}", other),
        }
    }

    #[test]
    fn early_finalize_is_incomplete_run() {
        let mut agg = TrialAggregator::new(names(), 2);
        agg.add(PolicyKind::Learned, tuple(1.0, 1.0, 1.0)).unwrap();
        agg.add(PolicyKind::Static, tuple(1.0, 1.0, 1.0)).unwrap();

        assert!(matches!(
            agg.finalize(),
            Err(AggregateError::IncompleteRun { .. })
        ));
    }

    #[test]
    fn failures_degrade_sample_count_not_the_run() {
        let mut agg = TrialAggregator::new(names(), 2);
        agg.add(PolicyKind::Learned, tuple(10.0, 100.0, 5.0)).unwrap();
        agg.record_failure(PolicyKind::Learned, 2, "adapter crash".to_string());
        agg.add(PolicyKind::Static, tuple(20.0, 200.0, 10.0)).unwrap();
        agg.add(PolicyKind::Static, tuple(20.0, 200.0, 10.0)).unwrap();

        let report = agg.finalize().unwrap();
        assert_eq!(report.learned.completed, 1);
        assert_eq!(report.learned.requested, 2);
        assert_eq!(report.baseline.completed, 2);
        // Single learned sample: std collapses to the K=1 policy.
        assert_eq!(report.learned.sample_std, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn all_failures_for_a_variant_refuses_to_finalize() {
        let mut agg = TrialAggregator::new(names(), 1);
        agg.record_failure(PolicyKind::Learned, 1, "boom".to_string());
        agg.add(PolicyKind::Static, tuple(1.0, 1.0, 1.0)).unwrap();

        assert!(matches!(
            agg.finalize(),
            Err(AggregateError::EmptySamples {
                variant: PolicyKind::Learned
            })
        ));
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let mut agg = TrialAggregator::new(names(), 1);
        let result = agg.add(PolicyKind::Learned, MetricTuple(vec![1.0, 2.0]));
        assert!(matches!(
            result,
            Err(AggregateError::ArityMismatch {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn checksum_is_deterministic_and_sensitive() {
        let build = |tt: f64| {
            let mut agg = TrialAggregator::new(names(), 1);
            agg.add(PolicyKind::Learned, tuple(tt, 1.0, 1.0)).unwrap();
            agg.add(PolicyKind::Static, tuple(40.0, 1.0, 1.0)).unwrap();
            agg.finalize().unwrap()
        };

        assert_eq!(build(10.0).checksum, build(10.0).checksum);
        assert_ne!(build(10.0).checksum, build(15.0).checksum);
    }
}
