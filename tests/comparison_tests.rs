// tests/comparison_tests.rs
//
// Statistics and reporting acceptance tests: the canonical K=3 comparison,
// improvement edge cases, and report rendering through the public API.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use greenwave::aggregate::{AggregateError, TrialAggregator};
use greenwave::metrics::{extract, MetricTuple, METRIC_NAMES};
use greenwave::report::{print_console_summary, write_json_report, write_markdown_report};
use greenwave::types::PolicyKind;

fn names() -> Vec<String> {
    METRIC_NAMES.iter().map(|s| s.to_string()).collect()
}

#[test]
fn canonical_three_run_comparison() {
    let mut agg = TrialAggregator::new(names(), 3);

    for &tt in &[10.0, 20.0, 30.0] {
        agg.add(PolicyKind::Learned, MetricTuple(vec![tt, 150.0, 6.0]))
            .unwrap();
    }
    for _ in 0..3 {
        agg.add(PolicyKind::Static, MetricTuple(vec![40.0, 150.0, 6.0]))
            .unwrap();
    }

    let report = agg.finalize().unwrap();

    assert_eq!(report.learned.mean[0], 20.0);
    assert_eq!(report.learned.sample_std[0], 10.0);
    assert_eq!(report.baseline.mean[0], 40.0);
    assert_eq!(report.baseline.sample_std[0], 0.0);
    // round((40 - 20) / 40 * 100, 2) = 50.0
    assert_eq!(report.improvement_pct[0], 50.0);
}

#[test]
fn zero_baseline_raises_instead_of_propagating_inf() {
    let mut agg = TrialAggregator::new(names(), 1);
    agg.add(PolicyKind::Learned, MetricTuple(vec![10.0, 1.0, 1.0]))
        .unwrap();
    agg.add(PolicyKind::Static, MetricTuple(vec![40.0, 0.0, 1.0]))
        .unwrap();

    match agg.finalize() {
        Err(AggregateError::DivisionByZero { metric }) => {
            assert_eq!(metric, "co2_g_per_km");
        }
        other => panic!("expected DivisionByZero, got {:?}", other.map(|r| r.improvement_pct)),
    }
}

#[test]
fn incomplete_run_cannot_finalize_then_completes() {
    let mut agg = TrialAggregator::new(names(), 2);
    agg.add(PolicyKind::Learned, MetricTuple(vec![10.0, 1.0, 1.0]))
        .unwrap();
    agg.add(PolicyKind::Static, MetricTuple(vec![20.0, 1.0, 1.0]))
        .unwrap();

    assert!(matches!(
        agg.finalize(),
        Err(AggregateError::IncompleteRun { .. })
    ));

    agg.add(PolicyKind::Learned, MetricTuple(vec![10.0, 1.0, 1.0]))
        .unwrap();
    agg.record_failure(PolicyKind::Static, 2, "artifact missing".to_string());

    let report = agg.finalize().unwrap();
    assert_eq!(report.learned.completed, 2);
    assert_eq!(report.baseline.completed, 1);
    assert_eq!(report.baseline.requested, 2);
}

fn write_artifact(dir: &Path, name: &str, trips: &[(f64, f64, f64, f64)]) -> PathBuf {
    let path = dir.join(name);
    let mut body = String::from("<tripreport scenario=\"test\" seed=\"1\" trips=\"0\">\n");
    for (i, (duration, route, co2, fuel)) in trips.iter().enumerate() {
        body.push_str(&format!(
            "    <trip id=\"v{}\" depart=\"0\" arrival=\"{}\" duration=\"{}\" routeLength=\"{}\" co2Abs=\"{}\" fuelAbs=\"{}\"/>\n",
            i, duration, duration, route, co2, fuel
        ));
    }
    body.push_str("</tripreport>\n");
    let mut f = fs::File::create(&path).unwrap();
    write!(f, "{}", body).unwrap();
    path
}

#[test]
fn injected_artifacts_flow_into_distinct_tuples() {
    let temp = tempdir().unwrap();

    let fast = write_artifact(temp.path(), "fast.xml", &[(60.0, 1000.0, 150000.0, 60.0)]);
    let slow = write_artifact(temp.path(), "slow.xml", &[(240.0, 1000.0, 210000.0, 95.0)]);

    let fast_tuple = extract(&fast).unwrap();
    let slow_tuple = extract(&slow).unwrap();
    assert_ne!(fast_tuple, slow_tuple);

    // Extraction depends only on the artifact handle it is given: a second
    // read of the first artifact is unaffected by the one in between.
    assert_eq!(extract(&fast).unwrap(), fast_tuple);
}

#[test]
fn rendered_reports_carry_sample_accounting() {
    let temp = tempdir().unwrap();

    let mut agg = TrialAggregator::new(names(), 2);
    agg.add(PolicyKind::Learned, MetricTuple(vec![18.5, 160.0, 6.4]))
        .unwrap();
    agg.record_failure(PolicyKind::Learned, 2, "adapter crash".to_string());
    agg.add(PolicyKind::Static, MetricTuple(vec![33.0, 180.0, 7.9]))
        .unwrap();
    agg.add(PolicyKind::Static, MetricTuple(vec![35.0, 182.0, 8.1]))
        .unwrap();
    let report = agg.finalize().unwrap();

    let mut console = Vec::new();
    print_console_summary(&report, &mut console).unwrap();
    let console = String::from_utf8(console).unwrap();
    assert!(console.contains("learned 1/2"));
    assert!(console.contains("static 2/2"));

    let md_path = temp.path().join("report.md");
    write_markdown_report(&report, &md_path).unwrap();
    let md = fs::read_to_string(&md_path).unwrap();
    assert!(md.contains("Samples: learned 1/2, static 2/2."));

    let json_path = temp.path().join("report.json");
    write_json_report(&report, &json_path).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(value["learned"]["completed"], 1);
    assert_eq!(value["learned"]["requested"], 2);
    assert_eq!(value["baseline"]["completed"], 2);
}
