// src/report.rs
//
// Report renderers: sinks that consume the finalized comparison report.
// Shipped renderers cover the console table, a Markdown file, and a JSON
// file; anything downstream (plots, dashboards) hangs off the same trait.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::aggregate::{ComparisonReport, TrialFailure};

/// Sink for a finalized comparison report. No return value flows back into
/// the benchmark core.
pub trait ReportRenderer {
    fn render(&mut self, report: &ComparisonReport) -> io::Result<()>;
}

/// Writes the fixed-width console summary to stdout.
#[derive(Debug, Default)]
pub struct ConsoleRenderer;

impl ReportRenderer for ConsoleRenderer {
    fn render(&mut self, report: &ComparisonReport) -> io::Result<()> {
        let stdout = io::stdout();
        print_console_summary(report, stdout.lock())
    }
}

/// Writes the Markdown report to a file.
#[derive(Debug)]
pub struct MarkdownRenderer {
    pub path: PathBuf,
}

impl ReportRenderer for MarkdownRenderer {
    fn render(&mut self, report: &ComparisonReport) -> io::Result<()> {
        write_markdown_report(report, &self.path)
    }
}

/// Writes the JSON report to a file.
#[derive(Debug)]
pub struct JsonRenderer {
    pub path: PathBuf,
}

impl ReportRenderer for JsonRenderer {
    fn render(&mut self, report: &ComparisonReport) -> io::Result<()> {
        write_json_report(report, &self.path)
    }
}

/// Format a "completed/requested" sample count cell.
fn sample_cell(completed: usize, requested: usize) -> String {
    format!("{}/{}", completed, requested)
}

/// Print the fixed-width comparison table.
pub fn print_console_summary<W: Write>(
    report: &ComparisonReport,
    mut writer: W,
) -> io::Result<()> {
    writeln!(writer, "COMPARISON: learned vs static baseline")?;
    writeln!(
        writer,
        "  samples: learned {}  static {}",
        sample_cell(report.learned.completed, report.learned.requested),
        sample_cell(report.baseline.completed, report.baseline.requested),
    )?;
    writeln!(
        writer,
        "{:<20} {:>12} {:>12} {:>12} {:>12} {:>10}",
        "METRIC", "LEARNED", "±STD", "STATIC", "±STD", "IMPROVE%"
    )?;
    writeln!(
        writer,
        "{:-<20} {:->12} {:->12} {:->12} {:->12} {:->10}",
        "", "", "", "", "", ""
    )?;
    for (m, name) in report.metric_names.iter().enumerate() {
        writeln!(
            writer,
            "{:<20} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>10.2}",
            name,
            report.learned.mean[m],
            report.learned.sample_std[m],
            report.baseline.mean[m],
            report.baseline.sample_std[m],
            report.improvement_pct[m],
        )?;
    }
    writeln!(writer, "  checksum: {}", report.checksum)?;
    Ok(())
}

/// Write the Markdown report.
pub fn write_markdown_report(report: &ComparisonReport, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "# Signal Control Benchmark: Learned vs Static")?;
    writeln!(writer)?;
    writeln!(
        writer,
        "Samples: learned {}, static {}.",
        sample_cell(report.learned.completed, report.learned.requested),
        sample_cell(report.baseline.completed, report.baseline.requested),
    )?;
    writeln!(writer)?;
    writeln!(
        writer,
        "| Metric | {} (mean ± std) | {} (mean ± std) | Improvement |",
        report.learned.label, report.baseline.label
    )?;
    writeln!(writer, "|--------|----------------|----------------|-------------|")?;
    for (m, name) in report.metric_names.iter().enumerate() {
        writeln!(
            writer,
            "| {} | {:.2} ± {:.2} | {:.2} ± {:.2} | {:+.2}% |",
            name,
            report.learned.mean[m],
            report.learned.sample_std[m],
            report.baseline.mean[m],
            report.baseline.sample_std[m],
            report.improvement_pct[m],
        )?;
    }
    writeln!(writer)?;
    writeln!(writer, "Checksum: `{}`", report.checksum)?;

    writer.flush()
}

/// Write the JSON report.
pub fn write_json_report(report: &ComparisonReport, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Print recorded per-trial failures, if any.
pub fn print_failures<W: Write>(failures: &[TrialFailure], mut writer: W) -> io::Result<()> {
    if failures.is_empty() {
        return Ok(());
    }
    writeln!(writer, "  failed trials:")?;
    for f in failures {
        writeln!(
            writer,
            "    {}#{}: {}",
            f.variant.as_str(),
            f.run_index,
            f.reason
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{TrialAggregator, VariantStats};
    use crate::metrics::{MetricTuple, METRIC_NAMES};
    use crate::types::PolicyKind;
    use tempfile::tempdir;

    fn sample_report() -> ComparisonReport {
        let names: Vec<String> = METRIC_NAMES.iter().map(|s| s.to_string()).collect();
        let mut agg = TrialAggregator::new(names, 3);
        for &tt in &[10.0, 20.0, 30.0] {
            agg.add(PolicyKind::Learned, MetricTuple(vec![tt, 100.0, 5.0]))
                .unwrap();
        }
        for _ in 0..3 {
            agg.add(PolicyKind::Static, MetricTuple(vec![40.0, 100.0, 5.0]))
                .unwrap();
        }
        agg.finalize().unwrap()
    }

    #[test]
    fn console_summary_contains_stats_and_counts() {
        let report = sample_report();
        let mut out = Vec::new();
        print_console_summary(&report, &mut out).unwrap();
        let s = String::from_utf8(out).unwrap();

        assert!(s.contains("learned 3/3"));
        assert!(s.contains("static 3/3"));
        assert!(s.contains("travel_time_s"));
        assert!(s.contains("20.00"));
        assert!(s.contains("40.00"));
        assert!(s.contains("50.00"));
        assert!(s.contains(&report.checksum));
    }

    #[test]
    fn markdown_report_round_trips_to_disk() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("out").join("report.md");

        let report = sample_report();
        write_markdown_report(&report, &path).unwrap();

        let s = fs::read_to_string(&path).unwrap();
        assert!(s.starts_with("# Signal Control Benchmark"));
        assert!(s.contains("| travel_time_s | 20.00 ± 10.00 | 40.00 ± 0.00 | +50.00% |"));
        assert!(s.contains("Samples: learned 3/3, static 3/3."));
    }

    #[test]
    fn json_report_is_parseable() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("report.json");

        let report = sample_report();
        write_json_report(&report, &path).unwrap();

        let s = fs::read_to_string(&path).unwrap();
        let parsed: ComparisonReport = serde_json::from_str(&s).unwrap();
        assert_eq!(parsed.metric_names, report.metric_names);
        assert_eq!(parsed.improvement_pct, report.improvement_pct);
        assert_eq!(parsed.checksum, report.checksum);
    }

    #[test]
    fn renderer_trait_objects_compose() {
        let temp = tempdir().unwrap();
        let report = sample_report();

        let mut renderers: Vec<Box<dyn ReportRenderer>> = vec![
            Box::new(MarkdownRenderer {
                path: temp.path().join("r.md"),
            }),
            Box::new(JsonRenderer {
                path: temp.path().join("r.json"),
            }),
        ];
        for r in renderers.iter_mut() {
            r.render(&report).unwrap();
        }

        assert!(temp.path().join("r.md").exists());
        assert!(temp.path().join("r.json").exists());
    }

    #[test]
    fn print_failures_lists_each_entry() {
        let failures = vec![crate::aggregate::TrialFailure {
            variant: PolicyKind::Static,
            run_index: 2,
            reason: "artifact missing".to_string(),
        }];
        let mut out = Vec::new();
        print_failures(&failures, &mut out).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains("static#2: artifact missing"));
    }

    #[test]
    fn stats_serialization_keeps_field_names() {
        let stats = VariantStats {
            label: "Learned controller".to_string(),
            requested: 3,
            completed: 2,
            mean: vec![1.0],
            sample_std: vec![0.5],
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"requested\":3"));
        assert!(json.contains("\"completed\":2"));
    }
}
