use std::io::Write;

use anyhow::{Context, Result};
use ili_analysis::{AnalysisReport, PairAlignment};
use ili_config::ConfigWarning;
use ili_core::MatchedGroup;

use crate::cli::OutputFormat;

pub fn write_report(
    report: &AnalysisReport,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(report, out),
        OutputFormat::Table => write_table(report, out).context("failed to write report table"),
    }
}

pub fn write_pairs(
    pairs: &[PairAlignment],
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(&pairs, out),
        OutputFormat::Table => {
            for pair in pairs {
                writeln!(out, "== {} -> {} ==", pair.from_run_id, pair.to_run_id)?;
                write_table(&pair.report, out).context("failed to write pair table")?;
                writeln!(out)?;
            }
            Ok(())
        }
    }
}

pub fn write_config_warnings(warnings: &[ConfigWarning], out: &mut dyn Write) -> Result<()> {
    for warning in warnings {
        writeln!(out, "ILI config warning [{}]: {}", warning.code, warning.message)?;
    }
    Ok(())
}

fn write_json<T: serde::Serialize + ?Sized>(value: &T, out: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to serialize report")?;
    writeln!(out)?;
    Ok(())
}

fn write_table(report: &AnalysisReport, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        out,
        "runs\t{}\tunits {}",
        report.run_order.join(" -> "),
        report.units.as_str()
    )?;

    writeln!(out)?;
    writeln!(
        out,
        "run_id\tanchors_matched\tcoverage\tmean_abs_drift\tmax_abs_drift\toutside_window"
    )?;
    for alignment in &report.alignments {
        let quality = &alignment.quality;
        writeln!(
            out,
            "{}\t{}\t{:.3}\t{}\t{}\t{}",
            alignment.run_id,
            quality.matched_anchors,
            quality.coverage,
            optional(quality.mean_abs_drift),
            optional(quality.max_abs_drift),
            quality.anomalies_outside_window
        )?;
    }

    writeln!(out)?;
    writeln!(out, "group_id\tconfidence\tscore\tfeatures\texplanation")?;
    for group in &report.groups {
        writeln!(
            out,
            "{}\t{}\t{:.4}\t{}\t{}",
            group.group_id,
            group.confidence,
            group.score,
            group_members(group, &report.run_order),
            normalize_field(&group.explanation)
        )?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "group_id\tfrom\tto\tyears\tdepth_delta\tlength_delta\tdepth_rate\tflag"
    )?;
    for growth in &report.growth {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            growth.group_id,
            growth.from_run_id,
            growth.to_run_id,
            optional(growth.years),
            optional(growth.depth_delta),
            optional(growth.length_delta),
            optional(growth.depth_rate),
            if growth.flag.is_some() { "RAPID_GROWTH" } else { "-" }
        )?;
    }

    writeln!(out)?;
    writeln!(out, "category\trun_id\tfeature_id\tdistance\tgroup_id\tdetails")?;
    for exception in &report.exceptions {
        writeln!(
            out,
            "{}\t{}\t{}\t{:.3}\t{}\t{}",
            exception.category,
            exception.run_id,
            normalize_field(&exception.feature_id),
            exception.distance,
            exception.group_id.as_deref().unwrap_or("-"),
            normalize_field(&exception.details)
        )?;
    }

    let summary = &report.summary;
    writeln!(out)?;
    writeln!(
        out,
        "matched {}\tnew {}\tmissing {}\tuncertain {}\trapid_growth {}\tmatch_rate_pct {}",
        summary.matched_groups,
        summary.new,
        summary.missing,
        summary.uncertain,
        summary.rapid_growth,
        optional(summary.match_rate_pct)
    )?;
    Ok(())
}

fn group_members(group: &MatchedGroup, run_order: &[String]) -> String {
    run_order
        .iter()
        .map(|run_id| match group.feature(run_id) {
            Some(feature) => format!("{run_id}:{}", normalize_field(&feature.id)),
            None => format!("{run_id}:-"),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_owned(), |value| format!("{value:.3}"))
}

fn normalize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use ili_analysis::analyze_runs;
    use ili_config::Settings;
    use ili_core::{Feature, Run};

    use super::*;

    fn sample_report() -> AnalysisReport {
        let runs = [
            Run::new("r1", "a").with_features(vec![
                Feature::new("W1", 0.0, "Girth Weld"),
                Feature::new("A1", 10.0, "Corrosion").with_depth(20.0),
                Feature::new("A2", 80.0, "Dent"),
            ]),
            Run::new("r2", "b").with_features(vec![
                Feature::new("W1", 1.0, "Girth Weld"),
                Feature::new("B1", 11.0, "Corrosion").with_depth(21.0),
            ]),
        ];
        analyze_runs(&runs, &Settings::default()).expect("analysis")
    }

    #[test]
    fn table_lists_groups_and_exceptions() {
        let mut out = Vec::new();
        write_report(&sample_report(), OutputFormat::Table, &mut out).expect("write");

        let rendered = String::from_utf8(out).expect("utf8 output");
        assert!(rendered.contains("runs\tr1 -> r2\tunits meters"));
        assert!(rendered.contains("G0001\tHIGH"));
        assert!(rendered.contains("r1:A1,r2:B1"));
        assert!(rendered.contains("MISSING\tr1\tA2"));
    }

    #[test]
    fn json_output_round_trips_as_value() {
        let mut out = Vec::new();
        write_report(&sample_report(), OutputFormat::Json, &mut out).expect("write");

        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["run_order"][0], "r1");
        assert_eq!(value["units"], "meters");
        assert_eq!(value["groups"][0]["confidence"], "HIGH");
        assert_eq!(value["exceptions"][0]["category"], "MISSING");
    }

    #[test]
    fn fields_with_tabs_are_flattened() {
        assert_eq!(normalize_field("a\tb\nc"), "a b c");
        assert_eq!(optional(None), "-");
        assert_eq!(optional(Some(1.23456)), "1.235");
    }
}
