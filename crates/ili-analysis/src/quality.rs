use std::collections::BTreeMap;

use ili_config::Settings;
use ili_core::{
    AnchorMatch, ExceptionCategory, Feature, GrowthResult, MatchedGroup, PipelineException, Run,
    RunId,
};
use serde::Serialize;
use tracing::warn;

use crate::drift::DriftCorrection;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityWarning {
    pub code: &'static str,
    pub message: String,
}

/// How well a later run was aligned onto the baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentQuality {
    pub baseline_run_id: RunId,
    pub run_id: RunId,
    pub baseline_anchors: usize,
    pub run_anchors: usize,
    pub matched_anchors: usize,
    pub coverage: f64,
    pub mean_abs_drift: Option<f64>,
    pub max_abs_drift: Option<f64>,
    pub degenerate_segments: usize,
    pub monotonic_violations: usize,
    pub anomalies_outside_window: usize,
    pub outside_window_fraction: f64,
    pub warnings: Vec<QualityWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSummary {
    pub anomaly_counts: BTreeMap<RunId, usize>,
    pub matched_groups: usize,
    pub new: usize,
    pub missing: usize,
    pub uncertain: usize,
    pub ambiguous: usize,
    pub rapid_growth: usize,
    pub match_rate_pct: Option<f64>,
    pub mean_depth_rate: Option<f64>,
    pub median_depth_rate: Option<f64>,
    pub warnings: Vec<QualityWarning>,
}

/// `corrected_anomalies` are the later run's anomalies, distance-sorted,
/// with corrected distances filled in.
pub fn assess_alignment(
    baseline: &Run,
    run: &Run,
    anchor_matches: &[AnchorMatch],
    correction: &DriftCorrection,
    corrected_anomalies: &[Feature],
    settings: &Settings,
) -> AlignmentQuality {
    let baseline_anchors = count_anchors(baseline);
    let run_anchors = count_anchors(run);
    let matched_anchors = anchor_matches.len();
    let coverage = match baseline_anchors.min(run_anchors) {
        0 => 0.0,
        smaller => matched_anchors as f64 / smaller as f64,
    };

    let drifts: Vec<f64> = anchor_matches.iter().map(|anchor| anchor.drift.abs()).collect();
    let mean_abs_drift = mean(&drifts);
    let max_abs_drift = drifts.iter().copied().reduce(f64::max);

    let window = anchor_matches
        .iter()
        .map(|anchor| anchor.distance_b)
        .fold(None, |range: Option<(f64, f64)>, distance| match range {
            None => Some((distance, distance)),
            Some((low, high)) => Some((low.min(distance), high.max(distance))),
        });
    let anomalies_outside_window = corrected_anomalies
        .iter()
        .filter(|feature| {
            window.is_none_or(|(low, high)| feature.distance < low || feature.distance > high)
        })
        .count();
    let outside_window_fraction = if corrected_anomalies.is_empty() {
        0.0
    } else {
        anomalies_outside_window as f64 / corrected_anomalies.len() as f64
    };

    let violations = monotonic_violations(corrected_anomalies);
    let mut warnings = Vec::new();
    if coverage < settings.min_anchor_coverage {
        warnings.push(QualityWarning {
            code: "low_anchor_coverage",
            message: format!(
                "only {matched_anchors} of {} anchors matched between {} and {} (coverage {:.2})",
                baseline_anchors.min(run_anchors),
                baseline.id,
                run.id,
                coverage
            ),
        });
    }
    if violations > 0 {
        warnings.push(QualityWarning {
            code: "monotonic_violation",
            message: format!(
                "drift correction reorders {violations} anomaly pair(s) in run {}",
                run.id
            ),
        });
    }
    if outside_window_fraction > 0.5 {
        warnings.push(QualityWarning {
            code: "anomalies_outside_anchor_window",
            message: format!(
                "{anomalies_outside_window} of {} anomalies in run {} lie outside the matched anchor span",
                corrected_anomalies.len(),
                run.id
            ),
        });
    }
    log_warnings(&warnings);

    AlignmentQuality {
        baseline_run_id: baseline.id.clone(),
        run_id: run.id.clone(),
        baseline_anchors,
        run_anchors,
        matched_anchors,
        coverage,
        mean_abs_drift,
        max_abs_drift,
        degenerate_segments: correction.degenerate_segments(),
        monotonic_violations: violations,
        anomalies_outside_window,
        outside_window_fraction,
        warnings,
    }
}

/// Places where corrected distances of a distance-sorted run go backwards.
pub fn monotonic_violations(features: &[Feature]) -> usize {
    features
        .windows(2)
        .filter(|pair| pair[1].effective_distance() < pair[0].effective_distance())
        .count()
}

/// `latest_run_id` is the run whose anomalies the match rate is taken over.
pub fn summarize_matches(
    groups: &[MatchedGroup],
    exceptions: &[PipelineException],
    growth: &[GrowthResult],
    anomaly_counts: BTreeMap<RunId, usize>,
    latest_run_id: &str,
    settings: &Settings,
) -> MatchSummary {
    let count = |category: ExceptionCategory| {
        exceptions
            .iter()
            .filter(|exception| exception.category == category)
            .count()
    };

    let latest_total = anomaly_counts.get(latest_run_id).copied().unwrap_or(0);
    let latest_matched = groups
        .iter()
        .filter(|group| group.feature(latest_run_id).is_some())
        .count();
    let match_rate_pct =
        (latest_total > 0).then(|| latest_matched as f64 / latest_total as f64 * 100.0);

    let mut rates: Vec<f64> = growth.iter().filter_map(|result| result.depth_rate).collect();
    rates.sort_by(f64::total_cmp);

    let mut warnings = Vec::new();
    if let Some(rate) = match_rate_pct.filter(|rate| *rate < settings.min_match_rate_pct) {
        warnings.push(QualityWarning {
            code: "low_match_rate",
            message: format!(
                "only {rate:.1}% of run {latest_run_id} anomalies matched (minimum {:.1}%)",
                settings.min_match_rate_pct
            ),
        });
    }
    log_warnings(&warnings);

    MatchSummary {
        anomaly_counts,
        matched_groups: groups.len(),
        new: count(ExceptionCategory::New),
        missing: count(ExceptionCategory::Missing),
        uncertain: count(ExceptionCategory::Uncertain),
        ambiguous: groups.iter().filter(|group| group.ambiguous).count(),
        rapid_growth: count(ExceptionCategory::RapidGrowth),
        match_rate_pct,
        mean_depth_rate: mean(&rates),
        median_depth_rate: median(&rates),
        warnings,
    }
}

fn count_anchors(run: &Run) -> usize {
    run.features.iter().filter(|feature| feature.is_reference()).count()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// `sorted` must be ascending.
fn median(sorted: &[f64]) -> Option<f64> {
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => None,
        len if len % 2 == 1 => Some(sorted[mid]),
        _ => Some((sorted[mid - 1] + sorted[mid]) / 2.0),
    }
}

fn log_warnings(warnings: &[QualityWarning]) {
    for warning in warnings {
        warn!(code = warning.code, "{}", warning.message);
    }
}
