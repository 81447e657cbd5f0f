use std::collections::BTreeMap;

use ili_config::Settings;
use ili_core::{
    ConfidenceTier, ExceptionCategory, Feature, GrowthFlag, GrowthResult, MatchedGroup,
    PipelineException, Run, RunId, compare_by_distance,
};
use serde::Serialize;
use tracing::debug;

const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GrowthReport {
    pub growth_results: Vec<GrowthResult>,
    pub exceptions: Vec<PipelineException>,
}

/// Runs in chronological order when every run is dated, input order
/// otherwise. Sorting is stable so equal dates keep input order.
pub fn order_runs(runs: &[Run]) -> Vec<&Run> {
    let mut ordered: Vec<&Run> = runs.iter().collect();
    if ordered.iter().all(|run| run.date.is_some()) {
        ordered.sort_by_key(|run| run.date);
    }
    ordered
}

/// Growth between the earliest and latest run in which each group has a
/// feature. Intermediate runs never contribute.
pub fn calculate_growth(
    groups: &[MatchedGroup],
    runs: &[Run],
    settings: &Settings,
) -> GrowthReport {
    let ordered = order_runs(runs);
    let mut report = GrowthReport::default();

    for group in groups {
        let present: Vec<(&Run, &Feature)> = ordered
            .iter()
            .filter_map(|run| group.feature(&run.id).map(|feature| (*run, feature)))
            .collect();
        let (Some(&(from_run, earlier)), Some(&(to_run, later))) = (present.first(), present.last())
        else {
            continue;
        };
        if from_run.id == to_run.id {
            continue;
        }

        let years = elapsed_years(from_run, to_run);
        let depth_delta = delta(earlier.depth_pct, later.depth_pct);
        let length_delta = delta(earlier.length, later.length);
        let width_delta = delta(earlier.width, later.width);
        let depth_rate = rate(depth_delta, years);

        let rapid = depth_delta.is_some_and(|change| change.abs() > settings.rapid_growth_depth)
            || length_delta.is_some_and(|change| change.abs() > settings.rapid_growth_length);
        let result = GrowthResult {
            group_id: group.group_id.clone(),
            from_run_id: from_run.id.clone(),
            to_run_id: to_run.id.clone(),
            years,
            depth_delta,
            length_delta,
            width_delta,
            depth_rate,
            length_rate: rate(length_delta, years),
            width_rate: rate(width_delta, years),
            flag: rapid.then_some(GrowthFlag::RapidGrowth),
            outlier_rate: depth_rate.is_some_and(|value| value.abs() > settings.max_depth_rate),
        };

        if rapid {
            report.exceptions.push(PipelineException {
                category: ExceptionCategory::RapidGrowth,
                run_id: to_run.id.clone(),
                feature_id: later.id.clone(),
                distance: later.distance,
                group_id: Some(group.group_id.clone()),
                details: rapid_growth_details(&result),
                recommendation: "Verify sizing against field data; a large change in either \
                                 direction can indicate a sizing or matching error."
                    .to_owned(),
            });
        }
        report.growth_results.push(result);
    }

    debug!(
        groups = groups.len(),
        results = report.growth_results.len(),
        rapid = report.exceptions.len(),
        "growth calculation complete"
    );
    report
}

/// MISSING and NEW exceptions in run order, then UNCERTAIN groups, then the
/// growth exceptions as given.
pub fn find_exceptions(
    groups: &[MatchedGroup],
    unmatched_by_run: &BTreeMap<RunId, Vec<Feature>>,
    runs: &[Run],
    growth_exceptions: Vec<PipelineException>,
) -> Vec<PipelineException> {
    let ordered = order_runs(runs);
    let mut exceptions = Vec::new();
    let Some(baseline) = ordered.first() else {
        return growth_exceptions;
    };

    for (position, run) in ordered.iter().enumerate() {
        let Some(unmatched) = unmatched_by_run.get(&run.id) else {
            continue;
        };
        let mut unmatched = unmatched.clone();
        unmatched.sort_by(compare_by_distance);
        for feature in unmatched {
            exceptions.push(unmatched_exception(position == 0, run, baseline, feature));
        }
    }

    for group in groups
        .iter()
        .filter(|group| group.confidence == ConfidenceTier::Uncertain)
    {
        let Some((run, feature)) = ordered
            .iter()
            .find_map(|run| group.feature(&run.id).map(|feature| (*run, feature)))
        else {
            continue;
        };
        let ambiguity = if group.ambiguous {
            " Runner-up candidate is within the ambiguity margin."
        } else {
            ""
        };
        exceptions.push(PipelineException {
            category: ExceptionCategory::Uncertain,
            run_id: run.id.clone(),
            feature_id: feature.id.clone(),
            distance: feature.distance,
            group_id: Some(group.group_id.clone()),
            details: format!(
                "Group {} scored {:.3} with {} alternative candidate(s).{ambiguity}",
                group.group_id,
                group.score,
                group.alternatives.len()
            ),
            recommendation: "Manual review required before accepting continuity.".to_owned(),
        });
    }

    exceptions.extend(growth_exceptions);
    exceptions
}

fn unmatched_exception(
    is_baseline: bool,
    run: &Run,
    baseline: &Run,
    feature: Feature,
) -> PipelineException {
    let (category, details, recommendation) = if is_baseline {
        (
            ExceptionCategory::Missing,
            format!(
                "{} '{}' at {:.3} in {} has no match in any later run.",
                feature.feature_type(),
                feature.id,
                feature.distance,
                run.id
            ),
            "Check repair and cut-out records; otherwise review for a missed match.",
        )
    } else {
        (
            ExceptionCategory::New,
            format!(
                "{} '{}' at {:.3} in {} has no counterpart in {}.",
                feature.feature_type(),
                feature.id,
                feature.distance,
                run.id,
                baseline.id
            ),
            "Review as newly reported; it may have been below the earlier reporting threshold.",
        )
    };

    PipelineException {
        category,
        run_id: run.id.clone(),
        distance: feature.distance,
        feature_id: feature.id,
        group_id: None,
        details,
        recommendation: recommendation.to_owned(),
    }
}

fn rapid_growth_details(result: &GrowthResult) -> String {
    let mut parts = Vec::new();
    if let Some(depth) = result.depth_delta {
        parts.push(format!("depth change {depth:+.2}%"));
    }
    if let Some(length) = result.length_delta {
        parts.push(format!("length change {length:+.2}"));
    }
    format!(
        "Group {} between {} and {}: {}.",
        result.group_id,
        result.from_run_id,
        result.to_run_id,
        parts.join(", ")
    )
}

fn elapsed_years(from: &Run, to: &Run) -> Option<f64> {
    let (Some(from), Some(to)) = (from.date, to.date) else {
        return None;
    };
    let days = (to - from).num_days();
    (days > 0).then(|| days as f64 / DAYS_PER_YEAR)
}

fn delta(earlier: Option<f64>, later: Option<f64>) -> Option<f64> {
    Some(later? - earlier?)
}

fn rate(delta: Option<f64>, years: Option<f64>) -> Option<f64> {
    Some(delta? / years?)
}
