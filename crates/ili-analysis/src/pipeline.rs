use std::collections::{BTreeMap, HashSet};
use std::thread;

use ili_config::Settings;
use ili_core::{
    AnchorMatch, DistanceUnit, DriftPoint, Feature, GrowthResult, MatchedGroup, PipelineException,
    Run, RunId,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::anchors::match_anchors;
use crate::drift::{DriftCorrection, as_baseline};
use crate::growth::{calculate_growth, find_exceptions, order_runs};
use crate::matching::{extend_matches_to_three_runs, match_anomalies};
use crate::quality::{AlignmentQuality, MatchSummary, assess_alignment, summarize_matches};
use crate::AnalysisError;

const MIN_RUNS: usize = 2;
const MAX_RUNS: usize = 3;

/// Alignment of one later run onto the baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunAlignment {
    pub run_id: RunId,
    pub anchor_matches: Vec<AnchorMatch>,
    pub drift_points: Vec<DriftPoint>,
    pub quality: AlignmentQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Run ids, earliest first. The first entry is the baseline.
    pub run_order: Vec<RunId>,
    /// Units of the baseline run, which every reported distance uses.
    pub units: DistanceUnit,
    pub alignments: Vec<RunAlignment>,
    pub groups: Vec<MatchedGroup>,
    pub unmatched: BTreeMap<RunId, Vec<Feature>>,
    pub growth: Vec<GrowthResult>,
    pub exceptions: Vec<PipelineException>,
    pub summary: MatchSummary,
}

impl AnalysisReport {
    pub fn baseline_run_id(&self) -> Option<&str> {
        self.run_order.first().map(String::as_str)
    }
}

/// One consecutive pair in "run all" mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairAlignment {
    pub from_run_id: RunId,
    pub to_run_id: RunId,
    pub report: AnalysisReport,
}

/// Aligns two or three runs onto the earliest one, matches their anomalies
/// and derives growth and exceptions.
pub fn analyze_runs(runs: &[Run], settings: &Settings) -> Result<AnalysisReport, AnalysisError> {
    if runs.len() < MIN_RUNS {
        return Err(AnalysisError::TooFewRuns(runs.len()));
    }
    if runs.len() > MAX_RUNS {
        return Err(AnalysisError::TooManyRuns(runs.len()));
    }
    ensure_unique_run_ids(runs)?;
    for run in runs {
        run.validate()?;
    }

    let ordered: Vec<Run> = order_runs(runs)
        .into_iter()
        .map(|run| {
            let mut owned = run.clone();
            owned.sort_features();
            owned
        })
        .collect();
    let (baseline, later_runs) = match ordered.split_first() {
        Some(split) => split,
        None => return Err(AnalysisError::TooFewRuns(0)),
    };
    if later_runs.iter().any(|run| run.units != baseline.units) {
        warn!(
            baseline = %baseline.id,
            units = baseline.units.as_str(),
            "runs report distances in different units; results assume consistent units"
        );
    }

    let baseline_anchors = baseline.anchors();
    let baseline_anomalies = as_baseline(&baseline.anomalies());

    let mut alignments = Vec::with_capacity(later_runs.len());
    let mut corrected_runs = Vec::with_capacity(later_runs.len());
    for run in later_runs {
        let anchor_matches = match_anchors(&baseline_anchors, &run.anchors(), settings)?;
        let correction =
            DriftCorrection::from_anchor_matches(&anchor_matches, settings.min_segment_length);
        let corrected = correction.correct_features(&run.anomalies());
        let quality = assess_alignment(
            baseline,
            run,
            &anchor_matches,
            &correction,
            &corrected,
            settings,
        );
        alignments.push(RunAlignment {
            run_id: run.id.clone(),
            drift_points: correction.points().to_vec(),
            anchor_matches,
            quality,
        });
        corrected_runs.push((run, corrected));
    }

    let mut unmatched = BTreeMap::new();
    let mut groups = Vec::new();
    let mut later = corrected_runs.into_iter();
    if let Some((second, corrected)) = later.next() {
        let outcome = match_anomalies(
            &baseline_anomalies,
            &corrected,
            &baseline.id,
            &second.id,
            settings,
        )?;
        unmatched.insert(baseline.id.clone(), outcome.unmatched_a);
        unmatched.insert(second.id.clone(), outcome.unmatched_b);
        groups = outcome.matched;
    }
    if let Some((third, corrected)) = later.next() {
        let outcome =
            extend_matches_to_three_runs(groups, &baseline.id, &corrected, &third.id, settings)?;
        unmatched.insert(third.id.clone(), outcome.unmatched);
        groups = outcome.groups;
    }

    let growth = calculate_growth(&groups, &ordered, settings);
    let exceptions = find_exceptions(&groups, &unmatched, &ordered, growth.exceptions);
    let anomaly_counts = ordered
        .iter()
        .map(|run| {
            let count = run.features.iter().filter(|f| !f.is_reference()).count();
            (run.id.clone(), count)
        })
        .collect();
    let latest_run_id = later_runs.last().map_or(baseline.id.as_str(), |run| run.id.as_str());
    let summary = summarize_matches(
        &groups,
        &exceptions,
        &growth.growth_results,
        anomaly_counts,
        latest_run_id,
        settings,
    );

    info!(
        baseline = %baseline.id,
        runs = ordered.len(),
        groups = groups.len(),
        exceptions = exceptions.len(),
        uncertain = summary.uncertain,
        match_rate_pct = summary.match_rate_pct.unwrap_or(0.0),
        "run analysis complete"
    );

    Ok(AnalysisReport {
        run_order: ordered.iter().map(|run| run.id.clone()).collect(),
        units: baseline.units,
        alignments,
        groups,
        unmatched,
        growth: growth.growth_results,
        exceptions,
        summary,
    })
}

/// "Run all" mode: every consecutive pair in date order is analysed on its
/// own thread with its own copy of the two runs. Results keep pair order.
pub fn analyze_consecutive_pairs(
    runs: &[Run],
    settings: &Settings,
) -> Result<Vec<PairAlignment>, AnalysisError> {
    if runs.len() < MIN_RUNS {
        return Err(AnalysisError::TooFewRuns(runs.len()));
    }
    ensure_unique_run_ids(runs)?;

    let ordered = order_runs(runs);
    let results = thread::scope(|scope| {
        let handles: Vec<_> = ordered
            .windows(2)
            .map(|pair| {
                let owned = [Run::clone(pair[0]), Run::clone(pair[1])];
                scope.spawn(move || analyze_runs(&owned, settings))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| AnalysisError::Worker("pair analysis thread panicked".to_owned()))
            })
            .collect::<Vec<_>>()
    });

    let mut pairs = Vec::with_capacity(results.len());
    for (window, result) in ordered.windows(2).zip(results) {
        pairs.push(PairAlignment {
            from_run_id: window[0].id.clone(),
            to_run_id: window[1].id.clone(),
            report: result??,
        });
    }
    info!(pairs = pairs.len(), "consecutive pair analysis complete");
    Ok(pairs)
}

fn ensure_unique_run_ids(runs: &[Run]) -> Result<(), AnalysisError> {
    let mut seen = HashSet::new();
    for run in runs {
        if !seen.insert(run.id.as_str()) {
            return Err(AnalysisError::DuplicateRunId(run.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_run_counts_and_duplicate_ids() {
        let settings = Settings::default();
        let run = Run::new("r1", "a");

        assert!(matches!(
            analyze_runs(std::slice::from_ref(&run), &settings),
            Err(AnalysisError::TooFewRuns(1))
        ));
        assert!(matches!(
            analyze_runs(&[run.clone(), run.clone(), run.clone(), run.clone()], &settings),
            Err(AnalysisError::TooManyRuns(4))
        ));
        assert!(matches!(
            analyze_runs(&[run.clone(), run.clone()], &settings),
            Err(AnalysisError::DuplicateRunId(_))
        ));
        assert!(matches!(
            analyze_consecutive_pairs(&[run.clone(), run], &settings),
            Err(AnalysisError::DuplicateRunId(_))
        ));
    }

    #[test]
    fn invalid_feature_fails_before_alignment() {
        let settings = Settings::default();
        let runs = [
            Run::new("r1", "a").with_features(vec![Feature::new("A1", -1.0, "Corrosion")]),
            Run::new("r2", "b"),
        ];

        assert!(matches!(
            analyze_runs(&runs, &settings),
            Err(AnalysisError::Model(_))
        ));
    }

    #[test]
    fn empty_runs_produce_an_empty_report() {
        let settings = Settings::default();
        let runs = [Run::new("r1", "a"), Run::new("r2", "b")];

        let report = analyze_runs(&runs, &settings).expect("analysis");

        assert_eq!(report.baseline_run_id(), Some("r1"));
        assert!(report.groups.is_empty());
        assert!(report.exceptions.is_empty());
        assert_eq!(report.summary.match_rate_pct, None);
    }
}
