use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::thread;

use ili_config::Settings;
use ili_core::{ComponentScores, ConfidenceTier, Feature, MatchedGroup, RejectedCandidate};
use serde::Serialize;
use tracing::debug;

use crate::scoring::{PairScore, score_pair};
use crate::{AnalysisError, ensure_sorted};

const MAX_ALTERNATIVES: usize = 3;
const PARALLEL_SCAN_MIN_PAIRS: usize = 65_536;
const CONFIDENCE_MARKER: &str = " Confidence: ";

/// Scored candidates keyed by (A index, B index). Ordered so the assignment
/// step sees the same map no matter how the scan was split.
type CandidateMap = BTreeMap<(usize, usize), PairScore>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub matched: Vec<MatchedGroup>,
    pub unmatched_a: Vec<Feature>,
    pub unmatched_b: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThirdRunOutcome {
    pub groups: Vec<MatchedGroup>,
    pub unmatched: Vec<Feature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    SkipA,
    SkipB,
    Match,
}

/// Matches anomalies of two runs, both sorted by raw distance, on their
/// corrected distances. The accepted pairs are 1:1, never cross, and
/// maximise the total score.
pub fn match_anomalies(
    anomalies_a: &[Feature],
    anomalies_b: &[Feature],
    run_a_id: &str,
    run_b_id: &str,
    settings: &Settings,
) -> Result<MatchOutcome, AnalysisError> {
    if run_a_id == run_b_id {
        return Err(AnalysisError::DuplicateRunId(run_a_id.to_owned()));
    }
    ensure_anomaly_input(anomalies_a, "run A anomalies")?;
    ensure_anomaly_input(anomalies_b, "run B anomalies")?;

    let candidates = generate_candidates(anomalies_a, anomalies_b, settings)?;
    let accepted = assign_in_order(anomalies_a.len(), anomalies_b.len(), &candidates);

    let mut used_a = vec![false; anomalies_a.len()];
    let mut used_b = vec![false; anomalies_b.len()];
    let mut matched = Vec::with_capacity(accepted.len());
    for (seq, (i, j, scored)) in accepted.into_iter().enumerate() {
        used_a[i] = true;
        used_b[j] = true;
        matched.push(build_group(
            seq + 1,
            (run_a_id, &anomalies_a[i]),
            (run_b_id, &anomalies_b[j]),
            scored,
            row_candidates(&candidates, i, anomalies_b),
            settings,
        ));
    }

    let unmatched_a = unused(anomalies_a, &used_a);
    let unmatched_b = unused(anomalies_b, &used_b);
    debug!(
        run_a = run_a_id,
        run_b = run_b_id,
        candidates = candidates.len(),
        matched = matched.len(),
        unmatched_a = unmatched_a.len(),
        unmatched_b = unmatched_b.len(),
        "anomaly matching complete"
    );

    Ok(MatchOutcome {
        matched,
        unmatched_a,
        unmatched_b,
    })
}

/// Greedy extension of existing groups into a third run. Each group's
/// baseline feature takes the best unused third-run anomaly within
/// tolerance; groups without one record an explicit absence. A runner-up
/// within `ambiguity_epsilon` of the pick marks the group UNCERTAIN.
pub fn extend_matches_to_three_runs(
    groups: Vec<MatchedGroup>,
    baseline_run_id: &str,
    anomalies_c: &[Feature],
    run_c_id: &str,
    settings: &Settings,
) -> Result<ThirdRunOutcome, AnalysisError> {
    if run_c_id == baseline_run_id
        || groups
            .iter()
            .any(|group| group.features.contains_key(run_c_id))
    {
        return Err(AnalysisError::DuplicateRunId(run_c_id.to_owned()));
    }
    ensure_anomaly_input(anomalies_c, "run C anomalies")?;

    let mut used = vec![false; anomalies_c.len()];
    let mut extended = Vec::with_capacity(groups.len());

    for mut group in groups {
        let best = group
            .feature(baseline_run_id)
            .and_then(|baseline| best_remaining(baseline, anomalies_c, &used, settings));

        let note = match best {
            Some(ThirdRunPick {
                idx,
                score,
                runner_up_gap,
            }) => {
                used[idx] = true;
                let feature = &anomalies_c[idx];
                let near_tie = runner_up_gap.filter(|gap| *gap < settings.ambiguity_epsilon);
                group.ambiguous |= near_tie.is_some();
                group.score = (group.score + score) / 2.0;
                group.confidence = tier_for(group.score, group.ambiguous, settings);
                group
                    .corrected_distances
                    .insert(run_c_id.to_owned(), Some(feature.effective_distance()));
                group
                    .features
                    .insert(run_c_id.to_owned(), Some(feature.clone()));
                let mut note = format!("Third run {run_c_id}: {} scored {score:.3}.", feature.id);
                if let Some(gap) = near_tie {
                    note.push_str(&format!(" Runner-up candidate within {gap:.3} of the best."));
                }
                note
            }
            None => {
                group.corrected_distances.insert(run_c_id.to_owned(), None);
                group.features.insert(run_c_id.to_owned(), None);
                format!("Third run {run_c_id}: no counterpart within tolerance.")
            }
        };

        let basis = match group.explanation.rsplit_once(CONFIDENCE_MARKER) {
            Some((basis, _)) => basis,
            None => group.explanation.as_str(),
        };
        group.explanation = format!("{basis} {note}{CONFIDENCE_MARKER}{}", group.confidence);
        extended.push(group);
    }

    let unmatched = unused(anomalies_c, &used);
    debug!(
        run = run_c_id,
        groups = extended.len(),
        extended = extended.iter().filter(|group| group.feature(run_c_id).is_some()).count(),
        unmatched = unmatched.len(),
        "third-run extension complete"
    );

    Ok(ThirdRunOutcome {
        groups: extended,
        unmatched,
    })
}

struct ThirdRunPick {
    idx: usize,
    score: f64,
    runner_up_gap: Option<f64>,
}

/// Best unused third-run candidate for `baseline`, first wins on ties, with
/// the gap to the runner-up when one exists.
fn best_remaining(
    baseline: &Feature,
    anomalies_c: &[Feature],
    used: &[bool],
    settings: &Settings,
) -> Option<ThirdRunPick> {
    let floor = settings.candidate_floor();
    let mut best: Option<(usize, f64)> = None;
    let mut runner_up: Option<f64> = None;
    for (idx, candidate) in anomalies_c.iter().enumerate() {
        if used[idx] {
            continue;
        }
        let delta = candidate.effective_distance() - baseline.effective_distance();
        if delta.abs() > settings.dist_tolerance {
            continue;
        }
        let score = score_pair(baseline, candidate, settings).score;
        if score < floor {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {
                if runner_up.is_none_or(|second| score > second) {
                    runner_up = Some(score);
                }
            }
            _ => {
                runner_up = best.map(|(_, best_score)| best_score);
                best = Some((idx, score));
            }
        }
    }
    best.map(|(idx, score)| ThirdRunPick {
        idx,
        score,
        runner_up_gap: runner_up.map(|second| score - second),
    })
}

fn ensure_anomaly_input(anomalies: &[Feature], context: &str) -> Result<(), AnalysisError> {
    if let Some(feature) = anomalies.iter().find(|feature| feature.is_reference()) {
        return Err(AnalysisError::NotAnAnomaly {
            context: context.to_owned(),
            feature_id: feature.id.clone(),
        });
    }
    ensure_sorted(anomalies, context)
}

fn generate_candidates(
    anomalies_a: &[Feature],
    anomalies_b: &[Feature],
    settings: &Settings,
) -> Result<CandidateMap, AnalysisError> {
    let pairs = anomalies_a.len().saturating_mul(anomalies_b.len());
    let found = if pairs >= PARALLEL_SCAN_MIN_PAIRS {
        scan_rows_parallel(anomalies_a, anomalies_b, settings)?
    } else {
        scan_rows(anomalies_a, anomalies_b, 0..anomalies_a.len(), settings)
    };
    Ok(found.into_iter().collect())
}

fn scan_rows(
    anomalies_a: &[Feature],
    anomalies_b: &[Feature],
    rows: Range<usize>,
    settings: &Settings,
) -> Vec<((usize, usize), PairScore)> {
    let floor = settings.candidate_floor();
    let mut found = Vec::new();
    for i in rows {
        let left = &anomalies_a[i];
        for (j, right) in anomalies_b.iter().enumerate() {
            let delta = right.effective_distance() - left.effective_distance();
            if delta.abs() > settings.dist_tolerance {
                continue;
            }
            let scored = score_pair(left, right, settings);
            if scored.score < floor {
                continue;
            }
            found.push(((i, j), scored));
        }
    }
    found
}

fn scan_rows_parallel(
    anomalies_a: &[Feature],
    anomalies_b: &[Feature],
    settings: &Settings,
) -> Result<Vec<((usize, usize), PairScore)>, AnalysisError> {
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .clamp(1, anomalies_a.len().max(1));
    let chunk = anomalies_a.len().div_ceil(workers).max(1);

    thread::scope(|scope| {
        let handles: Vec<_> = (0..anomalies_a.len())
            .step_by(chunk)
            .map(|start| {
                let rows = start..(start + chunk).min(anomalies_a.len());
                scope.spawn(move || scan_rows(anomalies_a, anomalies_b, rows, settings))
            })
            .collect();

        let mut found = Vec::new();
        for handle in handles {
            let rows = handle
                .join()
                .map_err(|_| AnalysisError::Worker("candidate scan thread panicked".to_owned()))?;
            found.extend(rows);
        }
        Ok(found)
    })
}

/// Stored moves of one DP row. Only the columns between the row's first and
/// last candidate are kept. Columns before that window always skip A; columns
/// after it skip B up to `skip_b_through` and skip A beyond.
struct RowMoves {
    start: usize,
    moves: Vec<Move>,
    skip_b_through: usize,
}

impl RowMoves {
    fn empty() -> Self {
        Self {
            start: usize::MAX,
            moves: Vec::new(),
            skip_b_through: 0,
        }
    }

    fn at(&self, column: usize) -> Move {
        if column < self.start {
            return Move::SkipA;
        }
        match self.moves.get(column - self.start) {
            Some(step) => *step,
            None if column <= self.skip_b_through => Move::SkipB,
            None => Move::SkipA,
        }
    }
}

/// Order-preserving assignment over prefixes of A and B. Skip-A is the
/// default move; skip-B and match replace it only when strictly better.
///
/// Score rows are non-decreasing in the B prefix, so outside a row's
/// candidate window the move follows from the window's last score and the
/// previous row alone. Stored moves stay proportional to the candidate
/// windows rather than `len_a * len_b`.
fn assign_in_order(
    len_a: usize,
    len_b: usize,
    candidates: &CandidateMap,
) -> Vec<(usize, usize, PairScore)> {
    if len_a == 0 || len_b == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let mut rows = Vec::with_capacity(len_a);
    let mut previous = vec![0.0_f64; len_b + 1];
    let mut current = vec![0.0_f64; len_b + 1];

    for i in 0..len_a {
        let Some((first, last)) = candidate_window(candidates, i) else {
            current.copy_from_slice(&previous);
            rows.push(RowMoves::empty());
            std::mem::swap(&mut previous, &mut current);
            continue;
        };
        let (start, end) = (first + 1, last + 1);
        current[..start].copy_from_slice(&previous[..start]);

        let mut moves = Vec::with_capacity(end - start + 1);
        for column in start..=end {
            let mut best = previous[column];
            let mut step = Move::SkipA;
            if current[column - 1] > best {
                best = current[column - 1];
                step = Move::SkipB;
            }
            if let Some(candidate) = candidates.get(&(i, column - 1)) {
                let total = previous[column - 1] + candidate.score;
                if total > best {
                    best = total;
                    step = Move::Match;
                }
            }
            current[column] = best;
            moves.push(step);
        }

        let mut skip_b_through = end;
        for column in end + 1..=len_b {
            if current[end] > previous[column] {
                current[column] = current[end];
                skip_b_through = column;
            } else {
                current[column] = previous[column];
            }
        }

        rows.push(RowMoves {
            start,
            moves,
            skip_b_through,
        });
        std::mem::swap(&mut previous, &mut current);
    }

    let (mut i, mut j) = (len_a, len_b);
    let mut accepted = Vec::new();
    while i > 0 && j > 0 {
        match rows[i - 1].at(j) {
            Move::Match => {
                if let Some(candidate) = candidates.get(&(i - 1, j - 1)) {
                    accepted.push((i - 1, j - 1, *candidate));
                }
                i -= 1;
                j -= 1;
            }
            Move::SkipA => i -= 1,
            Move::SkipB => j -= 1,
        }
    }
    accepted.reverse();
    accepted
}

/// First and last B index holding a candidate for baseline feature `i`.
fn candidate_window(candidates: &CandidateMap, i: usize) -> Option<(usize, usize)> {
    let mut row = candidates.range((i, 0)..(i + 1, 0)).map(|(&(_, j), _)| j);
    let first = row.next()?;
    Some((first, row.next_back().unwrap_or(first)))
}

/// Candidates of baseline feature `i`, best first; ties keep B order.
fn row_candidates<'a>(
    candidates: &CandidateMap,
    i: usize,
    anomalies_b: &'a [Feature],
) -> Vec<(&'a Feature, PairScore)> {
    let mut row: Vec<(&Feature, PairScore)> = candidates
        .range((i, 0)..(i + 1, 0))
        .map(|(&(_, j), scored)| (&anomalies_b[j], *scored))
        .collect();
    row.sort_by(|left, right| right.1.score.total_cmp(&left.1.score));
    row
}

fn build_group(
    seq: usize,
    (run_a_id, left): (&str, &Feature),
    (run_b_id, right): (&str, &Feature),
    scored: PairScore,
    ranked: Vec<(&Feature, PairScore)>,
    settings: &Settings,
) -> MatchedGroup {
    let runner_up_gap = match ranked.as_slice() {
        [best, second, ..] => Some(best.1.score - second.1.score),
        _ => None,
    };
    let ambiguous = runner_up_gap.is_some_and(|gap| gap < settings.ambiguity_epsilon);
    let confidence = tier_for(scored.score, ambiguous, settings);

    let alternatives = ranked
        .iter()
        .filter(|(feature, _)| feature.id != right.id)
        .take(MAX_ALTERNATIVES)
        .map(|(feature, alternative)| RejectedCandidate {
            feature_id: feature.id.clone(),
            score: alternative.score,
            distance_delta: feature.effective_distance() - left.effective_distance(),
        })
        .collect();

    let clock_compared = left.clock_degrees.is_some() && right.clock_degrees.is_some();
    let mut explanation = describe_components(&scored.components, clock_compared);
    if let Some(gap) = runner_up_gap.filter(|_| ambiguous) {
        explanation.push_str(&format!(" Runner-up candidate within {gap:.3} of the best."));
    }
    explanation.push_str(&format!("{CONFIDENCE_MARKER}{confidence}"));

    MatchedGroup {
        group_id: format!("G{seq:04}"),
        features: BTreeMap::from([
            (run_a_id.to_owned(), Some(left.clone())),
            (run_b_id.to_owned(), Some(right.clone())),
        ]),
        corrected_distances: BTreeMap::from([
            (run_a_id.to_owned(), Some(left.effective_distance())),
            (run_b_id.to_owned(), Some(right.effective_distance())),
        ]),
        score: scored.score,
        confidence,
        components: scored.components,
        explanation,
        alternatives,
        ambiguous,
    }
}

fn tier_for(score: f64, ambiguous: bool, settings: &Settings) -> ConfidenceTier {
    if ambiguous {
        return ConfidenceTier::Uncertain;
    }
    ConfidenceTier::from_score(
        score,
        settings.score_thresh_high,
        settings.score_thresh_med,
        settings.score_thresh_low,
    )
}

fn describe_components(components: &ComponentScores, clock_compared: bool) -> String {
    let distance = band(components.distance, [(0.8, "Strong"), (0.5, "Moderate")], "Weak");
    let clock = if clock_compared {
        band(
            components.clock,
            [(0.8, "clock aligned"), (0.4, "clock close")],
            "clock offset",
        )
    } else {
        "clock not compared"
    };
    let type_match = if components.type_match >= 1.0 {
        "exact type"
    } else if components.type_match >= 0.7 {
        "compatible type"
    } else {
        "mismatched type"
    };
    let dims = band(
        components.dims,
        [(0.8, "similar dims"), (0.5, "comparable dims")],
        "divergent dims",
    );
    format!("{distance} distance match; {clock}; {type_match}; {dims}.")
}

fn band(value: f64, bands: [(f64, &'static str); 2], otherwise: &'static str) -> &'static str {
    bands
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map_or(otherwise, |(_, label)| label)
}

fn unused(features: &[Feature], used: &[bool]) -> Vec<Feature> {
    features
        .iter()
        .zip(used)
        .filter(|(_, used)| !**used)
        .map(|(feature, _)| feature.clone())
        .collect()
}
