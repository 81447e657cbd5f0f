use ili_config::Settings;
use ili_core::{AnchorMatch, Feature, labels_equal, normalize_label};
use tracing::debug;

use crate::{AnalysisError, ensure_sorted};

const JOINT_NEAR_WINDOW: i64 = 2;
const PARTIAL_TYPE_SCORE: f64 = 0.5;

/// Greedy anchor pairing between two runs.
///
/// Each A-anchor, in distance order, takes the best-scoring B-anchor that is
/// still unused and clears the score floor. Ties keep the first B-anchor
/// encountered. A consumed B-anchor is never released, so a later A-anchor
/// cannot reclaim it even if it would score higher.
pub fn match_anchors(
    anchors_a: &[Feature],
    anchors_b: &[Feature],
    settings: &Settings,
) -> Result<Vec<AnchorMatch>, AnalysisError> {
    ensure_anchor_input(anchors_a, "run A anchors")?;
    ensure_anchor_input(anchors_b, "run B anchors")?;

    let window = proximity_window(anchors_a, anchors_b, settings.proximity_window_fraction);
    let mut used = vec![false; anchors_b.len()];
    let mut matches = Vec::new();

    for anchor_a in anchors_a {
        let mut best: Option<(usize, f64)> = None;
        for (idx, anchor_b) in anchors_b.iter().enumerate() {
            if used[idx] {
                continue;
            }
            let score = anchor_pair_score(anchor_a, anchor_b, window);
            if score < settings.anchor_score_floor {
                continue;
            }
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((idx, score));
            }
        }

        let Some((idx, score)) = best else {
            debug!(anchor = %anchor_a.id, distance = anchor_a.distance, "anchor left unmatched");
            continue;
        };
        used[idx] = true;
        let anchor_b = &anchors_b[idx];
        matches.push(AnchorMatch {
            anchor_a_id: anchor_a.id.clone(),
            anchor_b_id: anchor_b.id.clone(),
            distance_a: anchor_a.distance,
            distance_b: anchor_b.distance,
            drift: anchor_b.distance - anchor_a.distance,
            score,
        });
    }

    matches.sort_by(|left, right| left.distance_a.total_cmp(&right.distance_a));
    debug!(
        anchors_a = anchors_a.len(),
        anchors_b = anchors_b.len(),
        matched = matches.len(),
        window,
        "anchor matching complete"
    );
    Ok(matches)
}

/// Average of the sub-signals whose inputs exist on both sides: joint index,
/// weld type, feature type and distance proximity.
pub fn anchor_pair_score(anchor_a: &Feature, anchor_b: &Feature, window: f64) -> f64 {
    let mut total = 0.0;
    let mut evaluated = 0usize;

    if let (Some(joint_a), Some(joint_b)) = (anchor_a.joint_number, anchor_b.joint_number) {
        let gap = (joint_a - joint_b).abs();
        total += if gap == 0 {
            1.0
        } else if gap <= JOINT_NEAR_WINDOW {
            0.5
        } else {
            0.0
        };
        evaluated += 1;
    }

    if let (Some(weld_a), Some(weld_b)) = (&anchor_a.weld_type, &anchor_b.weld_type) {
        total += if labels_equal(weld_a, weld_b) { 1.0 } else { 0.0 };
        evaluated += 1;
    }

    let type_a = normalize_label(anchor_a.feature_type());
    let type_b = normalize_label(anchor_b.feature_type());
    if !type_a.is_empty() && !type_b.is_empty() {
        total += if type_a == type_b {
            1.0
        } else if anchor_a.reference_kind() == anchor_b.reference_kind()
            || type_a.contains(&type_b)
            || type_b.contains(&type_a)
        {
            PARTIAL_TYPE_SCORE
        } else {
            0.0
        };
        evaluated += 1;
    }

    let delta = (anchor_b.distance - anchor_a.distance).abs();
    total += if window > 0.0 {
        (1.0 - delta / window).max(0.0)
    } else if delta == 0.0 {
        1.0
    } else {
        0.0
    };
    evaluated += 1;

    total / evaluated as f64
}

fn proximity_window(anchors_a: &[Feature], anchors_b: &[Feature], fraction: f64) -> f64 {
    let max_a = anchors_a.last().map_or(0.0, |anchor| anchor.distance);
    let max_b = anchors_b.last().map_or(0.0, |anchor| anchor.distance);
    fraction * max_a.max(max_b)
}

fn ensure_anchor_input(anchors: &[Feature], context: &str) -> Result<(), AnalysisError> {
    if let Some(feature) = anchors.iter().find(|feature| !feature.is_reference()) {
        return Err(AnalysisError::NotAnAnchor {
            context: context.to_owned(),
            feature_id: feature.id.clone(),
        });
    }
    ensure_sorted(anchors, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weld(id: &str, distance: f64) -> Feature {
        Feature::new(id, distance, "Girth Weld")
    }

    #[test]
    fn matches_anchors_one_to_one_in_distance_order() {
        let settings = Settings::default();
        let anchors_a = vec![weld("W1", 0.0), weld("W2", 100.0)];
        let anchors_b = vec![weld("W1", 2.0), weld("W2", 103.0)];

        let matches = match_anchors(&anchors_a, &anchors_b, &settings).expect("match");

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].anchor_b_id, "W1");
        assert_eq!(matches[0].drift, 2.0);
        assert_eq!(matches[1].anchor_b_id, "W2");
        assert_eq!(matches[1].drift, 3.0);
    }

    #[test]
    fn consumed_b_anchor_is_not_reassigned() {
        let settings = Settings::default();
        // W1 grabs the only B anchor even though W2 sits exactly on it.
        let anchors_a = vec![weld("W1", 95.0), weld("W2", 100.0)];
        let anchors_b = vec![weld("B1", 100.0)];

        let matches = match_anchors(&anchors_a, &anchors_b, &settings).expect("match");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].anchor_a_id, "W1");
        assert_eq!(matches[0].anchor_b_id, "B1");
    }

    #[test]
    fn tied_b_anchors_keep_the_first_encountered() {
        let settings = Settings::default();
        let anchors_a = vec![weld("W5", 50.0).with_joint(5)];
        let anchors_b = vec![weld("X1", 40.0).with_joint(5), weld("X2", 60.0).with_joint(5)];
        let window = proximity_window(&anchors_a, &anchors_b, settings.proximity_window_fraction);
        assert_eq!(
            anchor_pair_score(&anchors_a[0], &anchors_b[0], window),
            anchor_pair_score(&anchors_a[0], &anchors_b[1], window)
        );

        let matches = match_anchors(&anchors_a, &anchors_b, &settings).expect("match");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].anchor_b_id, "X1");
        assert_eq!(matches[0].drift, -10.0);
    }

    #[test]
    fn candidates_below_floor_leave_anchor_unmatched() {
        let settings = Settings::default();
        let anchors_a = vec![Feature::new("V1", 0.0, "Valve").with_joint(1)];
        let anchors_b = vec![Feature::new("T1", 500.0, "Tee").with_joint(40)];

        let matches = match_anchors(&anchors_a, &anchors_b, &settings).expect("match");

        assert!(matches.is_empty());
    }

    #[test]
    fn score_only_averages_signals_present_on_both_sides() {
        let with_joint = weld("W1", 10.0).with_joint(5);
        let other_joint = weld("W2", 10.0).with_joint(6);
        let bare = weld("W3", 10.0);

        // type + distance only
        assert_eq!(anchor_pair_score(&with_joint, &bare, 10.0), 1.0);
        // joint (0.5) + type + distance
        assert!((anchor_pair_score(&with_joint, &other_joint, 10.0) - 2.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn weld_type_and_partial_type_signals() {
        let girth = Feature::new("W1", 0.0, "Girth Weld").with_weld_type("girth");
        let gw = Feature::new("W2", 0.0, "GW").with_weld_type("seam");

        // weld type 0 + partial type 0.5 + distance 1
        assert!((anchor_pair_score(&girth, &gw, 10.0) - 1.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_anomalies_and_unsorted_input() {
        let settings = Settings::default();
        let anomaly = vec![Feature::new("A1", 1.0, "Corrosion")];
        let unsorted = vec![weld("W2", 10.0), weld("W1", 0.0)];

        assert!(matches!(
            match_anchors(&anomaly, &[], &settings),
            Err(AnalysisError::NotAnAnchor { .. })
        ));
        assert!(matches!(
            match_anchors(&unsorted, &[], &settings),
            Err(AnalysisError::UnsortedFeatures { .. })
        ));
    }
}
