use ili_config::Settings;
use ili_core::{ComponentScores, Feature, circular_difference, compatibility_group, labels_equal};

/// Score used when neither side carries enough data to compare.
pub(crate) const NEUTRAL_SCORE: f64 = 0.5;
const COMPATIBLE_TYPE_SCORE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub score: f64,
    pub components: ComponentScores,
}

/// Linear falloff from 1.0 at zero offset to 0.0 at the tolerance.
pub fn distance_score(delta: f64, tolerance: f64) -> f64 {
    let delta = delta.abs();
    if tolerance <= 0.0 {
        return if delta == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - delta / tolerance).max(0.0)
}

pub fn clock_score(left: Option<f64>, right: Option<f64>, tolerance: f64) -> f64 {
    let (Some(left), Some(right)) = (left, right) else {
        return NEUTRAL_SCORE;
    };
    let diff = circular_difference(left, right);
    if tolerance <= 0.0 {
        return if diff == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - diff / tolerance).max(0.0)
}

pub fn type_score(left: &str, right: &str) -> f64 {
    if labels_equal(left, right) {
        return 1.0;
    }
    match (compatibility_group(left), compatibility_group(right)) {
        (Some(left), Some(right)) if left == right => COMPATIBLE_TYPE_SCORE,
        _ => 0.0,
    }
}

/// Normalized-difference similarity in [0, 1].
pub fn similarity(left: f64, right: f64) -> f64 {
    let scale = left.abs().max(right.abs());
    if scale == 0.0 {
        return 1.0;
    }
    (1.0 - (left - right).abs() / scale).clamp(0.0, 1.0)
}

pub fn dims_score(left: &Feature, right: &Feature) -> f64 {
    let pairs = [
        (left.depth_pct, right.depth_pct),
        (left.length, right.length),
        (left.width, right.width),
    ];

    let (sum, count) = pairs
        .iter()
        .filter_map(|pair| match pair {
            (Some(left), Some(right)) => Some(similarity(*left, *right)),
            _ => None,
        })
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        return NEUTRAL_SCORE;
    }
    sum / count as f64
}

/// Weighted score of an anomaly pair, compared on corrected distances.
pub fn score_pair(left: &Feature, right: &Feature, settings: &Settings) -> PairScore {
    let components = ComponentScores {
        distance: distance_score(
            right.effective_distance() - left.effective_distance(),
            settings.dist_tolerance,
        ),
        clock: clock_score(
            left.clock_degrees,
            right.clock_degrees,
            settings.clock_tolerance,
        ),
        type_match: type_score(left.feature_type(), right.feature_type()),
        dims: dims_score(left, right),
    };

    let weights = &settings.weights;
    let score = weights.distance * components.distance
        + weights.clock * components.clock
        + weights.type_match * components.type_match
        + weights.dims * components.dims;

    PairScore { score, components }
}
