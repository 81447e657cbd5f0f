use ili_core::{AnchorMatch, DriftPoint, Feature};

/// Control points are anchor distances in the baseline run's coordinates.
pub fn compute_drift_points(anchor_matches: &[AnchorMatch]) -> Vec<DriftPoint> {
    let mut points: Vec<DriftPoint> = anchor_matches.iter().map(DriftPoint::from).collect();
    points.sort_by(|left, right| left.distance.total_cmp(&right.distance));
    points
}

/// Corrected distance for `distance` under the piecewise-linear drift
/// function defined by `points` (sorted by distance).
pub fn apply_correction(distance: f64, points: &[DriftPoint]) -> f64 {
    distance - drift_at(distance, points, 0.0)
}

/// Piecewise-linear drift correction with flat extrapolation.
///
/// No points is the identity; one point is a constant offset. Segments
/// shorter than `min_segment_length` are degenerate and reuse the drift of
/// their first point.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftCorrection {
    points: Vec<DriftPoint>,
    min_segment_length: f64,
}

impl DriftCorrection {
    pub fn new(mut points: Vec<DriftPoint>, min_segment_length: f64) -> Self {
        points.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        Self {
            points,
            min_segment_length: min_segment_length.max(0.0),
        }
    }

    pub fn from_anchor_matches(anchor_matches: &[AnchorMatch], min_segment_length: f64) -> Self {
        Self::new(compute_drift_points(anchor_matches), min_segment_length)
    }

    pub fn points(&self) -> &[DriftPoint] {
        &self.points
    }

    pub fn drift_at(&self, distance: f64) -> f64 {
        drift_at(distance, &self.points, self.min_segment_length)
    }

    pub fn apply(&self, distance: f64) -> f64 {
        distance - self.drift_at(distance)
    }

    /// Returns owned copies with `corrected_distance` populated.
    pub fn correct_features(&self, features: &[Feature]) -> Vec<Feature> {
        features
            .iter()
            .map(|feature| {
                let mut corrected = feature.clone();
                corrected.corrected_distance = Some(self.apply(feature.distance));
                corrected
            })
            .collect()
    }

    pub fn degenerate_segments(&self) -> usize {
        self.points
            .windows(2)
            .filter(|pair| pair[1].distance - pair[0].distance < self.min_segment_length)
            .count()
    }
}

/// Baseline features are their own reference frame.
pub(crate) fn as_baseline(features: &[Feature]) -> Vec<Feature> {
    features
        .iter()
        .map(|feature| {
            let mut baseline = feature.clone();
            baseline.corrected_distance = Some(feature.distance);
            baseline
        })
        .collect()
}

fn drift_at(distance: f64, points: &[DriftPoint], min_segment_length: f64) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    if distance <= first.distance {
        return first.drift;
    }
    if distance >= last.distance {
        return last.drift;
    }

    // Segment [p1, p2) with p1.distance <= distance < p2.distance.
    let upper = points.partition_point(|point| point.distance <= distance);
    let p1 = points[upper - 1];
    let p2 = points[upper];
    let span = p2.distance - p1.distance;
    if span <= 0.0 || span < min_segment_length {
        return p1.drift;
    }

    let t = (distance - p1.distance) / span;
    p1.drift + t * (p2.drift - p1.drift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(distance: f64, drift: f64) -> DriftPoint {
        DriftPoint { distance, drift }
    }

    #[test]
    fn interpolates_between_control_points() {
        let points = vec![point(0.0, 2.0), point(100.0, 3.0)];
        assert_eq!(apply_correction(50.0, &points), 47.5);
        assert_eq!(apply_correction(25.0, &points), 25.0 - 2.25);
    }

    #[test]
    fn control_points_correct_exactly() {
        let points = vec![
            point(0.0, 2.0),
            point(40.0, -1.5),
            point(100.0, 3.0),
            point(180.0, 0.25),
        ];
        for p in &points {
            assert_eq!(apply_correction(p.distance, &points), p.distance - p.drift);
        }
    }

    #[test]
    fn extrapolates_flat_beyond_the_window() {
        let points = vec![point(10.0, 2.0), point(100.0, 3.0)];
        assert_eq!(apply_correction(0.0, &points), -2.0);
        assert_eq!(apply_correction(5.0, &points), 3.0);
        assert_eq!(apply_correction(1_000.0, &points), 997.0);
        assert_eq!(apply_correction(1_000_000.0, &points), 999_997.0);
    }

    #[test]
    fn degenerate_inputs_degrade_gracefully() {
        assert_eq!(apply_correction(42.0, &[]), 42.0);
        assert_eq!(apply_correction(42.0, &[point(10.0, 1.5)]), 40.5);
        assert_eq!(apply_correction(5.0, &[point(10.0, 1.5)]), 3.5);
    }

    #[test]
    fn short_segments_reuse_first_drift() {
        let correction = DriftCorrection::new(
            vec![point(0.0, 0.0), point(50.0, 1.0), point(50.005, 9.0), point(100.0, 2.0)],
            0.01,
        );

        assert_eq!(correction.degenerate_segments(), 1);
        assert_eq!(correction.drift_at(50.002), 1.0);
        assert_eq!(correction.apply(50.005), 50.005 - 9.0);
    }

    #[test]
    fn correction_sorts_points_and_fills_corrected_distance() {
        let correction = DriftCorrection::new(vec![point(100.0, 3.0), point(0.0, 2.0)], 0.01);
        let features = vec![Feature::new("A1", 50.0, "Corrosion")];

        let corrected = correction.correct_features(&features);

        assert_eq!(correction.points()[0].distance, 0.0);
        assert_eq!(corrected[0].corrected_distance, Some(47.5));
        assert_eq!(features[0].corrected_distance, None);
    }
}
