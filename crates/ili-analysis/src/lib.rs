use ili_core::{Feature, ModelError};
use thiserror::Error;

mod anchors;
mod drift;
mod growth;
mod matching;
mod pipeline;
mod quality;
mod scoring;

pub use anchors::{anchor_pair_score, match_anchors};
pub use drift::{DriftCorrection, apply_correction, compute_drift_points};
pub use growth::{GrowthReport, calculate_growth, find_exceptions, order_runs};
pub use matching::{MatchOutcome, ThirdRunOutcome, extend_matches_to_three_runs, match_anomalies};
pub use pipeline::{
    AnalysisReport, PairAlignment, RunAlignment, analyze_consecutive_pairs, analyze_runs,
};
pub use quality::{
    AlignmentQuality, MatchSummary, QualityWarning, assess_alignment, monotonic_violations,
    summarize_matches,
};
pub use scoring::{
    PairScore, clock_score, dims_score, distance_score, score_pair, similarity, type_score,
};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("at least two runs are required, got {0}")]
    TooFewRuns(usize),
    #[error("at most three runs can be aligned together, got {0}")]
    TooManyRuns(usize),
    #[error("run id '{0}' appears more than once")]
    DuplicateRunId(String),
    #[error("{context} must be sorted by distance")]
    UnsortedFeatures { context: String },
    #[error("{context}: feature '{feature_id}' is not a reference feature")]
    NotAnAnchor { context: String, feature_id: String },
    #[error("{context}: feature '{feature_id}' is a reference feature, not an anomaly")]
    NotAnAnomaly { context: String, feature_id: String },
    #[error("pair analysis worker failed: {0}")]
    Worker(String),
}

pub(crate) fn ensure_sorted(features: &[Feature], context: &str) -> Result<(), AnalysisError> {
    if ili_core::is_distance_sorted(features) {
        return Ok(());
    }
    Err(AnalysisError::UnsortedFeatures {
        context: context.to_owned(),
    })
}
