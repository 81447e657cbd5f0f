use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod classify;
mod clock;

pub use classify::{
    ReferenceKind, TypeGroup, compatibility_group, is_reference_type, labels_equal,
    normalize_label, reference_kind,
};
pub use clock::{circular_difference, normalize_degrees, parse_clock};

pub type RunId = String;
pub type FeatureId = String;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("feature '{id}' has an invalid distance {distance}")]
    InvalidDistance { id: String, distance: f64 },
    #[error("feature '{id}' has an invalid clock position '{value}'")]
    InvalidClock { id: String, value: String },
    #[error("feature id is required")]
    EmptyFeatureId,
    #[error("run id is required")]
    EmptyRunId,
    #[error("run '{run_id}' contains duplicate feature id '{feature_id}'")]
    DuplicateFeatureId { run_id: String, feature_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    #[default]
    Meters,
    Feet,
}

impl DistanceUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meters => "meters",
            Self::Feet => "feet",
        }
    }
}

/// One detected item on one survey. The type label is fixed at construction so
/// that `is_reference` can never disagree with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FeatureRecord")]
pub struct Feature {
    pub id: FeatureId,
    pub distance: f64,
    pub joint_number: Option<i64>,
    pub upstream_weld_offset: Option<f64>,
    pub clock_degrees: Option<f64>,
    feature_type: String,
    is_reference: bool,
    pub weld_type: Option<String>,
    pub depth_pct: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub wall_thickness: Option<f64>,
    pub corrected_distance: Option<f64>,
}

impl Feature {
    pub fn new(id: impl Into<String>, distance: f64, feature_type: impl Into<String>) -> Self {
        let feature_type = feature_type.into();
        let is_reference = is_reference_type(&feature_type);
        Self {
            id: id.into(),
            distance,
            joint_number: None,
            upstream_weld_offset: None,
            clock_degrees: None,
            feature_type,
            is_reference,
            weld_type: None,
            depth_pct: None,
            length: None,
            width: None,
            wall_thickness: None,
            corrected_distance: None,
        }
    }

    pub fn feature_type(&self) -> &str {
        &self.feature_type
    }

    pub fn is_reference(&self) -> bool {
        self.is_reference
    }

    pub fn reference_kind(&self) -> Option<ReferenceKind> {
        if !self.is_reference {
            return None;
        }
        reference_kind(&self.feature_type)
    }

    /// Corrected distance when the drift corrector has run, raw distance otherwise.
    pub fn effective_distance(&self) -> f64 {
        self.corrected_distance.unwrap_or(self.distance)
    }

    pub fn with_joint(mut self, joint_number: i64) -> Self {
        self.joint_number = Some(joint_number);
        self
    }

    pub fn with_clock(mut self, degrees: f64) -> Self {
        self.clock_degrees = Some(normalize_degrees(degrees));
        self
    }

    pub fn with_weld_type(mut self, weld_type: impl Into<String>) -> Self {
        self.weld_type = Some(weld_type.into());
        self
    }

    pub fn with_depth(mut self, depth_pct: f64) -> Self {
        self.depth_pct = Some(depth_pct);
        self
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.id.trim().is_empty() {
            return Err(ModelError::EmptyFeatureId);
        }
        if !self.distance.is_finite() || self.distance < 0.0 {
            return Err(ModelError::InvalidDistance {
                id: self.id.clone(),
                distance: self.distance,
            });
        }
        match self.clock_degrees {
            Some(clock) if !(clock.is_finite() && (0.0..360.0).contains(&clock)) => {
                Err(ModelError::InvalidClock {
                    id: self.id.clone(),
                    value: clock.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Clock position as delivered by the ingestion layer: degrees, or a clock
/// reading such as `"09:30"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClockValue {
    Degrees(f64),
    Reading(String),
}

/// Wire shape of a feature coming from the ingestion layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: String,
    pub distance: f64,
    #[serde(default)]
    pub joint_number: Option<i64>,
    #[serde(default)]
    pub upstream_weld_offset: Option<f64>,
    #[serde(default, alias = "clock_degrees")]
    pub clock: Option<ClockValue>,
    pub feature_type: String,
    #[serde(default)]
    pub weld_type: Option<String>,
    #[serde(default)]
    pub depth_pct: Option<f64>,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub wall_thickness: Option<f64>,
    #[serde(default)]
    pub corrected_distance: Option<f64>,
}

impl TryFrom<FeatureRecord> for Feature {
    type Error = ModelError;

    fn try_from(record: FeatureRecord) -> Result<Self, Self::Error> {
        let clock_degrees = match record.clock {
            None => None,
            Some(ClockValue::Degrees(degrees)) if degrees.is_finite() => {
                Some(normalize_degrees(degrees))
            }
            Some(ClockValue::Degrees(degrees)) => {
                return Err(ModelError::InvalidClock {
                    id: record.id,
                    value: degrees.to_string(),
                });
            }
            Some(ClockValue::Reading(reading)) => match parse_clock(&reading) {
                Some(degrees) => Some(degrees),
                None => {
                    return Err(ModelError::InvalidClock {
                        id: record.id,
                        value: reading,
                    });
                }
            },
        };

        let mut feature = Feature::new(record.id, record.distance, record.feature_type);
        feature.joint_number = record.joint_number;
        feature.upstream_weld_offset = record.upstream_weld_offset;
        feature.clock_degrees = clock_degrees;
        feature.weld_type = normalize_optional(record.weld_type);
        feature.depth_pct = record.depth_pct;
        feature.length = record.length;
        feature.width = record.width;
        feature.wall_thickness = record.wall_thickness;
        feature.corrected_distance = record.corrected_distance;
        feature.validate()?;
        Ok(feature)
    }
}

/// One inspection survey of the line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub name: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub units: DistanceUnit,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl Run {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            date: None,
            features: Vec::new(),
            units: DistanceUnit::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }

    pub fn sort_features(&mut self) {
        self.features.sort_by(compare_by_distance);
    }

    /// Reference features, distance-sorted.
    pub fn anchors(&self) -> Vec<Feature> {
        self.sorted_where(|feature| feature.is_reference())
    }

    /// Anomaly features, distance-sorted.
    pub fn anomalies(&self) -> Vec<Feature> {
        self.sorted_where(|feature| !feature.is_reference())
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.id.trim().is_empty() {
            return Err(ModelError::EmptyRunId);
        }

        let mut seen = std::collections::HashSet::new();
        for feature in &self.features {
            feature.validate()?;
            if !seen.insert(feature.id.as_str()) {
                return Err(ModelError::DuplicateFeatureId {
                    run_id: self.id.clone(),
                    feature_id: feature.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn sorted_where(&self, keep: impl Fn(&Feature) -> bool) -> Vec<Feature> {
        let mut selected: Vec<Feature> = self
            .features
            .iter()
            .filter(|feature| keep(feature))
            .cloned()
            .collect();
        selected.sort_by(compare_by_distance);
        selected
    }
}

/// Total order used everywhere a run is "distance-sorted": raw distance, then id.
pub fn compare_by_distance(left: &Feature, right: &Feature) -> Ordering {
    left.distance
        .total_cmp(&right.distance)
        .then_with(|| left.id.cmp(&right.id))
}

pub fn is_distance_sorted(features: &[Feature]) -> bool {
    features
        .windows(2)
        .all(|pair| pair[0].distance <= pair[1].distance)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorMatch {
    pub anchor_a_id: FeatureId,
    pub anchor_b_id: FeatureId,
    pub distance_a: f64,
    pub distance_b: f64,
    /// Signed offset, run B minus run A.
    pub drift: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftPoint {
    pub distance: f64,
    pub drift: f64,
}

impl From<&AnchorMatch> for DriftPoint {
    fn from(anchor: &AnchorMatch) -> Self {
        Self {
            distance: anchor.distance_a,
            drift: anchor.drift,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    High,
    Med,
    Low,
    #[default]
    Uncertain,
}

impl ConfidenceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Med => "MED",
            Self::Low => "LOW",
            Self::Uncertain => "UNCERTAIN",
        }
    }

    pub fn from_score(score: f64, high: f64, med: f64, low: f64) -> Self {
        if score >= high {
            return Self::High;
        }
        if score >= med {
            return Self::Med;
        }
        if score >= low {
            return Self::Low;
        }
        Self::Uncertain
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ComponentScores {
    pub distance: f64,
    pub clock: f64,
    pub type_match: f64,
    pub dims: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub feature_id: FeatureId,
    pub score: f64,
    /// Corrected distance of the candidate minus the baseline feature's.
    pub distance_delta: f64,
}

/// One physical anomaly traced across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedGroup {
    pub group_id: String,
    pub features: BTreeMap<RunId, Option<Feature>>,
    pub corrected_distances: BTreeMap<RunId, Option<f64>>,
    pub score: f64,
    pub confidence: ConfidenceTier,
    pub components: ComponentScores,
    pub explanation: String,
    pub alternatives: Vec<RejectedCandidate>,
    pub ambiguous: bool,
}

impl MatchedGroup {
    pub fn feature(&self, run_id: &str) -> Option<&Feature> {
        self.features.get(run_id).and_then(Option::as_ref)
    }

    pub fn run_count(&self) -> usize {
        self.features.values().filter(|entry| entry.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrowthFlag {
    RapidGrowth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthResult {
    pub group_id: String,
    pub from_run_id: RunId,
    pub to_run_id: RunId,
    pub years: Option<f64>,
    pub depth_delta: Option<f64>,
    pub length_delta: Option<f64>,
    pub width_delta: Option<f64>,
    pub depth_rate: Option<f64>,
    pub length_rate: Option<f64>,
    pub width_rate: Option<f64>,
    pub flag: Option<GrowthFlag>,
    pub outlier_rate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionCategory {
    New,
    Missing,
    Uncertain,
    RapidGrowth,
}

impl ExceptionCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Missing => "MISSING",
            Self::Uncertain => "UNCERTAIN",
            Self::RapidGrowth => "RAPID_GROWTH",
        }
    }
}

impl std::fmt::Display for ExceptionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineException {
    pub category: ExceptionCategory,
    pub run_id: RunId,
    pub feature_id: FeatureId,
    pub distance: f64,
    pub group_id: Option<String>,
    pub details: String,
    pub recommendation: String,
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
