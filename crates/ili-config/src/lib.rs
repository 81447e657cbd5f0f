use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ILI_DIR_NAME: &str = ".ili";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_DIST_TOLERANCE: f64 = 5.0;
pub const DEFAULT_CLOCK_TOLERANCE_DEG: f64 = 30.0;
/// Placeholder until calibrated against reviewed match sets.
pub const DEFAULT_AMBIGUITY_EPSILON: f64 = 0.05;
pub const DEFAULT_SCORE_THRESH_HIGH: f64 = 0.85;
pub const DEFAULT_SCORE_THRESH_MED: f64 = 0.70;
pub const DEFAULT_SCORE_THRESH_LOW: f64 = 0.50;
pub const DEFAULT_RAPID_GROWTH_DEPTH_PCT: f64 = 10.0;
pub const DEFAULT_RAPID_GROWTH_LENGTH: f64 = 10.0;
pub const DEFAULT_MAX_DEPTH_RATE: f64 = 5.0;
pub const DEFAULT_ANCHOR_SCORE_FLOOR: f64 = 0.3;
pub const DEFAULT_PROXIMITY_WINDOW_FRACTION: f64 = 0.10;
pub const DEFAULT_MIN_SEGMENT_LENGTH: f64 = 0.01;
pub const DEFAULT_MIN_MATCH_RATE_PCT: f64 = 10.0;
pub const DEFAULT_MIN_ANCHOR_COVERAGE: f64 = 0.5;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IliConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub anchors: AnchorConfig,
    #[serde(default)]
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_dist_tolerance")]
    pub dist_tolerance: f64,
    #[serde(default = "default_clock_tolerance")]
    pub clock_tolerance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambiguity_epsilon: Option<f64>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            dist_tolerance: default_dist_tolerance(),
            clock_tolerance: default_clock_tolerance(),
            ambiguity_epsilon: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_score_thresh_high")]
    pub high: f64,
    #[serde(default = "default_score_thresh_med")]
    pub med: f64,
    #[serde(default = "default_score_thresh_low")]
    pub low: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            high: default_score_thresh_high(),
            med: default_score_thresh_med(),
            low: default_score_thresh_low(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthConfig {
    #[serde(default = "default_rapid_growth_depth")]
    pub rapid_growth_depth: f64,
    #[serde(default = "default_rapid_growth_length")]
    pub rapid_growth_length: f64,
    #[serde(default = "default_max_depth_rate")]
    pub max_depth_rate: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            rapid_growth_depth: default_rapid_growth_depth(),
            rapid_growth_length: default_rapid_growth_length(),
            max_depth_rate: default_max_depth_rate(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_weight_distance")]
    pub distance: f64,
    #[serde(default = "default_weight_secondary")]
    pub clock: f64,
    #[serde(default = "default_weight_secondary")]
    pub type_match: f64,
    #[serde(default = "default_weight_secondary")]
    pub dims: f64,
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.distance + self.clock + self.type_match + self.dims
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            distance: default_weight_distance(),
            clock: default_weight_secondary(),
            type_match: default_weight_secondary(),
            dims: default_weight_secondary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
    #[serde(default = "default_anchor_score_floor")]
    pub score_floor: f64,
    #[serde(default = "default_proximity_window_fraction")]
    pub proximity_window_fraction: f64,
    #[serde(default = "default_min_segment_length")]
    pub min_segment_length: f64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            score_floor: default_anchor_score_floor(),
            proximity_window_fraction: default_proximity_window_fraction(),
            min_segment_length: default_min_segment_length(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_min_match_rate_pct")]
    pub min_match_rate_pct: f64,
    #[serde(default = "default_min_anchor_coverage")]
    pub min_anchor_coverage: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_match_rate_pct: default_min_match_rate_pct(),
            min_anchor_coverage: default_min_anchor_coverage(),
        }
    }
}

/// Flattened, immutable view of the configuration consumed by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub dist_tolerance: f64,
    pub clock_tolerance: f64,
    pub ambiguity_epsilon: f64,
    pub score_thresh_high: f64,
    pub score_thresh_med: f64,
    pub score_thresh_low: f64,
    pub rapid_growth_depth: f64,
    pub rapid_growth_length: f64,
    pub max_depth_rate: f64,
    pub weights: ScoreWeights,
    pub anchor_score_floor: f64,
    pub proximity_window_fraction: f64,
    pub min_segment_length: f64,
    pub min_match_rate_pct: f64,
    pub min_anchor_coverage: f64,
}

impl Settings {
    /// Candidates scoring below half the low-confidence threshold are dropped
    /// before assignment.
    pub fn candidate_floor(&self) -> f64 {
        self.score_thresh_low / 2.0
    }
}

impl Default for Settings {
    fn default() -> Self {
        IliConfig::default().settings()
    }
}

impl IliConfig {
    pub fn settings(&self) -> Settings {
        Settings {
            dist_tolerance: self.matching.dist_tolerance,
            clock_tolerance: self.matching.clock_tolerance,
            ambiguity_epsilon: self
                .matching
                .ambiguity_epsilon
                .unwrap_or(DEFAULT_AMBIGUITY_EPSILON),
            score_thresh_high: self.confidence.high,
            score_thresh_med: self.confidence.med,
            score_thresh_low: self.confidence.low,
            rapid_growth_depth: self.growth.rapid_growth_depth,
            rapid_growth_length: self.growth.rapid_growth_length,
            max_depth_rate: self.growth.max_depth_rate,
            weights: self.weights,
            anchor_score_floor: self.anchors.score_floor,
            proximity_window_fraction: self.anchors.proximity_window_fraction,
            min_segment_length: self.anchors.min_segment_length,
            min_match_rate_pct: self.quality.min_match_rate_pct,
            min_anchor_coverage: self.quality.min_anchor_coverage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn ili_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(ILI_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    ili_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(workspace_root: impl AsRef<Path>) -> Result<IliConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(IliConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: IliConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<IliConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(ili_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = IliConfig::default();
    save_workspace_config(workspace_root, &config)?;

    Ok(config)
}

pub fn save_workspace_config(
    workspace_root: impl AsRef<Path>,
    config: &IliConfig,
) -> Result<(), ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(ili_dir(workspace_root))?;
    let content = toml::to_string_pretty(config)?;
    fs::write(config_path(workspace_root), content)?;
    Ok(())
}

/// Replaces non-finite numbers with their defaults. Out-of-range but finite
/// values are kept and reported by [`validate_config`] instead.
pub fn normalize_config(mut config: IliConfig) -> IliConfig {
    let defaults = IliConfig::default();

    finite_or(&mut config.matching.dist_tolerance, defaults.matching.dist_tolerance);
    finite_or(&mut config.matching.clock_tolerance, defaults.matching.clock_tolerance);
    config.matching.ambiguity_epsilon = config
        .matching
        .ambiguity_epsilon
        .filter(|value| value.is_finite());

    finite_or(&mut config.confidence.high, defaults.confidence.high);
    finite_or(&mut config.confidence.med, defaults.confidence.med);
    finite_or(&mut config.confidence.low, defaults.confidence.low);

    finite_or(&mut config.growth.rapid_growth_depth, defaults.growth.rapid_growth_depth);
    finite_or(&mut config.growth.rapid_growth_length, defaults.growth.rapid_growth_length);
    finite_or(&mut config.growth.max_depth_rate, defaults.growth.max_depth_rate);

    finite_or(&mut config.weights.distance, defaults.weights.distance);
    finite_or(&mut config.weights.clock, defaults.weights.clock);
    finite_or(&mut config.weights.type_match, defaults.weights.type_match);
    finite_or(&mut config.weights.dims, defaults.weights.dims);

    finite_or(&mut config.anchors.score_floor, defaults.anchors.score_floor);
    finite_or(
        &mut config.anchors.proximity_window_fraction,
        defaults.anchors.proximity_window_fraction,
    );
    finite_or(
        &mut config.anchors.min_segment_length,
        defaults.anchors.min_segment_length,
    );

    finite_or(&mut config.quality.min_match_rate_pct, defaults.quality.min_match_rate_pct);
    finite_or(&mut config.quality.min_anchor_coverage, defaults.quality.min_anchor_coverage);

    config
}

pub fn validate_config(config: &IliConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    let weights = &config.weights;
    let sum = weights.sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        warnings.push(ConfigWarning {
            code: "weights_not_normalized",
            message: format!(
                "score weights sum to {sum:.4} instead of 1.0; match scores will not be on a 0..1 scale"
            ),
        });
    }
    for (name, value) in [
        ("distance", weights.distance),
        ("clock", weights.clock),
        ("type_match", weights.type_match),
        ("dims", weights.dims),
    ] {
        if value < 0.0 {
            warnings.push(ConfigWarning {
                code: "negative_weight",
                message: format!("weights.{name} is negative ({value})"),
            });
        }
    }

    let confidence = &config.confidence;
    if !(confidence.high >= confidence.med && confidence.med >= confidence.low) {
        warnings.push(ConfigWarning {
            code: "thresholds_not_descending",
            message: format!(
                "confidence thresholds must satisfy high >= med >= low (got {}, {}, {})",
                confidence.high, confidence.med, confidence.low
            ),
        });
    }

    if config.matching.dist_tolerance <= 0.0 {
        warnings.push(ConfigWarning {
            code: "non_positive_dist_tolerance",
            message: format!(
                "matching.dist_tolerance is {}; no anomaly pair can be matched",
                config.matching.dist_tolerance
            ),
        });
    }
    if config.matching.clock_tolerance <= 0.0 {
        warnings.push(ConfigWarning {
            code: "non_positive_clock_tolerance",
            message: format!(
                "matching.clock_tolerance is {}; only identical clock positions score",
                config.matching.clock_tolerance
            ),
        });
    }

    match config.matching.ambiguity_epsilon {
        None => warnings.push(ConfigWarning {
            code: "uncalibrated_ambiguity_epsilon",
            message: format!(
                "matching.ambiguity_epsilon is not set; using uncalibrated default {DEFAULT_AMBIGUITY_EPSILON}"
            ),
        }),
        Some(epsilon) if epsilon < 0.0 => warnings.push(ConfigWarning {
            code: "negative_ambiguity_epsilon",
            message: format!(
                "matching.ambiguity_epsilon is negative ({epsilon}); ambiguity checks are disabled"
            ),
        }),
        Some(_) => {}
    }

    warnings
}

fn finite_or(value: &mut f64, fallback: f64) {
    if !value.is_finite() {
        *value = fallback;
    }
}

fn default_dist_tolerance() -> f64 {
    DEFAULT_DIST_TOLERANCE
}

fn default_clock_tolerance() -> f64 {
    DEFAULT_CLOCK_TOLERANCE_DEG
}

fn default_score_thresh_high() -> f64 {
    DEFAULT_SCORE_THRESH_HIGH
}

fn default_score_thresh_med() -> f64 {
    DEFAULT_SCORE_THRESH_MED
}

fn default_score_thresh_low() -> f64 {
    DEFAULT_SCORE_THRESH_LOW
}

fn default_rapid_growth_depth() -> f64 {
    DEFAULT_RAPID_GROWTH_DEPTH_PCT
}

fn default_rapid_growth_length() -> f64 {
    DEFAULT_RAPID_GROWTH_LENGTH
}

fn default_max_depth_rate() -> f64 {
    DEFAULT_MAX_DEPTH_RATE
}

fn default_weight_distance() -> f64 {
    0.4
}

fn default_weight_secondary() -> f64 {
    0.2
}

fn default_anchor_score_floor() -> f64 {
    DEFAULT_ANCHOR_SCORE_FLOOR
}

fn default_proximity_window_fraction() -> f64 {
    DEFAULT_PROXIMITY_WINDOW_FRACTION
}

fn default_min_segment_length() -> f64 {
    DEFAULT_MIN_SEGMENT_LENGTH
}

fn default_min_match_rate_pct() -> f64 {
    DEFAULT_MIN_MATCH_RATE_PCT
}

fn default_min_anchor_coverage() -> f64 {
    DEFAULT_MIN_ANCHOR_COVERAGE
}
