use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LoggingConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub alignment: AlignmentConfig,
    pub batch: BatchConfig,
    pub caption: CaptionConfig,
    pub logging: LoggingConfig,
}

/// Policy thresholds owned by the alignment orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Either image with fewer keypoints than this fails with
    /// `InsufficientFeatures`. The ratio test cannot work with less than 2.
    pub min_features: usize,
    pub sift: SiftConfig,
    pub matcher: MatcherConfig,
    pub ransac: RansacConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    /// Keep only the strongest `n_features` keypoints; 0 keeps all of them.
    pub n_features: usize,
    pub n_octave_layers: usize,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    pub sigma: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Lowe ratio: keep a match when `d1 < ratio_threshold * d2`.
    pub ratio_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Estimation needs strictly more good matches than this.
    pub min_correspondences: usize,
    pub max_iterations: usize,
    /// Reprojection distance in pixels under which a pair counts as inlier.
    pub inlier_threshold: f64,
    /// A homography is accepted only with strictly more inliers than this.
    pub min_inliers: usize,
    /// Probability used to shrink the iteration budget as support grows.
    pub confidence: f64,
    pub seed: u64,
    /// Re-fit the winning model on all of its inliers.
    pub refine: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub reference_image: Option<PathBuf>,
    pub input_folder: Option<PathBuf>,
    pub output_folder: Option<PathBuf>,
    /// Lower-case file extensions picked up from the input folder.
    pub extensions: Vec<String>,
    pub write_report: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptionPosition {
    Top,
    #[default]
    Bottom,
}

impl std::str::FromStr for CaptionPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            other => Err(format!("unknown caption position '{}', expected top or bottom", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub enabled: bool,
    /// TrueType/OpenType font; captions are skipped when it cannot be loaded.
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub position: CaptionPosition,
    /// chrono format string for the capture date.
    pub date_format: String,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            min_features: 2,
            sift: SiftConfig::default(),
            matcher: MatcherConfig::default(),
            ransac: RansacConfig::default(),
        }
    }
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            n_features: 0,
            n_octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.75,
        }
    }
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            min_correspondences: 10,
            max_iterations: 2000,
            inlier_threshold: 3.0, // pixels
            min_inliers: 10,
            confidence: 0.995,
            seed: 0x5eed,
            refine: true,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            reference_image: None,
            input_folder: None,
            output_folder: None,
            extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            write_report: true,
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            font_path: None,
            font_size: 100.0,
            position: CaptionPosition::Bottom,
            date_format: "%B %d".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)?;

        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> crate::Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let alignment = &self.alignment;

        if alignment.sift.n_octave_layers == 0 {
            errors.push("SIFT n_octave_layers must be positive".to_string());
        }

        if alignment.sift.sigma <= 0.5 {
            errors.push("SIFT sigma must be greater than the assumed input blur of 0.5".to_string());
        }

        if alignment.sift.contrast_threshold < 0.0 || alignment.sift.edge_threshold <= 0.0 {
            errors.push("SIFT thresholds must be positive".to_string());
        }

        if !(alignment.matcher.ratio_threshold > 0.0 && alignment.matcher.ratio_threshold <= 1.0) {
            errors.push("Matcher ratio_threshold must be in (0, 1]".to_string());
        }

        if alignment.min_features < 2 {
            errors.push("min_features must be at least 2 for the ratio test".to_string());
        }

        if alignment.ransac.max_iterations == 0 {
            errors.push("RANSAC max_iterations must be positive".to_string());
        }

        if alignment.ransac.inlier_threshold <= 0.0 {
            errors.push("RANSAC inlier_threshold must be positive".to_string());
        }

        if !(alignment.ransac.confidence > 0.0 && alignment.ransac.confidence < 1.0) {
            errors.push("RANSAC confidence must be in (0, 1)".to_string());
        }

        if alignment.ransac.min_correspondences < 4 {
            errors.push("RANSAC min_correspondences must be at least 4".to_string());
        }

        if alignment.ransac.min_inliers < 4 {
            errors.push("RANSAC min_inliers must be at least 4".to_string());
        }

        if self.batch.extensions.is_empty() {
            errors.push("Batch extensions must not be empty".to_string());
        }

        if self.caption.font_size <= 0.0 {
            errors.push("Caption font_size must be positive".to_string());
        }

        if let Err(message) = self.logging.validate() {
            errors.push(message);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

pub fn load_config_or_default(config_path: Option<&Path>) -> Config {
    match config_path {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    tracing::warn!(path = %path.display(), "Configuration validation errors:");
                    for error in errors {
                        tracing::warn!("  - {}", error);
                    }
                    tracing::warn!("Using default configuration instead.");
                    Config::default()
                } else {
                    config
                }
            }
            Err(e) => {
                tracing::warn!("Failed to load config from '{}': {}", path.display(), e);
                tracing::warn!("Using default configuration.");
                Config::default()
            }
        },
        None => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alignment.matcher.ratio_threshold, 0.75);
        assert_eq!(config.alignment.ransac.min_correspondences, 10);
        assert_eq!(config.alignment.ransac.min_inliers, 10);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.alignment.matcher.ratio_threshold = 1.5;
        config.alignment.ransac.max_iterations = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_toml_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("align.toml");

        let mut config = Config::default();
        config.caption.position = CaptionPosition::Top;
        config.alignment.ransac.seed = 7;
        config.save_to_file(&path, ConfigFormat::Toml).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("align.json");
        fs::write(&path, r#"{ "alignment": { "matcher": { "ratio_threshold": 0.6 } } }"#).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.alignment.matcher.ratio_threshold, 0.6);
        assert_eq!(loaded.alignment.ransac.min_correspondences, 10);
        assert_eq!(loaded.caption.date_format, "%B %d");
    }

    #[test]
    fn test_invalid_file_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "alignment = [").unwrap();

        let config = load_config_or_default(Some(&path));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_caption_position_parsing() {
        assert_eq!("TOP".parse::<CaptionPosition>(), Ok(CaptionPosition::Top));
        assert_eq!("bottom".parse::<CaptionPosition>(), Ok(CaptionPosition::Bottom));
        assert!("middle".parse::<CaptionPosition>().is_err());
    }
}
