//! Recognizer Configuration
//!
//! Matching thresholds and OCR settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::detection::TemplateMatchConfig;
use crate::vision::feature_match::FeatureFilterParams;
use crate::vision::features::FeatureExtractorConfig;
use crate::vision::ransac::RansacConfig;

/// Recognizer settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Template matching settings
    pub template: TemplateSettings,
    /// Feature matching settings
    pub features: FeatureSettings,
    /// OCR settings
    pub ocr: OcrSettings,
}

/// Template matching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    /// Minimum full-search score that confirms a match and fills the cache
    pub confirm_threshold: f64,
    /// Fraction of the matched size reported back to callers
    pub center_zoom: f64,
    /// Hue bins of the verification histogram
    pub hue_bins: usize,
    /// Saturation bins of the verification histogram
    pub saturation_bins: usize,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            confirm_threshold: 0.8,
            center_zoom: 0.8,
            hue_bins: 50,
            saturation_bins: 60,
        }
    }
}

impl TemplateSettings {
    pub fn matcher_config(&self) -> TemplateMatchConfig {
        TemplateMatchConfig {
            center_zoom: self.center_zoom,
            hue_bins: self.hue_bins,
            saturation_bins: self.saturation_bins,
        }
    }
}

/// Feature matching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    /// FAST detection threshold
    pub fast_threshold: u8,
    /// Keypoints kept per image
    pub max_keypoints: usize,
    /// Distance pruning ratio
    pub ratio_threshold: f32,
    /// Centroid filter distance when locating one element
    pub single_centroid_distance: f32,
    /// Centroid filter distance when scanning every element
    pub all_centroid_distance: f32,
    /// Surviving points needed per reference keypoint
    pub acceptance_ratio: f64,
    /// RANSAC inlier distance in pixels
    pub ransac_threshold: f64,
    /// Probability that RANSAC draws at least one clean sample
    pub ransac_confidence: f64,
    /// Upper bound on RANSAC hypotheses
    pub ransac_max_iterations: usize,
    /// Seed of the RANSAC sampler
    pub ransac_seed: u64,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        let single = FeatureFilterParams::single();
        let ransac = RansacConfig::default();
        Self {
            fast_threshold: 20,
            max_keypoints: 500,
            ratio_threshold: single.ratio_threshold,
            single_centroid_distance: single.centroid_distance,
            all_centroid_distance: FeatureFilterParams::scan_all().centroid_distance,
            acceptance_ratio: single.acceptance_ratio,
            ransac_threshold: ransac.threshold,
            ransac_confidence: ransac.confidence,
            ransac_max_iterations: ransac.max_iterations,
            ransac_seed: ransac.seed,
        }
    }
}

impl FeatureSettings {
    pub fn extractor_config(&self) -> FeatureExtractorConfig {
        FeatureExtractorConfig {
            fast_threshold: self.fast_threshold,
            max_keypoints: self.max_keypoints,
            ..Default::default()
        }
    }

    /// Filter parameters for single-element lookups
    pub fn single_params(&self) -> FeatureFilterParams {
        FeatureFilterParams {
            ratio_threshold: self.ratio_threshold,
            centroid_distance: self.single_centroid_distance,
            acceptance_ratio: self.acceptance_ratio,
        }
    }

    /// Filter parameters for scan-all lookups
    pub fn scan_all_params(&self) -> FeatureFilterParams {
        FeatureFilterParams {
            centroid_distance: self.all_centroid_distance,
            ..self.single_params()
        }
    }

    pub fn ransac_config(&self) -> RansacConfig {
        RansacConfig {
            threshold: self.ransac_threshold,
            confidence: self.ransac_confidence,
            max_iterations: self.ransac_max_iterations,
            seed: self.ransac_seed,
        }
    }
}

/// OCR settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Directory holding the OCR model files
    pub model_dir: Option<PathBuf>,
    /// Inference threads
    pub threads: usize,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            model_dir: None,
            threads: 4,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<RecognizerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: RecognizerConfig =
        toml::from_str(&content).with_context(|| format!("Invalid config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &RecognizerConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Default location of the config file in the user's config directory
pub fn default_config_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "uivision", "UiVision")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir.join("config.toml"))
}

/// Load the config at `path`, writing defaults there first if it does not exist
pub fn load_or_create_config(path: &Path) -> Result<RecognizerConfig> {
    if path.exists() {
        return load_config(path);
    }

    let config = RecognizerConfig::default();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    save_config(&config, path)?;
    tracing::info!("Created default config at {:?}", path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_default_config() {
        let config = RecognizerConfig::default();

        assert!((config.template.confirm_threshold - 0.8).abs() < 1e-9);
        assert!((config.template.center_zoom - 0.8).abs() < 1e-9);
        assert_eq!(config.template.hue_bins, 50);
        assert_eq!(config.template.saturation_bins, 60);

        assert_eq!(config.features.single_centroid_distance, 200.0);
        assert_eq!(config.features.all_centroid_distance, 300.0);
        assert!((config.features.acceptance_ratio - 0.075).abs() < 1e-9);
        assert!((config.features.ratio_threshold - 0.4).abs() < 1e-6);

        assert!(config.ocr.model_dir.is_none());
        assert_eq!(config.ocr.threads, 4);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = RecognizerConfig::default();
        config.template.confirm_threshold = 0.9;
        config.features.max_keypoints = 250;
        config.ocr.model_dir = Some(PathBuf::from("/opt/ocr"));

        let file = NamedTempFile::new().unwrap();
        save_config(&config, file.path()).unwrap();

        let loaded = load_config(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[template]\nconfirm_threshold = 0.95\n\n[ocr]\nthreads = 2").unwrap();

        let config = load_config(file.path()).unwrap();
        assert!((config.template.confirm_threshold - 0.95).abs() < 1e-9);
        assert_eq!(config.template.hue_bins, 50);
        assert_eq!(config.ocr.threads, 2);
        assert_eq!(config.features, FeatureSettings::default());
    }

    #[test]
    fn test_invalid_config_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[template]\nconfirm_threshold = \"high\"").unwrap();

        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = load_or_create_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, RecognizerConfig::default());
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_settings_convert_to_matcher_params() {
        let mut features = FeatureSettings::default();
        features.all_centroid_distance = 350.0;

        assert_eq!(features.single_params(), FeatureFilterParams::single());
        assert_eq!(features.scan_all_params().centroid_distance, 350.0);
        assert_eq!(features.ransac_config().max_iterations, 2000);
        assert_eq!(features.extractor_config().max_keypoints, 500);
    }
}
