//! Typed configuration for the preprocessing pipeline and its HTTP surface.
//!
//! Every threshold the analyzers and the enhancer consult lives here so the
//! bands can be reviewed and overridden from a JSON file without touching code.

use crate::error::PreprocessError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 10 MiB upload cap
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub preprocess: PreprocessConfig,
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Maximum accepted source size in bytes
    pub max_file_size: u64,
    /// Lower-case file extensions accepted by the pipeline (without the dot)
    pub accepted_extensions: Vec<String>,
    /// Directory used by `save_processed` when the caller doesn't choose one
    pub output_dir: PathBuf,
    pub quality: QualityThresholds,
    pub rotation: RotationConfig,
    pub enhancement: EnhancementConfig,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            accepted_extensions: ["png", "jpg", "jpeg", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_dir: PathBuf::from("uploads/processed"),
            quality: QualityThresholds::default(),
            rotation: RotationConfig::default(),
            enhancement: EnhancementConfig::default(),
        }
    }
}

impl PreprocessConfig {
    /// Load overrides from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PreprocessError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            PreprocessError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject threshold sets whose bands overlap or whose sizes are zero.
    pub fn validate(&self) -> Result<(), PreprocessError> {
        let mut errors = Vec::new();
        let q = &self.quality;
        let r = &self.rotation;
        let e = &self.enhancement;

        if self.max_file_size == 0 {
            errors.push("max_file_size must be positive".to_string());
        }
        if self.accepted_extensions.is_empty() {
            errors.push("accepted_extensions must not be empty".to_string());
        }
        if !(q.resolution_poor_mp < q.resolution_acceptable_mp
            && q.resolution_acceptable_mp <= q.resolution_oversized_mp)
        {
            errors.push("resolution bands must be increasing".to_string());
        }
        if !(q.brightness_too_dark < q.brightness_dark
            && q.brightness_dark <= q.brightness_bright
            && q.brightness_bright < q.brightness_too_bright)
        {
            errors.push("brightness bands must be increasing".to_string());
        }
        if !(q.contrast_low < q.contrast_acceptable && q.contrast_acceptable < q.contrast_high) {
            errors.push("contrast bands must be increasing".to_string());
        }
        if !(q.sharpness_blurry < q.sharpness_soft && q.sharpness_soft < q.sharpness_noisy) {
            errors.push("sharpness bands must be increasing".to_string());
        }
        if q.contrast_divisor <= 0.0 || q.sharpness_normalizer <= 0.0 {
            errors.push("normalizers must be positive".to_string());
        }
        if q.sharpness_max_dimension == 0 {
            errors.push("sharpness_max_dimension must be positive".to_string());
        }
        if r.suspicious_aspect_ratio >= r.wide_aspect_ratio {
            errors.push("suspicious_aspect_ratio must be below wide_aspect_ratio".to_string());
        }
        if r.visual_sample_step == 0 || r.visual_resize_target == 0 {
            errors.push("visual sampling parameters must be positive".to_string());
        }
        if e.target_height == 0 || e.upscale_height == 0 {
            errors.push("enhancement target heights must be positive".to_string());
        }
        if e.max_output_pixels == 0 {
            errors.push("max_output_pixels must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PreprocessError::Config(errors.join("; ")))
        }
    }
}

/// Bands used by the quality analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub resolution_poor_mp: f64,
    pub resolution_acceptable_mp: f64,
    /// Above this the image is flagged for downscaling
    pub resolution_oversized_mp: f64,

    /// Normalized mean brightness cutoffs (0-1)
    pub brightness_too_dark: f64,
    pub brightness_dark: f64,
    pub brightness_bright: f64,
    pub brightness_too_bright: f64,

    /// Normalized mean stdev cutoffs (stdev / contrast_divisor)
    pub contrast_low: f64,
    pub contrast_acceptable: f64,
    pub contrast_high: f64,
    pub contrast_divisor: f64,

    /// Raw luma variance cutoffs
    pub sharpness_blurry: f64,
    pub sharpness_soft: f64,
    pub sharpness_noisy: f64,
    pub sharpness_normalizer: f64,
    /// Luma is reduced to fit inside this square before measuring variance
    pub sharpness_max_dimension: u32,

    /// Overall score below which the full enhancement pipeline runs
    pub needs_enhancement_below: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            resolution_poor_mp: 0.5,
            resolution_acceptable_mp: 2.0,
            resolution_oversized_mp: 8.0,
            brightness_too_dark: 0.2,
            brightness_dark: 0.3,
            brightness_bright: 0.7,
            brightness_too_bright: 0.8,
            contrast_low: 0.3,
            contrast_acceptable: 0.5,
            contrast_high: 1.2,
            contrast_divisor: 128.0,
            sharpness_blurry: 50.0,
            sharpness_soft: 100.0,
            sharpness_noisy: 800.0,
            sharpness_normalizer: 500.0,
            sharpness_max_dimension: 500,
            needs_enhancement_below: 0.7,
        }
    }
}

/// Parameters for the tiered rotation detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// width/height below this suggests a sideways capture
    pub suspicious_aspect_ratio: f64,
    /// width/height above this suggests a sideways capture
    pub wide_aspect_ratio: f64,

    /// Images with either side below this are not worth a visual pass
    pub visual_min_size: u32,
    /// Images above this pixel count skip the visual pass
    pub visual_max_pixels: u64,
    pub visual_resize_target: u32,
    pub visual_gradient_threshold: u8,
    pub visual_ratio_threshold: f64,
    pub visual_sample_step: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            suspicious_aspect_ratio: 0.4,
            wide_aspect_ratio: 2.5,
            visual_min_size: 100,
            visual_max_pixels: 10_000_000,
            visual_resize_target: 150,
            visual_gradient_threshold: 40,
            visual_ratio_threshold: 2.0,
            visual_sample_step: 5,
        }
    }
}

/// Unsharp-mask parameters. Fields missing from an override take the
/// moderate defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpenParams {
    pub sigma: f32,
    /// Amount applied in flat areas
    pub m1: f32,
    /// Amount applied across edges
    pub m2: f32,
}

impl Default for SharpenParams {
    fn default() -> Self {
        Self {
            sigma: 1.5,
            m1: 0.7,
            m2: 0.7,
        }
    }
}

/// Parameters for the image enhancer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    pub oversized_megapixels: f64,
    pub target_height: u32,
    pub small_height: u32,
    pub upscale_height: u32,
    pub max_normalize_height: u32,
    /// Upper bound on the pixel count any resize may produce
    pub max_output_pixels: u64,

    pub too_dark_factor: f32,
    pub dark_factor: f32,
    pub bright_factor: f32,
    pub too_bright_factor: f32,

    /// Contrast scores below this trigger histogram stretching
    pub contrast_score_threshold: f64,

    pub strong_sharpen: SharpenParams,
    pub moderate_sharpen: SharpenParams,

    /// Median filter radius (1 = 3x3 window)
    pub median_radius: u32,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            oversized_megapixels: 8.0,
            target_height: 1920,
            small_height: 1000,
            upscale_height: 1500,
            max_normalize_height: 3000,
            max_output_pixels: 12_000_000,
            too_dark_factor: 1.30,
            dark_factor: 1.15,
            bright_factor: 0.95,
            too_bright_factor: 0.85,
            contrast_score_threshold: 0.7,
            strong_sharpen: SharpenParams {
                sigma: 2.0,
                m1: 1.0,
                m2: 1.0,
            },
            moderate_sharpen: SharpenParams::default(),
            median_radius: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PreprocessConfig::default().validate().is_ok());
    }

    #[test]
    fn test_overlapping_bands_rejected() {
        let mut config = PreprocessConfig::default();
        config.quality.brightness_dark = 0.1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("brightness"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        std::fs::write(&path, r#"{"rotation": {"visual_sample_step": 3}}"#).unwrap();

        let config = PreprocessConfig::from_json_file(&path).unwrap();
        assert_eq!(config.rotation.visual_sample_step, 3);
        assert_eq!(config.rotation.wide_aspect_ratio, 2.5);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn test_partial_sharpen_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        std::fs::write(&path, r#"{"enhancement": {"strong_sharpen": {"sigma": 3.0}}}"#).unwrap();

        let config = PreprocessConfig::from_json_file(&path).unwrap();
        let strong = config.enhancement.strong_sharpen;
        assert_eq!(strong.sigma, 3.0);
        assert_eq!(strong.m1, SharpenParams::default().m1);
        assert_eq!(strong.m2, SharpenParams::default().m2);
        assert_eq!(config.enhancement.target_height, 1920);
    }
}
