//! Image quality analysis
//!
//! Scores resolution, brightness, contrast and sharpness independently, then
//! combines them into an equal-weighted overall score, a letter grade and a
//! list of prioritized suggestions. The analysis never mutates its input.

use crate::codec::{self, DecodedImage, ImageMetadata};
use crate::config::QualityThresholds;
use crate::error::PreprocessError;
use image::DynamicImage;
use serde::Serialize;
use std::fmt;

use super::steps;

/// Weight of each axis in the overall score. Four axes, so they sum to 1.0.
const AXIS_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Poor,
    Acceptable,
    /// Fine for OCR but large enough to be downscaled later
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessStatus {
    TooDark,
    Dark,
    Good,
    Bright,
    TooBright,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContrastStatus {
    Low,
    Acceptable,
    Good,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SharpnessStatus {
    Blurry,
    Soft,
    Good,
    /// Very high variance, likely noise from aggressive source sharpening
    Sharp,
    /// Variance could not be measured; the axis fell back to a neutral score
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionReport {
    pub score: f64,
    pub status: ResolutionStatus,
    pub recommendation: Option<String>,
    pub megapixels: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrightnessReport {
    pub score: f64,
    pub status: BrightnessStatus,
    pub recommendation: Option<String>,
    /// Mean of the channel means, normalized to 0-1
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContrastReport {
    pub score: f64,
    pub status: ContrastStatus,
    pub recommendation: Option<String>,
    /// Mean channel standard deviation divided by the contrast divisor
    pub value: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharpnessReport {
    pub score: f64,
    pub status: SharpnessStatus,
    pub recommendation: Option<String>,
    /// Luma variance; `None` when the measurement failed
    pub variance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Step function over fixed score bands
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Grade::A
        } else if score >= 0.8 {
            Grade::B
        } else if score >= 0.7 {
            Grade::C
        } else if score >= 0.6 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Resolution,
    Brightness,
    Contrast,
    Sharpness,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub priority: Priority,
    pub axis: Axis,
    pub action: String,
}

/// Complete quality assessment of one image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub overall_score: f64,
    pub grade: Grade,
    pub needs_enhancement: bool,
    pub metadata: ImageMetadata,
    pub resolution: ResolutionReport,
    pub brightness: BrightnessReport,
    pub contrast: ContrastReport,
    pub sharpness: SharpnessReport,
    pub suggestions: Vec<Suggestion>,
}

impl QualityReport {
    /// The four axis scores in a fixed order
    pub fn axis_scores(&self) -> [f64; 4] {
        [
            self.resolution.score,
            self.brightness.score,
            self.contrast.score,
            self.sharpness.score,
        ]
    }
}

/// Computes a `QualityReport` from pixel statistics
#[derive(Debug, Clone, Default)]
pub struct QualityAnalyzer {
    thresholds: QualityThresholds,
}

impl QualityAnalyzer {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Analyze a decoded image.
    ///
    /// Fails only when channel statistics cannot be produced. A failed
    /// sharpness measurement degrades that axis instead of failing the report.
    pub fn analyze(&self, decoded: &DecodedImage) -> Result<QualityReport, PreprocessError> {
        let stats = codec::channel_statistics(&decoded.image);
        if stats.is_empty() {
            return Err(PreprocessError::Decode(
                "No colour channels available for statistics".to_string(),
            ));
        }

        let channels = stats.len() as f64;
        let mean_brightness = stats.iter().map(|c| c.mean).sum::<f64>() / channels;
        let mean_stdev = stats.iter().map(|c| c.stdev).sum::<f64>() / channels;

        let resolution = self.analyze_resolution(decoded.metadata.width, decoded.metadata.height);
        let brightness = self.analyze_brightness(mean_brightness);
        let contrast = self.analyze_contrast(mean_stdev);
        let sharpness = self.analyze_sharpness(&decoded.image);

        let overall_score = AXIS_WEIGHT
            * (resolution.score + brightness.score + contrast.score + sharpness.score);
        let suggestions = generate_suggestions(&resolution, &brightness, &contrast, &sharpness);

        tracing::debug!(
            "Quality axes: resolution={:.2} brightness={:.2} contrast={:.2} sharpness={:.2}",
            resolution.score,
            brightness.score,
            contrast.score,
            sharpness.score
        );

        Ok(QualityReport {
            overall_score,
            grade: Grade::from_score(overall_score),
            needs_enhancement: overall_score < self.thresholds.needs_enhancement_below,
            metadata: decoded.metadata.clone(),
            resolution,
            brightness,
            contrast,
            sharpness,
            suggestions,
        })
    }

    pub fn analyze_resolution(&self, width: u32, height: u32) -> ResolutionReport {
        let t = &self.thresholds;
        let megapixels = (width as f64 * height as f64) / 1_000_000.0;

        let (score, status, recommendation) = if megapixels < t.resolution_poor_mp {
            (
                0.4,
                ResolutionStatus::Poor,
                Some(format!(
                    "Image is very small (< {}MP). Use a larger image.",
                    t.resolution_poor_mp
                )),
            )
        } else if megapixels < t.resolution_acceptable_mp {
            (
                0.7,
                ResolutionStatus::Acceptable,
                Some("Low resolution. Larger images improve OCR.".to_string()),
            )
        } else if megapixels > t.resolution_oversized_mp {
            (
                0.9,
                ResolutionStatus::Good,
                Some("Very high resolution. Will be downscaled for performance.".to_string()),
            )
        } else {
            (1.0, ResolutionStatus::Excellent, None)
        };

        ResolutionReport {
            score,
            status,
            recommendation,
            megapixels,
            width,
            height,
        }
    }

    /// `mean` is the mean of the per-channel means on the 0-255 scale
    pub fn analyze_brightness(&self, mean: f64) -> BrightnessReport {
        let t = &self.thresholds;
        let value = mean / 255.0;

        let (score, status, recommendation) = if value < t.brightness_too_dark {
            (
                0.5,
                BrightnessStatus::TooDark,
                Some("Image is very dark. Increase brightness."),
            )
        } else if value < t.brightness_dark {
            (
                0.7,
                BrightnessStatus::Dark,
                Some("Image is dark. Consider increasing brightness."),
            )
        } else if value > t.brightness_too_bright {
            (
                0.6,
                BrightnessStatus::TooBright,
                Some("Image is very bright. Reduce brightness."),
            )
        } else if value > t.brightness_bright {
            (
                0.85,
                BrightnessStatus::Bright,
                Some("Image is slightly bright."),
            )
        } else {
            (1.0, BrightnessStatus::Good, None)
        };

        BrightnessReport {
            score,
            status,
            recommendation: recommendation.map(str::to_string),
            value,
        }
    }

    /// `std_dev` is the mean of the per-channel standard deviations
    pub fn analyze_contrast(&self, std_dev: f64) -> ContrastReport {
        let t = &self.thresholds;
        let value = std_dev / t.contrast_divisor;

        let (score, status, recommendation) = if value < t.contrast_low {
            (
                0.5,
                ContrastStatus::Low,
                Some("Contrast is very low. Normalize contrast."),
            )
        } else if value < t.contrast_acceptable {
            (
                0.7,
                ContrastStatus::Acceptable,
                Some("Contrast is low. Improve contrast."),
            )
        } else if value > t.contrast_high {
            (
                0.8,
                ContrastStatus::High,
                Some("Contrast is very high. May introduce noise."),
            )
        } else {
            (1.0, ContrastStatus::Good, None)
        };

        ContrastReport {
            score,
            status,
            recommendation: recommendation.map(str::to_string),
            value,
            std_dev,
        }
    }

    /// Never fails: a measurement error yields a neutral `Unknown` axis.
    pub fn analyze_sharpness(&self, image: &DynamicImage) -> SharpnessReport {
        match self.measure_sharpness(image) {
            Ok(variance) => self.classify_sharpness(variance),
            Err(e) => {
                tracing::warn!("Sharpness analysis degraded: {}", e);
                SharpnessReport {
                    score: 0.5,
                    status: SharpnessStatus::Unknown,
                    recommendation: Some("Could not analyze sharpness.".to_string()),
                    variance: None,
                }
            }
        }
    }

    pub fn classify_sharpness(&self, variance: f64) -> SharpnessReport {
        let t = &self.thresholds;
        let normalized = (variance / t.sharpness_normalizer).min(1.0);

        let (score, status, recommendation) = if variance < t.sharpness_blurry {
            (
                0.4,
                SharpnessStatus::Blurry,
                Some("Image is very blurry. Apply sharpening."),
            )
        } else if variance < t.sharpness_soft {
            (
                0.6,
                SharpnessStatus::Soft,
                Some("Image is slightly soft. Apply light sharpening."),
            )
        } else if variance > t.sharpness_noisy {
            (
                0.85,
                SharpnessStatus::Sharp,
                Some("Image is very sharp. May contain noise."),
            )
        } else {
            (normalized, SharpnessStatus::Good, None)
        };

        SharpnessReport {
            score,
            status,
            recommendation: recommendation.map(str::to_string),
            variance: Some(variance),
        }
    }

    /// Variance of luma intensities after shrinking to the analysis size.
    /// Higher variance means stronger edges.
    fn measure_sharpness(&self, image: &DynamicImage) -> Result<f64, PreprocessError> {
        let small = steps::resize::fit_within(image, self.thresholds.sharpness_max_dimension);
        let luma = small.to_luma8();
        let variance = intensity_variance(luma.as_raw()).ok_or_else(|| {
            PreprocessError::Decode("Cannot measure sharpness of an empty image".to_string())
        })?;

        if !variance.is_finite() {
            return Err(PreprocessError::Decode(format!(
                "Non-finite sharpness variance: {}",
                variance
            )));
        }
        Ok(variance)
    }
}

/// Population variance of 8-bit samples, `None` for an empty slice
pub fn intensity_variance(samples: &[u8]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let (sum, sum_sq) = samples.iter().fold((0u64, 0u64), |(s, sq), &v| {
        let v = v as u64;
        (s + v, sq + v * v)
    });

    let n = samples.len() as f64;
    let mean = sum as f64 / n;
    Some((sum_sq as f64 / n - mean * mean).max(0.0))
}

fn generate_suggestions(
    resolution: &ResolutionReport,
    brightness: &BrightnessReport,
    contrast: &ContrastReport,
    sharpness: &SharpnessReport,
) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    let mut push = |priority, axis, action: &str| {
        suggestions.push(Suggestion {
            priority,
            axis,
            action: action.to_string(),
        })
    };

    if resolution.score < 0.7 {
        push(
            Priority::High,
            Axis::Resolution,
            "Use a higher resolution image",
        );
    }

    match brightness.status {
        BrightnessStatus::TooDark => push(
            Priority::High,
            Axis::Brightness,
            "Increase brightness by 30%",
        ),
        BrightnessStatus::Dark => push(
            Priority::Medium,
            Axis::Brightness,
            "Increase brightness by 15%",
        ),
        BrightnessStatus::Bright => push(
            Priority::Medium,
            Axis::Brightness,
            "Reduce brightness by 5%",
        ),
        BrightnessStatus::TooBright => push(
            Priority::Medium,
            Axis::Brightness,
            "Reduce brightness by 15%",
        ),
        BrightnessStatus::Good => {}
    }

    if contrast.score < 0.7 {
        push(Priority::High, Axis::Contrast, "Normalize contrast");
    }

    match sharpness.status {
        SharpnessStatus::Blurry => push(
            Priority::High,
            Axis::Sharpness,
            "Apply strong sharpening",
        ),
        SharpnessStatus::Soft => push(
            Priority::Medium,
            Axis::Sharpness,
            "Apply light sharpening",
        ),
        SharpnessStatus::Good | SharpnessStatus::Sharp | SharpnessStatus::Unknown => {}
    }

    suggestions
}
