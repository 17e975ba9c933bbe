//! Rotation detection and correction
//!
//! Detection is tiered by source type:
//! - screenshots (lossless formats) are judged from the aspect ratio alone,
//!   without reading a single pixel
//! - photos consult their EXIF orientation first
//! - photos without a useful orientation tag may fall back to a cheap
//!   gradient-direction scan over a downscaled luma copy
//!
//! Detection is best effort and never returns an error; failures are reported
//! as a zero-confidence decision with method `error`.

use crate::codec::{self, DecodedImage};
use crate::config::RotationConfig;
use crate::error::PreprocessError;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;

use super::steps;

/// Clockwise correction angle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u16")]
pub enum RotationAngle {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl RotationAngle {
    pub fn degrees(self) -> u16 {
        match self {
            RotationAngle::Deg0 => 0,
            RotationAngle::Deg90 => 90,
            RotationAngle::Deg180 => 180,
            RotationAngle::Deg270 => 270,
        }
    }

    /// Map an EXIF orientation tag to the rotation that undoes it.
    /// Mirrored orientations and unknown codes map to no rotation.
    pub fn from_orientation_tag(tag: u32) -> Self {
        match tag {
            3 => RotationAngle::Deg180,
            6 => RotationAngle::Deg90,
            8 => RotationAngle::Deg270,
            _ => RotationAngle::Deg0,
        }
    }
}

impl From<RotationAngle> for u16 {
    fn from(angle: RotationAngle) -> Self {
        angle.degrees()
    }
}

/// How a rotation decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationMethod {
    DimensionalVertical,
    DimensionalHorizontal,
    DefaultDimensional,
    OrientationMetadata,
    GradientVisual,
    GradientVisualUncertain,
    AssumedCorrect,
    Error,
}

/// Method-specific evidence behind a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RotationDiagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation_tag: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_gradients: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_gradients: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationDecision {
    pub angle: RotationAngle,
    pub confidence: f64,
    pub method: RotationMethod,
    pub needs_rotation: bool,
    #[serde(flatten)]
    pub diagnostics: RotationDiagnostics,
}

impl RotationDecision {
    fn new(angle: RotationAngle, confidence: f64, method: RotationMethod) -> Self {
        Self {
            angle,
            confidence,
            method,
            needs_rotation: angle != RotationAngle::Deg0,
            diagnostics: RotationDiagnostics::default(),
        }
    }

    fn with_diagnostics(mut self, diagnostics: RotationDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    fn failed(error: impl Into<String>) -> Self {
        Self::new(RotationAngle::Deg0, 0.0, RotationMethod::Error).with_diagnostics(
            RotationDiagnostics {
                error: Some(error.into()),
                ..Default::default()
            },
        )
    }
}

/// Broad origin of an image, inferred from its container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceClass {
    /// Lossless screen capture
    Screenshot,
    /// Camera-style lossy image; `visual_fallback` marks formats worth a pixel scan
    Photo { visual_fallback: bool },
}

impl SourceClass {
    pub fn from_format(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Gif => SourceClass::Screenshot,
            ImageFormat::Jpeg | ImageFormat::Tiff => SourceClass::Photo {
                visual_fallback: true,
            },
            _ => SourceClass::Photo {
                visual_fallback: false,
            },
        }
    }
}

/// A buffer after rotation correction, with the decision that produced it
#[derive(Debug, Clone)]
pub struct Corrected {
    pub image: DynamicImage,
    pub decision: RotationDecision,
}

#[derive(Debug, Clone, Default)]
pub struct RotationDetector {
    config: RotationConfig,
}

impl RotationDetector {
    pub fn new(config: RotationConfig) -> Self {
        Self { config }
    }

    /// Decode raw bytes and detect. Decode failures become an `error` decision.
    pub fn detect_bytes(&self, bytes: &[u8]) -> RotationDecision {
        match codec::decode(bytes) {
            Ok(decoded) => self.detect(&decoded),
            Err(e) => {
                tracing::warn!("Rotation detection could not decode input: {}", e);
                RotationDecision::failed(e.to_string())
            }
        }
    }

    pub fn detect(&self, decoded: &DecodedImage) -> RotationDecision {
        let meta = &decoded.metadata;
        if meta.width == 0 || meta.height == 0 {
            return RotationDecision::failed("Image has zero dimensions");
        }

        let class = SourceClass::from_format(meta.format);
        let decision = match class {
            SourceClass::Screenshot => self.detect_dimensional(meta.width, meta.height),
            SourceClass::Photo { visual_fallback } => {
                let from_metadata = self.detect_from_orientation(meta.orientation);
                if from_metadata.needs_rotation {
                    from_metadata
                } else if visual_fallback && self.should_use_visual(meta.width, meta.height) {
                    match self.detect_visually(&decoded.image) {
                        Ok(decision) => decision,
                        Err(e) => {
                            tracing::warn!("Visual rotation analysis failed: {}", e);
                            RotationDecision::failed(e.to_string())
                        }
                    }
                } else {
                    RotationDecision::new(RotationAngle::Deg0, 0.8, RotationMethod::AssumedCorrect)
                        .with_diagnostics(from_metadata.diagnostics)
                }
            }
        };

        tracing::debug!(
            "Rotation decision for {:?}: {}° via {:?} (confidence {:.2})",
            class,
            decision.angle.degrees(),
            decision.method,
            decision.confidence
        );
        decision
    }

    /// Screenshot heuristic: chat screenshots are tall, so extreme ratios
    /// in either direction suggest a sideways capture.
    pub fn detect_dimensional(&self, width: u32, height: u32) -> RotationDecision {
        let aspect_ratio = width as f64 / height as f64;
        let diagnostics = RotationDiagnostics {
            aspect_ratio: Some(aspect_ratio),
            ..Default::default()
        };

        let decision = if aspect_ratio < self.config.suspicious_aspect_ratio {
            RotationDecision::new(
                RotationAngle::Deg90,
                0.7,
                RotationMethod::DimensionalVertical,
            )
        } else if aspect_ratio > self.config.wide_aspect_ratio {
            RotationDecision::new(
                RotationAngle::Deg90,
                0.6,
                RotationMethod::DimensionalHorizontal,
            )
        } else {
            RotationDecision::new(RotationAngle::Deg0, 0.95, RotationMethod::DefaultDimensional)
        };

        decision.with_diagnostics(diagnostics)
    }

    /// Orientation-tag lookup. A tag that maps to no rotation yields a
    /// zero-confidence decision so the caller can keep looking.
    pub fn detect_from_orientation(&self, tag: Option<u32>) -> RotationDecision {
        let angle = tag
            .map(RotationAngle::from_orientation_tag)
            .unwrap_or(RotationAngle::Deg0);
        let confidence = if angle != RotationAngle::Deg0 { 1.0 } else { 0.0 };

        RotationDecision::new(angle, confidence, RotationMethod::OrientationMetadata)
            .with_diagnostics(RotationDiagnostics {
                orientation_tag: tag,
                ..Default::default()
            })
    }

    fn should_use_visual(&self, width: u32, height: u32) -> bool {
        let min = self.config.visual_min_size;
        if width < min || height < min {
            return false;
        }
        (width as u64) * (height as u64) <= self.config.visual_max_pixels
    }

    /// Gradient-direction fallback. Only distinguishes "rotated by a quarter
    /// turn" from "upright", and always guesses 90° for the former.
    pub fn detect_visually(
        &self,
        image: &DynamicImage,
    ) -> Result<RotationDecision, PreprocessError> {
        let small = steps::resize::fit_within(image, self.config.visual_resize_target);
        let luma = small.to_luma8();
        let (width, height) = luma.dimensions();

        let (horizontal, vertical) = count_gradients(
            luma.as_raw(),
            width as usize,
            height as usize,
            self.config.visual_gradient_threshold,
            self.config.visual_sample_step,
        )?;

        let ratio = vertical as f64 / (horizontal as f64 + 1.0);
        let diagnostics = RotationDiagnostics {
            horizontal_gradients: Some(horizontal),
            vertical_gradients: Some(vertical),
            gradient_ratio: Some(ratio),
            ..Default::default()
        };

        let decision = if ratio > self.config.visual_ratio_threshold {
            RotationDecision::new(RotationAngle::Deg90, 0.6, RotationMethod::GradientVisual)
        } else {
            RotationDecision::new(
                RotationAngle::Deg0,
                0.5,
                RotationMethod::GradientVisualUncertain,
            )
        };

        Ok(decision.with_diagnostics(diagnostics))
    }

    /// Detect and apply the correction in one call. The returned image is the
    /// input buffer itself when no rotation is needed.
    pub fn detect_and_correct(&self, decoded: DecodedImage) -> Corrected {
        let decision = self.detect(&decoded);
        let image = if decision.needs_rotation {
            rotate(decoded.image, decision.angle)
        } else {
            decoded.image
        };
        Corrected { image, decision }
    }
}

/// Lossless clockwise rotation by a multiple of 90°. `Deg0` returns the input.
pub fn rotate(image: DynamicImage, angle: RotationAngle) -> DynamicImage {
    match angle {
        RotationAngle::Deg0 => image,
        RotationAngle::Deg90 => image.rotate90(),
        RotationAngle::Deg180 => image.rotate180(),
        RotationAngle::Deg270 => image.rotate270(),
    }
}

/// Count sampled pixels whose central-difference gradient exceeds `threshold`
/// horizontally and vertically. Returns `(horizontal, vertical)`.
pub fn count_gradients(
    luma: &[u8],
    width: usize,
    height: usize,
    threshold: u8,
    step: usize,
) -> Result<(u32, u32), PreprocessError> {
    if step == 0 {
        return Err(PreprocessError::Config(
            "Gradient sample step must be positive".to_string(),
        ));
    }
    if luma.len() < width * height {
        return Err(PreprocessError::Decode(format!(
            "Luma buffer holds {} samples, expected {}",
            luma.len(),
            width * height
        )));
    }

    let mut horizontal = 0u32;
    let mut vertical = 0u32;
    if width < 3 || height < 3 {
        return Ok((horizontal, vertical));
    }

    for y in (1..height - 1).step_by(step) {
        let row = y * width;
        for x in (1..width - 1).step_by(step) {
            let idx = row + x;
            let gx = luma[idx + 1].abs_diff(luma[idx - 1]);
            let gy = luma[idx + width].abs_diff(luma[idx - width]);

            if gx > threshold {
                horizontal += 1;
            }
            if gy > threshold {
                vertical += 1;
            }
        }
    }

    Ok((horizontal, vertical))
}
