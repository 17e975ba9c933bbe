//! Quality-driven image enhancement
//!
//! The transform sequence is a pure function of the quality report and the
//! buffer dimensions (`ImageEnhancer::plan`), so the same report always
//! produces the same ordered steps.

use crate::config::{EnhancementConfig, SharpenParams};
use crate::error::PreprocessError;
use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use std::time::Instant;

use super::pipeline::StepTiming;
use super::quality::{BrightnessStatus, QualityReport, SharpnessStatus};
use super::steps;

/// One transform in an enhancement plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum EnhancementStep {
    /// Aspect-preserving resize to a target height
    Resize { target_height: u32 },
    /// Brightness-only modulation
    Brightness { factor: f32 },
    NormalizeContrast,
    Sharpen(SharpenParams),
    /// Median filter of the given radius
    Denoise { radius: u32 },
    Grayscale,
    /// 8-bit sRGB without alpha
    NormalizeColorspace,
}

impl EnhancementStep {
    pub fn name(&self) -> &'static str {
        match self {
            EnhancementStep::Resize { .. } => "resize",
            EnhancementStep::Brightness { .. } => "brightness",
            EnhancementStep::NormalizeContrast => "normalize",
            EnhancementStep::Sharpen(_) => "sharpen",
            EnhancementStep::Denoise { .. } => "denoise",
            EnhancementStep::Grayscale => "grayscale",
            EnhancementStep::NormalizeColorspace => "colorspace",
        }
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, PreprocessError> {
        match *self {
            EnhancementStep::Resize { target_height } => {
                steps::resize::to_height(image, target_height)
            }
            EnhancementStep::Brightness { factor } => steps::brightness::apply(image, factor),
            EnhancementStep::NormalizeContrast => steps::normalize::apply(image),
            EnhancementStep::Sharpen(params) => steps::sharpen::apply(image, params),
            EnhancementStep::Denoise { radius } => steps::denoise::apply(image, radius),
            EnhancementStep::Grayscale => steps::grayscale::apply(image),
            EnhancementStep::NormalizeColorspace => steps::colorspace::apply(image),
        }
    }
}

/// Enhanced buffer plus what was done to it
#[derive(Debug, Clone)]
pub struct EnhancementOutcome {
    pub image: DynamicImage,
    pub plan: Vec<EnhancementStep>,
    pub timings: Vec<StepTiming>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageEnhancer {
    config: EnhancementConfig,
}

impl ImageEnhancer {
    pub fn new(config: EnhancementConfig) -> Self {
        Self { config }
    }

    /// Build the ordered transform sequence for a buffer of the given size.
    pub fn plan(&self, report: &QualityReport, width: u32, height: u32) -> Vec<EnhancementStep> {
        let c = &self.config;
        let mut plan = Vec::new();

        if let Some(target_height) = self.resize_target(width, height) {
            let target_height = self.bounded_height(width, height, target_height);
            if target_height != height {
                plan.push(EnhancementStep::Resize { target_height });
            }
        }

        let factor = match report.brightness.status {
            BrightnessStatus::TooDark => Some(c.too_dark_factor),
            BrightnessStatus::Dark => Some(c.dark_factor),
            BrightnessStatus::TooBright => Some(c.too_bright_factor),
            BrightnessStatus::Bright => Some(c.bright_factor),
            BrightnessStatus::Good => None,
        };
        if let Some(factor) = factor {
            plan.push(EnhancementStep::Brightness { factor });
        }

        if report.contrast.score < c.contrast_score_threshold {
            plan.push(EnhancementStep::NormalizeContrast);
        }

        match report.sharpness.status {
            SharpnessStatus::Blurry => plan.push(EnhancementStep::Sharpen(c.strong_sharpen)),
            SharpnessStatus::Soft => plan.push(EnhancementStep::Sharpen(c.moderate_sharpen)),
            SharpnessStatus::Good | SharpnessStatus::Sharp | SharpnessStatus::Unknown => {}
        }

        if report.sharpness.status == SharpnessStatus::Sharp {
            plan.push(EnhancementStep::Denoise {
                radius: c.median_radius,
            });
        }

        plan.push(EnhancementStep::NormalizeColorspace);
        plan
    }

    /// Fixed sequence used when the source needs no targeted enhancement
    pub fn baseline_plan(&self, width: u32, height: u32) -> Vec<EnhancementStep> {
        vec![
            EnhancementStep::Resize {
                target_height: self.bounded_height(width, height, self.config.target_height),
            },
            EnhancementStep::NormalizeContrast,
            EnhancementStep::Sharpen(self.config.moderate_sharpen),
            EnhancementStep::Denoise {
                radius: self.config.median_radius,
            },
            EnhancementStep::Grayscale,
        ]
    }

    fn bounded_height(&self, width: u32, height: u32, target_height: u32) -> u32 {
        let bounded = steps::resize::height_within_pixels(
            width,
            height,
            target_height,
            self.config.max_output_pixels,
        );
        if bounded != target_height {
            tracing::warn!(
                "Resize of {}x{} to height {} would exceed {} pixels, using height {}",
                width,
                height,
                target_height,
                self.config.max_output_pixels,
                bounded
            );
        }
        bounded
    }

    fn resize_target(&self, width: u32, height: u32) -> Option<u32> {
        let c = &self.config;
        let megapixels = (width as f64 * height as f64) / 1_000_000.0;

        if megapixels > c.oversized_megapixels {
            Some(c.target_height)
        } else if height < c.small_height {
            Some(c.upscale_height)
        } else if height > c.small_height
            && height < c.max_normalize_height
            && height != c.target_height
        {
            Some(c.target_height)
        } else {
            None
        }
    }

    /// Apply the report-driven plan. The input buffer is left untouched.
    pub fn enhance(
        &self,
        image: &DynamicImage,
        report: &QualityReport,
    ) -> Result<EnhancementOutcome, PreprocessError> {
        let (width, height) = image.dimensions();
        let plan = self.plan(report, width, height);
        tracing::info!(
            "Enhancing {}x{} with {} steps: {}",
            width,
            height,
            plan.len(),
            plan.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
        );
        self.execute(image, plan)
    }

    /// Cheap unconditional pipeline: resize, normalize, moderate sharpen,
    /// light denoise, grayscale.
    pub fn preprocess_for_ocr(
        &self,
        image: &DynamicImage,
    ) -> Result<EnhancementOutcome, PreprocessError> {
        tracing::info!("Applying baseline OCR preprocessing");
        let (width, height) = image.dimensions();
        self.execute(image, self.baseline_plan(width, height))
    }

    fn execute(
        &self,
        image: &DynamicImage,
        plan: Vec<EnhancementStep>,
    ) -> Result<EnhancementOutcome, PreprocessError> {
        let mut timings = Vec::with_capacity(plan.len());
        let mut img = image.clone();

        for step in &plan {
            img = run_step(step, img, &mut timings)?;
        }

        Ok(EnhancementOutcome {
            image: img,
            plan,
            timings,
        })
    }
}

fn run_step(
    step: &EnhancementStep,
    img: DynamicImage,
    timings: &mut Vec<StepTiming>,
) -> Result<DynamicImage, PreprocessError> {
    let step_start = Instant::now();
    let result = step.apply(img).map_err(|e| match e {
        PreprocessError::Transform(msg) => {
            PreprocessError::Transform(format!("{} step failed: {}", step.name(), msg))
        }
        other => other,
    })?;
    tracing::debug!("  {} done in {:?}", step.name(), step_start.elapsed());
    timings.push(StepTiming {
        name: step.name().to_string(),
        time_ms: step_start.elapsed().as_millis() as u64,
    });
    Ok(result)
}
