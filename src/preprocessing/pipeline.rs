use crate::codec::{self, DecodedImage};
use crate::config::PreprocessConfig;
use crate::error::PreprocessError;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::enhancer::{EnhancementStep, ImageEnhancer};
use super::quality::{QualityAnalyzer, QualityReport, SharpnessStatus};
use super::rotation::{self, RotationDecision, RotationDetector, RotationMethod};

/// Timing information for a single pipeline stage or transform
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Which enhancement path a run took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementMode {
    /// Report-driven transform sequence
    Full,
    /// Fixed cheap sequence for images that already score well
    Baseline,
}

#[derive(Debug, Clone, Serialize)]
pub struct OriginalImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
    /// Decoded source pixels (not serialized)
    #[serde(skip)]
    pub image: DynamicImage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedImage {
    /// Final pixels (not serialized)
    #[serde(skip)]
    pub image: DynamicImage,
    /// Final pixels encoded as PNG (not serialized)
    #[serde(skip)]
    pub encoded: Vec<u8>,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Everything a single pipeline run produced
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingResult {
    pub original: OriginalImage,
    pub processed: ProcessedImage,
    pub quality: QualityReport,
    pub rotation: RotationDecision,
    pub enhancement: EnhancementMode,
    pub plan: Vec<EnhancementStep>,
    /// Individual stage and transform timings
    pub steps: Vec<StepTiming>,
    /// Total preprocessing time in milliseconds
    pub total_time_ms: u64,
    /// Non-fatal conditions met along the way
    pub warnings: Vec<String>,
}

/// Orchestrates validation, quality analysis, rotation and enhancement
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
    analyzer: QualityAnalyzer,
    detector: RotationDetector,
    enhancer: ImageEnhancer,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            analyzer: QualityAnalyzer::new(config.quality.clone()),
            detector: RotationDetector::new(config.rotation.clone()),
            enhancer: ImageEnhancer::new(config.enhancement.clone()),
            config,
        }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &QualityAnalyzer {
        &self.analyzer
    }

    pub fn detector(&self) -> &RotationDetector {
        &self.detector
    }

    pub fn enhancer(&self) -> &ImageEnhancer {
        &self.enhancer
    }

    /// Process an image file on disk.
    ///
    /// The file's existence, extension and size are checked before any byte
    /// is read or decoded.
    pub fn process(&self, path: &Path) -> Result<PreprocessingResult, PreprocessError> {
        let start = Instant::now();
        tracing::info!("Preprocessing {}", path.display());

        let size = self.validate_file(path)?;
        let bytes = std::fs::read(path)?;
        tracing::info!("Input accepted: {:.2} KB", size as f64 / 1024.0);

        self.run(&bytes, Some(path.to_path_buf()), start)
    }

    /// Process an in-memory upload; `file_name` supplies the extension.
    pub fn process_bytes(
        &self,
        bytes: &[u8],
        file_name: &str,
    ) -> Result<PreprocessingResult, PreprocessError> {
        let start = Instant::now();
        tracing::info!("Preprocessing upload {}", file_name);

        self.validate_extension(Path::new(file_name))?;
        self.validate_size(bytes.len() as u64)?;

        self.run(bytes, None, start)
    }

    /// Check that a file exists, has an accepted extension and fits the size cap.
    /// Returns the file size in bytes.
    pub fn validate_file(&self, path: &Path) -> Result<u64, PreprocessError> {
        if !path.is_file() {
            return Err(PreprocessError::NotFound(path.to_path_buf()));
        }
        self.validate_extension(path)?;

        let size = std::fs::metadata(path)?.len();
        self.validate_size(size)?;
        Ok(size)
    }

    fn validate_extension(&self, path: &Path) -> Result<(), PreprocessError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if self.config.accepted_extensions.iter().any(|a| *a == ext) {
            return Ok(());
        }

        let shown = if ext.is_empty() {
            "(none)".to_string()
        } else {
            format!(".{}", ext)
        };
        Err(PreprocessError::UnsupportedFormat(format!(
            "{} (accepted: {})",
            shown,
            self.config.accepted_extensions.join(", ")
        )))
    }

    fn validate_size(&self, size: u64) -> Result<(), PreprocessError> {
        if size > self.config.max_file_size {
            return Err(PreprocessError::FileTooLarge {
                size,
                max: self.config.max_file_size,
            });
        }
        Ok(())
    }

    fn run(
        &self,
        bytes: &[u8],
        path: Option<PathBuf>,
        start: Instant,
    ) -> Result<PreprocessingResult, PreprocessError> {
        let mut timings = Vec::new();
        let mut warnings = Vec::new();

        let decoded = run_stage("decode", &mut timings, || codec::decode(bytes))?;

        tracing::info!("Stage 1/4: quality analysis");
        let quality = run_stage("quality", &mut timings, || self.analyzer.analyze(&decoded))?;
        log_quality(&quality);
        if quality.sharpness.status == SharpnessStatus::Unknown {
            warnings.push("Sharpness could not be measured; axis scored as neutral".to_string());
        }

        tracing::info!("Stage 2/4: rotation detection");
        let rotation = run_stage("rotation", &mut timings, || {
            Ok(self.detector.detect(&decoded))
        })?;
        log_rotation(&rotation);
        match rotation.method {
            RotationMethod::Error => warnings.push(format!(
                "Rotation detection failed: {}",
                rotation.diagnostics.error.as_deref().unwrap_or("unknown error")
            )),
            RotationMethod::GradientVisualUncertain => {
                warnings.push("Rotation uncertain; assuming upright".to_string())
            }
            _ => {}
        }

        let rotated = if rotation.needs_rotation {
            Some(run_stage("rotate", &mut timings, || {
                Ok(rotation::rotate(decoded.image.clone(), rotation.angle))
            })?)
        } else {
            None
        };
        let working = rotated.as_ref().unwrap_or(&decoded.image);

        tracing::info!("Stage 3/4: enhancement");
        let (mode, outcome) = if quality.needs_enhancement {
            (
                EnhancementMode::Full,
                self.enhancer.enhance(working, &quality)?,
            )
        } else {
            tracing::info!("Image already scores well, applying baseline preprocessing");
            (
                EnhancementMode::Baseline,
                self.enhancer.preprocess_for_ocr(working)?,
            )
        };
        timings.extend(outcome.timings);
        let final_image = outcome.image;

        tracing::info!("Stage 4/4: final validation");
        let encoded = run_stage("encode", &mut timings, || {
            codec::encode(&final_image, ImageFormat::Png)
        })?;
        let (width, height) = validate_output(&final_image, &encoded)?;

        let DecodedImage { image, .. } = decoded;
        let total_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Preprocessing finished in {}ms: {}x{}, {:.2} KB -> {:.2} KB, quality {:.1}% ({})",
            total_time_ms,
            width,
            height,
            bytes.len() as f64 / 1024.0,
            encoded.len() as f64 / 1024.0,
            quality.overall_score * 100.0,
            quality.grade
        );

        Ok(PreprocessingResult {
            original: OriginalImage {
                path,
                size_bytes: bytes.len() as u64,
                image,
            },
            processed: ProcessedImage {
                channels: final_image.color().channel_count(),
                image: final_image,
                size_bytes: encoded.len() as u64,
                encoded,
                width,
                height,
            },
            quality,
            rotation,
            enhancement: mode,
            plan: outcome.plan,
            steps: timings,
            total_time_ms,
            warnings,
        })
    }

    /// Write the processed buffer as `<stem>_processed.png` inside `output_dir`
    /// (or the configured default) and return the written path.
    pub fn save_processed(
        &self,
        result: &PreprocessingResult,
        original_path: &Path,
        output_dir: Option<&Path>,
    ) -> Result<PathBuf, PreprocessError> {
        let dir = output_dir.unwrap_or(&self.config.output_dir);
        std::fs::create_dir_all(dir)?;

        let stem = original_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        let output_path = dir.join(format!("{}_processed.png", stem));

        std::fs::write(&output_path, &result.processed.encoded)?;
        tracing::info!("Saved processed image to {}", output_path.display());

        Ok(output_path)
    }
}

fn run_stage<T, F>(
    name: &str,
    timings: &mut Vec<StepTiming>,
    stage: F,
) -> Result<T, PreprocessError>
where
    F: FnOnce() -> Result<T, PreprocessError>,
{
    let stage_start = Instant::now();
    let result = stage()?;
    timings.push(StepTiming {
        name: name.to_string(),
        time_ms: stage_start.elapsed().as_millis() as u64,
    });
    Ok(result)
}

/// Re-read the encoded output and make sure it matches the final buffer.
fn validate_output(image: &DynamicImage, encoded: &[u8]) -> Result<(u32, u32), PreprocessError> {
    let (width, height) = codec::read_dimensions(encoded)?;
    if width == 0 || height == 0 {
        return Err(PreprocessError::Transform(
            "Processed image has zero dimensions".to_string(),
        ));
    }
    if (width, height) != (image.width(), image.height()) {
        return Err(PreprocessError::Transform(format!(
            "Encoded output is {}x{} but buffer is {}x{}",
            width,
            height,
            image.width(),
            image.height()
        )));
    }
    Ok((width, height))
}

fn log_quality(quality: &QualityReport) {
    tracing::info!(
        "  Overall score: {:.1}% (grade {})",
        quality.overall_score * 100.0,
        quality.grade
    );
    tracing::info!(
        "  Resolution: {}x{} ({:.2}MP) - {:?}",
        quality.resolution.width,
        quality.resolution.height,
        quality.resolution.megapixels,
        quality.resolution.status
    );
    tracing::info!(
        "  Brightness: {:.1}% - {:?}",
        quality.brightness.value * 100.0,
        quality.brightness.status
    );
    tracing::info!(
        "  Contrast: stdev {:.2} - {:?}",
        quality.contrast.std_dev,
        quality.contrast.status
    );
    tracing::info!(
        "  Sharpness: variance {} - {:?}",
        quality
            .sharpness
            .variance
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "n/a".to_string()),
        quality.sharpness.status
    );
    for suggestion in &quality.suggestions {
        tracing::info!("  [{:?}] {}", suggestion.priority, suggestion.action);
    }
    tracing::info!("  Needs enhancement: {}", quality.needs_enhancement);
}

fn log_rotation(rotation: &RotationDecision) {
    tracing::info!(
        "  Method: {:?}, angle: {}°, confidence: {:.1}%, needs rotation: {}",
        rotation.method,
        rotation.angle.degrees(),
        rotation.confidence * 100.0,
        rotation.needs_rotation
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, image: &DynamicImage) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, codec::encode(image, ImageFormat::Png).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = Preprocessor::default()
            .process(Path::new("/definitely/not/here.png"))
            .unwrap_err();
        assert!(matches!(err, PreprocessError::NotFound(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.gif");
        std::fs::write(&path, b"GIF89a").unwrap();

        let err = Preprocessor::default().process(&path).unwrap_err();
        assert!(matches!(err, PreprocessError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_extension_check_ignores_case() {
        let preprocessor = Preprocessor::default();
        assert!(preprocessor.validate_extension(Path::new("a.PNG")).is_ok());
        assert!(preprocessor.validate_extension(Path::new("a.JpEg")).is_ok());
        assert!(preprocessor.validate_extension(Path::new("a")).is_err());
    }

    #[test]
    fn test_oversized_upload_rejected_before_decode() {
        let preprocessor = Preprocessor::new(PreprocessConfig {
            max_file_size: 16,
            ..Default::default()
        });
        // Garbage bytes would fail decoding; the size check must come first
        let err = preprocessor.process_bytes(&[0u8; 17], "big.png").unwrap_err();
        assert!(matches!(
            err,
            PreprocessError::FileTooLarge { size: 17, max: 16 }
        ));
    }

    #[test]
    fn test_undecodable_bytes_fail_with_decode_error() {
        let err = Preprocessor::default()
            .process_bytes(b"not really a png", "fake.png")
            .unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
    }

    #[test]
    fn test_flat_gray_run_uses_full_enhancement() {
        let dir = tempfile::tempdir().unwrap();
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(400, 1600, Luma([128])));
        let path = write_png(dir.path(), "flat.png", &image);

        let result = Preprocessor::default().process(&path).unwrap();

        assert_eq!(result.enhancement, EnhancementMode::Full);
        assert_eq!(result.quality.sharpness.status, SharpnessStatus::Blurry);
        // 400x1600 has ratio 0.25, so the screenshot heuristic turns it sideways
        assert!(result.rotation.needs_rotation);
        assert_eq!(result.original.image.height(), 1600);
        assert_eq!(result.processed.height, 1500);
        assert_eq!(result.processed.channels, 3);
        assert_eq!(result.processed.size_bytes, result.processed.encoded.len() as u64);
        assert_eq!(
            result.steps.first().map(|s| s.name.as_str()),
            Some("decode")
        );
        assert_eq!(result.steps.last().map(|s| s.name.as_str()), Some("encode"));
    }

    #[test]
    fn test_good_image_takes_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(1200, 1800, |x, y| {
            if (x / 40 + y / 40) % 2 == 0 {
                Rgb([40, 40, 40])
            } else {
                Rgb([215, 215, 215])
            }
        }));
        let path = write_png(dir.path(), "chat.png", &image);

        let result = Preprocessor::default().process(&path).unwrap();

        assert_eq!(result.enhancement, EnhancementMode::Baseline);
        assert!(!result.rotation.needs_rotation);
        assert_eq!(result.processed.height, 1920);
        assert_eq!(result.processed.channels, 1);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_save_processed_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 400, Luma([90])));
        let path = write_png(dir.path(), "thread.png", &image);

        let preprocessor = Preprocessor::default();
        let result = preprocessor.process(&path).unwrap();
        let out_dir = dir.path().join("out").join("processed");
        let saved = preprocessor
            .save_processed(&result, &path, Some(&out_dir))
            .unwrap();

        assert_eq!(saved, out_dir.join("thread_processed.png"));
        let bytes = std::fs::read(&saved).unwrap();
        assert_eq!(
            codec::read_dimensions(&bytes).unwrap(),
            (result.processed.width, result.processed.height)
        );
    }
}
