//! OCRS engine implementation
//!
//! Pure Rust OCR engine using the ocrs library. Downloads its neural network
//! models into the user cache directory on first use.

use crate::engine::{BoundingBox, OcrEngine, OcrOutput, RecognizedWord};
use crate::error::PreprocessError;
use image::DynamicImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use std::path::{Path, PathBuf};

const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

const CACHE_DIR_NAME: &str = "sms-preprocess";

pub struct OcrsEngine {
    engine: OcrsOcrEngine,
}

impl OcrsEngine {
    /// Load both models, downloading them if they are not cached yet
    pub fn new() -> Result<Self, PreprocessError> {
        let detection_model = load_model(DETECTION_MODEL_URL, "text-detection.rten")?;
        let recognition_model = load_model(RECOGNITION_MODEL_URL, "text-recognition.rten")?;

        let engine = OcrsOcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| PreprocessError::Ocr(format!("Failed to create OCR engine: {}", e)))?;

        tracing::info!("ocrs engine initialized");
        Ok(Self { engine })
    }

    fn recognize_lines(
        &self,
        image: &DynamicImage,
    ) -> Result<Vec<Vec<RecognizedWord>>, PreprocessError> {
        // ImageSource::from_bytes expects packed RGB in HWC order
        let rgb = image.to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
            .map_err(|e| ocr_error("create image source", e))?;

        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| ocr_error("prepare input", e))?;
        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|e| ocr_error("detect words", e))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| ocr_error("recognize text", e))?;

        Ok(lines
            .iter()
            .filter_map(|line| line.as_ref())
            .map(|line| line.words().map(|word| recognized_word(&word)).collect())
            .collect())
    }
}

impl OcrEngine for OcrsEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine, English/Latin alphabet only"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<OcrOutput, PreprocessError> {
        let lines = self.recognize_lines(image)?;
        let output = OcrOutput::from_lines(lines);
        tracing::info!(
            "ocrs recognized {} words, confidence {:.2}",
            output.tokens.len(),
            output.confidence
        );
        Ok(output)
    }
}

fn recognized_word<W: TextItem + std::fmt::Display>(word: &W) -> RecognizedWord {
    let rect = word.bounding_rect();
    RecognizedWord::new(word.to_string()).with_bbox(BoundingBox {
        left: rect.left() as i32,
        top: rect.top() as i32,
        right: rect.right() as i32,
        bottom: rect.bottom() as i32,
    })
}

fn ocr_error(stage: &str, e: impl std::fmt::Display) -> PreprocessError {
    PreprocessError::Ocr(format!("Failed to {}: {}", stage, e))
}

fn load_model(url: &str, filename: &str) -> Result<Model, PreprocessError> {
    let path = ensure_model_downloaded(url, filename)?;
    Model::load_file(&path)
        .map_err(|e| PreprocessError::Ocr(format!("Failed to load {}: {}", filename, e)))
}

/// Return the cached model path, downloading the model first if needed
fn ensure_model_downloaded(url: &str, filename: &str) -> Result<PathBuf, PreprocessError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_DIR_NAME);
    std::fs::create_dir_all(&cache_dir)?;

    let model_path = cache_dir.join(filename);
    if model_path.exists() {
        tracing::info!("Using cached model from {:?}", model_path);
    } else {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        download_file(url, &model_path)?;
        tracing::info!("Downloaded {} to {:?}", filename, model_path);
    }

    Ok(model_path)
}

fn download_file(url: &str, path: &Path) -> Result<(), PreprocessError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| PreprocessError::Ocr(format!("Failed to download model: {}", e)))?;

    let buffer = response
        .into_body()
        .read_to_vec()
        .map_err(|e| PreprocessError::Ocr(format!("Failed to read model download: {}", e)))?;

    // Write to a sibling file first so an interrupted download is never cached
    let partial = path.with_extension("part");
    std::fs::write(&partial, &buffer)?;
    std::fs::rename(&partial, path)?;
    Ok(())
}
