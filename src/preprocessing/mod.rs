//! Image preprocessing for SMS screenshots and photos
//!
//! Quality analysis and rotation detection feed a report-driven enhancer;
//! `Preprocessor` runs the stages in order and produces a PNG buffer ready
//! for an OCR engine.

pub mod enhancer;
pub mod pipeline;
pub mod quality;
pub mod rotation;
pub mod steps;

pub use enhancer::{EnhancementOutcome, EnhancementStep, ImageEnhancer};
pub use pipeline::{
    EnhancementMode, OriginalImage, PreprocessingResult, Preprocessor, ProcessedImage, StepTiming,
};
pub use quality::{Grade, QualityAnalyzer, QualityReport};
pub use rotation::{RotationAngle, RotationDecision, RotationDetector, RotationMethod};
