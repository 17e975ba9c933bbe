//! Preprocessing pipeline for SMS screenshots and photographed phone screens.

pub mod codec;
pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod preprocessing;
pub mod server;

pub use config::PreprocessConfig;
pub use error::PreprocessError;
pub use preprocessing::{PreprocessingResult, Preprocessor};
