use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Image transform failed: {0}")]
    Transform(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PreprocessError {
    /// Input was rejected before any decoding took place.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::UnsupportedFormat(_) | Self::FileTooLarge { .. }
        )
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for PreprocessError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            PreprocessError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            PreprocessError::UnsupportedFormat(_) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT")
            }
            PreprocessError::FileTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE")
            }
            PreprocessError::Decode(_) => (StatusCode::UNPROCESSABLE_ENTITY, "DECODE_ERROR"),
            PreprocessError::Transform(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TRANSFORM_ERROR"),
            PreprocessError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            PreprocessError::Ocr(_) => (StatusCode::INTERNAL_SERVER_ERROR, "OCR_ERROR"),
            PreprocessError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            PreprocessError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            PreprocessError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            PreprocessError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_family() {
        assert!(PreprocessError::NotFound(PathBuf::from("x.png")).is_validation());
        assert!(PreprocessError::UnsupportedFormat(".gif".into()).is_validation());
        assert!(PreprocessError::FileTooLarge { size: 11, max: 10 }.is_validation());
        assert!(!PreprocessError::Decode("bad".into()).is_validation());
        assert!(!PreprocessError::Transform("bad".into()).is_validation());
    }

    #[test]
    fn test_too_large_maps_to_413() {
        let response = PreprocessError::FileTooLarge { size: 11, max: 10 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
