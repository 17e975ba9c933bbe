use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde::Deserialize;
use sms_preprocess::codec;
use sms_preprocess::engine::{BoundingBox, OcrEngine, OcrOutput, RecognizedWord};
use sms_preprocess::engines::EngineRegistry;
use sms_preprocess::server::{router, AppState};
use sms_preprocess::{PreprocessConfig, PreprocessError, Preprocessor};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "sms-preprocess-test-boundary";

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct InfoResponse {
    version: String,
    accepted_extensions: Vec<String>,
    max_file_size_bytes: u64,
    engines: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RotationJson {
    angle: u16,
    confidence: f64,
    method: String,
    needs_rotation: bool,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct StepJson {
    name: String,
    time_ms: u64,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct PreprocessResponse {
    quality: serde_json::Value,
    rotation: RotationJson,
    enhancement: String,
    steps: Vec<StepJson>,
    total_time_ms: u64,
    original_size_bytes: u64,
    processed_size_bytes: u64,
    width: u32,
    height: u32,
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct OcrResponse {
    #[serde(flatten)]
    preprocessing: PreprocessResponse,
    engine: String,
    text: String,
    confidence: f32,
    tokens: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

/// Engine that reports the size of the buffer it was handed
struct EchoEngine;

impl OcrEngine for EchoEngine {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Reports buffer dimensions as text"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<OcrOutput, PreprocessError> {
        let (width, height) = (image.width() as i32, image.height() as i32);
        Ok(OcrOutput::from_lines(vec![vec![
            RecognizedWord::new("buffer"),
            RecognizedWord::new(format!("{}x{}", width, height)).with_bbox(BoundingBox {
                left: 0,
                top: 0,
                right: width,
                bottom: height,
            }),
        ]]))
    }
}

fn app_with(config: PreprocessConfig, engines: EngineRegistry) -> Router {
    router(AppState {
        preprocessor: Arc::new(Preprocessor::new(config)),
        engines: Arc::new(engines),
    })
}

fn app() -> Router {
    app_with(PreprocessConfig::default(), EngineRegistry::empty())
}

fn sample_png() -> Vec<u8> {
    let image = DynamicImage::ImageLuma8(GrayImage::from_fn(300, 600, |x, y| {
        if (x / 30 + y / 30) % 2 == 0 {
            Luma([30])
        } else {
            Luma([220])
        }
    }));
    codec::encode(&image, ImageFormat::Png).unwrap()
}

fn multipart_request(uri: &str, field: &str, file_name: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthResponse = json_body(response).await;
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[tokio::test]
async fn test_info_endpoint() {
    let response = app()
        .oneshot(Request::get("/info").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let info: InfoResponse = json_body(response).await;
    assert_eq!(info.accepted_extensions, ["png", "jpg", "jpeg", "webp"]);
    assert_eq!(info.max_file_size_bytes, 10 * 1024 * 1024);
    assert!(info.engines.is_empty());
}

#[tokio::test]
async fn test_preprocess_endpoint() {
    let png = sample_png();
    let response = app()
        .oneshot(multipart_request("/preprocess", "file", "chat.png", &png))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: PreprocessResponse = json_body(response).await;
    assert_eq!(result.original_size_bytes, png.len() as u64);
    assert_eq!(result.rotation.angle, 0);
    assert_eq!(result.rotation.method, "default-dimensional");
    assert!(result.width > 0 && result.height > 0);
    assert!(result.processed_size_bytes > 0);
    assert_eq!(result.steps.first().map(|s| s.name.as_str()), Some("decode"));
    assert!(result.quality["overall_score"].is_number());
}

#[tokio::test]
async fn test_missing_file_field() {
    let response = app()
        .oneshot(multipart_request("/preprocess", "attachment", "chat.png", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.code, "MISSING_FILE");
}

#[tokio::test]
async fn test_unsupported_extension() {
    let response = app()
        .oneshot(multipart_request("/preprocess", "file", "chat.gif", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.code, "UNSUPPORTED_FORMAT");
}

#[tokio::test]
async fn test_oversized_upload() {
    let config = PreprocessConfig {
        max_file_size: 1024,
        ..Default::default()
    };
    let response = app_with(config, EngineRegistry::empty())
        .oneshot(multipart_request("/preprocess", "file", "big.png", &[7u8; 4096]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.code, "FILE_TOO_LARGE");
    assert!(error.error.contains("4096"));
}

#[tokio::test]
async fn test_upload_beyond_body_limit() {
    let config = PreprocessConfig {
        max_file_size: 1024,
        ..Default::default()
    };
    // Larger than the cap plus the multipart allowance, so the body limit trips first
    let data = vec![7u8; 200 * 1024];
    let response = app_with(config, EngineRegistry::empty())
        .oneshot(multipart_request("/preprocess", "file", "big.png", &data))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.code, "FILE_TOO_LARGE");
    assert!(error.error.contains("max: 1024"));
}

#[tokio::test]
async fn test_undecodable_upload() {
    let response = app()
        .oneshot(multipart_request("/preprocess", "file", "fake.png", b"definitely not a png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.code, "DECODE_ERROR");
}

#[tokio::test]
async fn test_ocr_without_engine() {
    let response = app()
        .oneshot(multipart_request("/ocr", "file", "chat.png", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.code, "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_ocr_receives_processed_buffer() {
    let mut engines = EngineRegistry::empty();
    engines.register(Arc::new(EchoEngine));

    let response = app_with(PreprocessConfig::default(), engines)
        .oneshot(multipart_request("/ocr", "file", "chat.png", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: OcrResponse = json_body(response).await;
    assert_eq!(result.engine, "echo");
    assert_eq!(
        result.text,
        format!(
            "buffer {}x{}",
            result.preprocessing.width, result.preprocessing.height
        )
    );
    assert_eq!(result.tokens.len(), 2);
    assert!(result.tokens[0].get("bbox").is_none());
    assert_eq!(
        result.tokens[1]["bbox"]["bottom"],
        result.preprocessing.height as i64
    );
}
