use crate::config::ServerConfig;
use crate::engine::{OcrOutput, OcrToken};
use crate::engines::{EngineInfo, EngineRegistry};
use crate::error::PreprocessError;
use crate::preprocessing::{
    EnhancementMode, EnhancementStep, PreprocessingResult, Preprocessor, QualityReport,
    RotationDecision, StepTiming,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_SLACK: usize = 64 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub preprocessor: Arc<Preprocessor>,
    pub engines: Arc<EngineRegistry>,
}

/// Preprocessing response
#[derive(Debug, Serialize)]
pub struct PreprocessResponse {
    pub quality: QualityReport,
    pub rotation: RotationDecision,
    pub enhancement: EnhancementMode,
    pub plan: Vec<EnhancementStep>,
    pub steps: Vec<StepTiming>,
    pub total_time_ms: u64,
    pub original_size_bytes: u64,
    pub processed_size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub warnings: Vec<String>,
}

impl From<PreprocessingResult> for PreprocessResponse {
    fn from(result: PreprocessingResult) -> Self {
        Self {
            quality: result.quality,
            rotation: result.rotation,
            enhancement: result.enhancement,
            plan: result.plan,
            steps: result.steps,
            total_time_ms: result.total_time_ms,
            original_size_bytes: result.original.size_bytes,
            processed_size_bytes: result.processed.size_bytes,
            width: result.processed.width,
            height: result.processed.height,
            warnings: result.warnings,
        }
    }
}

/// OCR response: the preprocessing report plus recognized text
#[derive(Debug, Serialize)]
pub struct OcrResponse {
    #[serde(flatten)]
    pub preprocessing: PreprocessResponse,
    pub engine: &'static str,
    pub text: String,
    pub confidence: f32,
    pub tokens: Vec<OcrToken>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub accepted_extensions: Vec<String>,
    pub max_file_size_bytes: u64,
    pub engines: Vec<EngineInfo>,
}

/// Build the router; split from `run` so tests can drive it without a socket.
pub fn router(state: AppState) -> Router {
    let body_limit = state.preprocessor.config().max_file_size as usize + MULTIPART_SLACK;

    Router::new()
        .route("/preprocess", post(handle_preprocess))
        .route("/ocr", post(handle_ocr))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: ServerConfig, engines: EngineRegistry) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        preprocessor: Arc::new(Preprocessor::new(config.preprocess)),
        engines: Arc::new(engines),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Handle preprocessing requests
async fn handle_preprocess(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<PreprocessResponse>, PreprocessError> {
    let (file_name, data) = read_upload(&state, &headers, multipart).await?;
    let preprocessor = state.preprocessor.clone();

    let result =
        tokio::task::spawn_blocking(move || preprocessor.process_bytes(&data, &file_name))
            .await
            .map_err(|e| PreprocessError::Internal(format!("Preprocessing task failed: {}", e)))??;

    Ok(Json(result.into()))
}

/// Handle preprocess-then-OCR requests
async fn handle_ocr(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, PreprocessError> {
    let engine = state
        .engines
        .default_engine()
        .ok_or_else(|| PreprocessError::Internal("No OCR engine available".to_string()))?;
    let engine_name = engine.name();
    let (file_name, data) = read_upload(&state, &headers, multipart).await?;
    let preprocessor = state.preprocessor.clone();

    let (result, output) = tokio::task::spawn_blocking(
        move || -> Result<(PreprocessingResult, OcrOutput), PreprocessError> {
            let result = preprocessor.process_bytes(&data, &file_name)?;
            let output = engine.recognize(&result.processed.image)?;
            Ok((result, output))
        },
    )
    .await
    .map_err(|e| PreprocessError::Internal(format!("OCR task failed: {}", e)))??;

    tracing::info!(
        "OCR completed: {} chars, confidence {:.2}",
        output.text.len(),
        output.confidence
    );

    let mut preprocessing = PreprocessResponse::from(result);
    preprocessing.warnings.extend(output.warnings);

    Ok(Json(OcrResponse {
        preprocessing,
        engine: engine_name,
        text: output.text,
        confidence: output.confidence,
        tokens: output.tokens,
    }))
}

/// Pull the `file` field out of a multipart body. The upload's file name
/// carries the extension; when absent it is derived from the content type.
async fn read_upload(
    state: &AppState,
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> Result<(String, Bytes), PreprocessError> {
    let multipart_error = |context: &str, e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            let max = state.preprocessor.config().max_file_size;
            // The body was cut off at the limit; the declared length is the best size we have
            let size = headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(max + 1);
            PreprocessError::FileTooLarge { size, max }
        } else {
            PreprocessError::InvalidRequest(format!("{}: {}", context, e))
        }
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to parse multipart", e))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = match field.file_name() {
            Some(name) => name.to_string(),
            None => {
                let extension = match field.content_type() {
                    Some("image/png") => "png",
                    Some("image/jpeg") => "jpg",
                    Some("image/webp") => "webp",
                    _ => "bin",
                };
                format!("upload.{}", extension)
            }
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read file data", e))?;
        return Ok((file_name, data));
    }

    Err(PreprocessError::MissingFile)
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.preprocessor.config();
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        accepted_extensions: config.accepted_extensions.clone(),
        max_file_size_bytes: config.max_file_size,
        engines: state.engines.info(),
    })
}
