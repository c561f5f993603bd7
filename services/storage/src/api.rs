use crate::config::ApiConfig;
use crate::gateway::{AccessUrl, StorageError, StorageGateway};
use crate::object_key::KeyPrefix;
use crate::placeholder::PlaceholderGenerator;
use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Query,
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Content type of generated placeholder images
const GENERATED_CONTENT_TYPE: &str = "image/png";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<StorageGateway>,
    pub generator: Arc<PlaceholderGenerator>,
}

/// Generate request body
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

/// Generate response
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub url: String,
}

/// Upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Filename as sent by the client
    pub filename: Option<String>,
    pub url: String,
}

/// Query parameters for re-issuing an access URL
#[derive(Debug, Deserialize)]
pub struct ObjectUrlQuery {
    pub key: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

/// Map gateway failures onto HTTP responses. Backend detail stays in the logs.
fn storage_error(e: StorageError) -> ApiError {
    match e {
        StorageError::InvalidArgument(message) => {
            api_error(StatusCode::BAD_REQUEST, &message, "INVALID_ARGUMENT")
        }
        StorageError::UploadFailed(_) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to store object",
            "UPLOAD_FAILED",
        ),
        StorageError::PresignFailed(_) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate access URL",
            "PRESIGN_FAILED",
        ),
        StorageError::Unavailable(_) => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Storage backend unavailable",
            "STORAGE_UNAVAILABLE",
        ),
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    warn!(error = %e, "Rejected multipart body");
    let status = e.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        api_error(status, "Upload exceeds the size limit", "PAYLOAD_TOO_LARGE")
    } else {
        api_error(
            StatusCode::BAD_REQUEST,
            "Malformed multipart body",
            "INVALID_MULTIPART",
        )
    }
}

fn generation_failed() -> ApiError {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to generate image",
        "GENERATION_FAILED",
    )
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/generate", post(generate))
        .route("/upload", post(upload))
        .route("/objects/url", get(object_url))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.gateway.check_bucket().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "bucket": state.gateway.bucket(),
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "bucket": state.gateway.bucket(),
                })),
            )
        }
    }
}

/// Render a placeholder for the prompt and store it
#[instrument(skip(state, payload), fields(prompt_len = tracing::field::Empty))]
async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        warn!(error = %e, "Rejected generate body");
        api_error(
            StatusCode::BAD_REQUEST,
            "body must be a JSON object with a string `prompt`",
            "INVALID_ARGUMENT",
        )
    })?;
    tracing::Span::current().record("prompt_len", request.prompt.len());

    if request.prompt.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "prompt must not be empty",
            "INVALID_PROMPT",
        ));
    }

    let generator = state.generator.clone();
    let prompt = request.prompt;
    let image = tokio::task::spawn_blocking(move || generator.generate(&prompt))
        .await
        .map_err(|e| {
            error!(error = %e, "Image generation task failed");
            generation_failed()
        })?
        .map_err(|e| {
            error!(error = %e, "Image generation failed");
            generation_failed()
        })?;

    // `image` owns the temp file; every return below drops it
    let body = tokio::fs::read(image.path()).await.map_err(|e| {
        error!(error = %e, path = %image.path().display(), "Failed to read generated image");
        generation_failed()
    })?;
    let filename = image.file_name();

    let result = state
        .gateway
        .upload(
            Bytes::from(body),
            Some(filename.as_str()),
            Some(GENERATED_CONTENT_TYPE),
            KeyPrefix::GeneratedImages,
        )
        .await;
    drop(image);

    let access = result.map_err(storage_error)?;

    metrics::counter!("asset_generations_total").increment(1);
    info!(key = %access.key, "Generated image stored");

    Ok(Json(GenerateResponse { url: access.url }))
}

/// Store a file from a multipart body.
///
/// Uses the first part that is named `file` or carries a filename.
#[instrument(skip(state, multipart))]
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") && field.file_name().is_none() {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let body = field.bytes().await.map_err(multipart_error)?;

        let access = state
            .gateway
            .upload(
                body,
                filename.as_deref(),
                content_type.as_deref(),
                KeyPrefix::Uploads,
            )
            .await
            .map_err(storage_error)?;

        info!(key = %access.key, "Uploaded file stored");

        return Ok(Json(UploadResponse {
            filename,
            url: access.url,
        }));
    }

    Err(api_error(
        StatusCode::BAD_REQUEST,
        "multipart body has no file part",
        "MISSING_FILE",
    ))
}

/// Issue a fresh access URL for a stored object
#[instrument(skip(state))]
async fn object_url(
    State(state): State<AppState>,
    Query(query): Query<ObjectUrlQuery>,
) -> Result<Json<AccessUrl>, ApiError> {
    if KeyPrefix::of_key(&query.key).is_none() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "key is not managed by this service",
            "INVALID_KEY",
        ));
    }

    let access = state
        .gateway
        .access_url(&query.key)
        .await
        .map_err(storage_error)?;

    Ok(Json(access))
}

/// Start the API server and serve until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting asset API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
