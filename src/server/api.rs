//! HTTP API server implementation

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::errors::TranslationError;
use crate::core::models::{EntityMeta, JobId, TranslationJob};
use crate::processors::extractor::Extraction;
use crate::queue::scheduler::QueueStats;
use crate::queue::service::{PublishReceipt, TranslationService};

/// Application state
#[derive(Clone)]
pub struct AppState {
    service: Arc<TranslationService>,
}

impl AppState {
    pub fn new(service: Arc<TranslationService>) -> Self {
        Self { service }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub queue: QueueStats,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub entity_id: String,
    pub target_language: String,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: JobId,
}

/// Preview either a stored entity or content sent inline
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub entity_id: Option<String>,
    #[serde(default)]
    pub raw_content: String,
    #[serde(default)]
    pub meta: EntityMeta,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub code: String,
}

/// Translation errors rendered as JSON with a matching status code
#[derive(Debug)]
pub struct ApiError(TranslationError);

impl From<TranslationError> for ApiError {
    fn from(err: TranslationError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            TranslationError::MissingEntity { .. } => (StatusCode::NOT_FOUND, "entity_not_found"),
            TranslationError::JobNotFound { .. } => (StatusCode::NOT_FOUND, "job_not_found"),
            TranslationError::ConfigError { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
            TranslationError::InvalidJobState { .. } => (StatusCode::CONFLICT, "invalid_job_state"),
            TranslationError::Restore(_) => (StatusCode::UNPROCESSABLE_ENTITY, "restore_failed"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.0.to_string(),
                code: code.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        queue: state.service.queue().stats(),
    })
}

async fn create_job(
    State(state): State<AppState>,
    Json(payload): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let job_id = state
        .service
        .enqueue_translation(&payload.entity_id, &payload.target_language)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(CreateJobResponse { job_id })))
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<TranslationJob>, ApiError> {
    let job = state
        .service
        .job(job_id)
        .await?
        .ok_or(TranslationError::JobNotFound { job_id })?;
    Ok(Json(job))
}

async fn publish_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<PublishReceipt>, ApiError> {
    Ok(Json(state.service.publish(job_id).await?))
}

async fn preview(
    State(state): State<AppState>,
    Json(payload): Json<PreviewRequest>,
) -> Result<Json<Extraction>, ApiError> {
    let extraction = match payload.entity_id {
        Some(entity_id) => state.service.preview(&entity_id).await?,
        None => state
            .service
            .preview_content(&payload.raw_content, &payload.meta),
    };
    Ok(Json(extraction))
}

/// Routes served by [`run_server`]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/jobs", post(create_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/publish", post(publish_job))
        .route("/preview", post(preview))
        .with_state(state)
}

/// Run the HTTP server
/// Serve until Ctrl-C, then stop admitting queued jobs
pub async fn run_server(service: Arc<TranslationService>, host: String, port: u16) -> anyhow::Result<()> {
    let app = router(AppState::new(service.clone()));

    // Bind address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Server stopped, shutting down translation queue");
    service.queue().shutdown();
    Ok(())
}
