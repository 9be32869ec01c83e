mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use clap::Parser;
use integrity_vault_core::{
    IntegrityStore, NotFoundReason, RecordTimestamp, StoreError, Verification,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::validation::{sanitize_content, sanitize_timestamp, ValidationError};

const MSG_UPDATED: &str = "Data updated successfully!";
const MSG_COMPROMISED: &str = "Database integrity compromised, please try again later!";
const MSG_NOT_TAMPERED: &str = "No data tampering detected!";
const MSG_TAMPERED: &str = "Data has been tampered with, please restore history!";
const MSG_RESTORED: &str = "Data restored successfully!";
const MSG_NO_HISTORY: &str = "No history found to restore data!";
const MSG_NO_ENTRY: &str = "No data found for the provided timestamp!";
const MSG_INVALID_VALUE: &str = "Invalid value!";

#[derive(Debug, Clone)]
struct ServiceState {
    store: Arc<IntegrityStore>,
    max_content_chars: usize,
}

/// Response body shared by every route.
#[derive(Debug, Clone, Serialize)]
struct ApiResponse<T>
where
    T: Serialize,
{
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_restore_point: Option<RecordTimestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Clone)]
struct ServiceError {
    status: StatusCode,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DataRequest {
    data: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    intact: bool,
}

#[derive(Debug, Parser)]
#[command(name = "integrity-vault-service")]
#[command(about = "HTTP service guarding a single record against tampering")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
    /// Content the record starts with.
    #[arg(long, default_value = "Hello World")]
    seed: String,
    #[arg(long, default_value_t = validation::DEFAULT_MAX_CONTENT_CHARS)]
    max_content_chars: usize,
    /// Used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_filter: String,
}

fn data<T: Serialize>(data: T) -> ApiResponse<T> {
    ApiResponse { data: Some(data), default_restore_point: None, message: None }
}

fn message(message: &str) -> ApiResponse<()> {
    ApiResponse { data: None, default_restore_point: None, message: Some(message.to_string()) }
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(message(&self.message))).into_response()
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::IntegrityFailure { .. } => {
                Self::new(StatusCode::BAD_REQUEST, MSG_COMPROMISED)
            }
            StoreError::NotFound(NotFoundReason::EmptyHistory) => {
                Self::new(StatusCode::NOT_FOUND, MSG_NO_HISTORY)
            }
            StoreError::NotFound(NotFoundReason::UnknownTimestamp(_)) => {
                Self::new(StatusCode::NOT_FOUND, MSG_NO_ENTRY)
            }
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, format!("{err}!"))
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(err: JsonRejection) -> Self {
        tracing::debug!(error = %err.body_text(), "rejected request body");
        Self::new(StatusCode::BAD_REQUEST, MSG_INVALID_VALUE)
    }
}

impl ServiceState {
    fn new(store: IntegrityStore, max_content_chars: usize) -> Self {
        Self { store: Arc::new(store), max_content_chars }
    }

    fn content_from(
        &self,
        request: Result<Json<DataRequest>, JsonRejection>,
    ) -> Result<String, ServiceError> {
        let Json(request) = request?;
        Ok(sanitize_content(&request.data, self.max_content_chars)?)
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/", get(read_current).post(write_current).put(write_current))
        .route("/validate", post(verify_current))
        .route("/restore/:timestamp", patch(restore_current))
        .route("/history", get(history))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_filter);

    let seed = sanitize_content(&args.seed, args.max_content_chars).context("invalid --seed")?;
    let state = ServiceState::new(IntegrityStore::new(seed), args.max_content_chars);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(bind = %args.bind, "integrity vault service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn read_current(State(state): State<ServiceState>) -> Json<ApiResponse<String>> {
    Json(data(state.store.read()))
}

async fn write_current(
    State(state): State<ServiceState>,
    request: Result<Json<DataRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    let content = state.content_from(request)?;
    state.store.write(content)?;
    Ok(Json(message(MSG_UPDATED)))
}

async fn verify_current(
    State(state): State<ServiceState>,
    request: Result<Json<DataRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let candidate = state.content_from(request)?;
    let response = match state.store.verify(&candidate) {
        Verification::Match => (StatusCode::OK, Json(message(MSG_NOT_TAMPERED))).into_response(),
        Verification::Mismatch(points) => {
            let body = ApiResponse {
                data: Some(points.timestamps),
                default_restore_point: Some(points.default),
                message: Some(MSG_TAMPERED.to_string()),
            };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
    };
    Ok(response)
}

async fn restore_current(
    State(state): State<ServiceState>,
    Path(raw_timestamp): Path<String>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    let key = sanitize_timestamp(&raw_timestamp)?;
    state.store.restore_key(&key)?;
    Ok(Json(message(MSG_RESTORED)))
}

async fn history(State(state): State<ServiceState>) -> Json<ApiResponse<Vec<RecordTimestamp>>> {
    Json(data(state.store.restore_points()))
}

async fn health(State(state): State<ServiceState>) -> Json<ApiResponse<HealthResponse>> {
    Json(data(HealthResponse { status: "ok", intact: state.store.is_intact() }))
}
