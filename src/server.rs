//! HTTP service for the article pipeline.
//!
//! Exposes each pipeline stage as a JSON endpoint, plus semantic search.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Status and endpoint list |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/pipeline/transform` | Raw records → canonical documents |
//! | `POST` | `/pipeline/embed` | Canonical documents → documents with `vector` |
//! | `POST` | `/pipeline/index` | Documents with `vector` → vector store |
//! | `POST` | `/pipeline/run_full` | Raw records → vector store |
//! | `GET`  | `/search?query=...&k=3` | Semantic search |
//!
//! # Error Contract
//!
//! ```json
//! { "detail": "input must be a JSON array of records, got an object" }
//! ```
//!
//! Request bodies of the wrong shape answer `422`; pipeline and store
//! failures answer `500`. Per-record rejections are never errors: they show
//! up in the transform reports and the dead-letter file.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::models::{CanonicalDocument, EmbeddedDocument, ProcessingReport, SearchHit};
use crate::pipeline::{Pipeline, RunSummary};
use crate::transform;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Starts the HTTP server with the pipeline described by `config`.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config_quiet(config)?;
    run_server_with(&config.server.bind, Arc::new(pipeline)).await
}

/// Starts the HTTP server on `bind_addr` with an already built pipeline.
///
/// Lets callers inject their own embedding provider or vector store.
///
/// ```rust,no_run
/// use article_harness::pipeline::Pipeline;
/// use article_harness::server::run_server_with;
/// use std::sync::Arc;
///
/// # async fn example(pipeline: Pipeline) -> anyhow::Result<()> {
/// run_server_with("127.0.0.1:8000", Arc::new(pipeline)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_server_with(bind_addr: &str, pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("article service listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The service's routes, without a listener.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/pipeline/transform", post(handle_transform))
        .route("/pipeline/embed", post(handle_embed))
        .route("/pipeline/index", post(handle_index))
        .route("/pipeline/run_full", post(handle_run_full))
        .route("/search", get(handle_search))
        .layer(cors)
        .with_state(AppState { pipeline })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                detail: self.message,
            }),
        )
            .into_response()
    }
}

/// Constructs a 422 error for request bodies of the wrong shape.
fn unprocessable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        message: message.into(),
    }
}

/// Constructs a 500 error, logging it with the stage that failed.
fn internal(stage: &str, err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    error!(stage, error = %message, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message,
    }
}

fn warning(message: &str) -> Json<Value> {
    Json(json!({ "status": "warning", "message": message }))
}

/// Parse the items of a JSON array body, skipping items whose `text` is
/// missing or empty.
fn parse_items<T: serde::de::DeserializeOwned>(body: &Value) -> Result<Vec<T>, AppError> {
    let items = transform::records(body).map_err(|e| unprocessable(e.to_string()))?;
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| {
            item.get("text")
                .and_then(Value::as_str)
                .is_some_and(|t| !t.trim().is_empty())
        })
        .map(|(i, item)| {
            serde_json::from_value(item.clone())
                .map_err(|e| unprocessable(format!("item {}: {}", i, e)))
        })
        .collect()
}

// ============ GET / and /health ============

async fn handle_root() -> Json<Value> {
    Json(json!({
        "status": "System is live!",
        "endpoints": [
            "/pipeline/transform",
            "/pipeline/embed",
            "/pipeline/index",
            "/pipeline/run_full",
            "/search"
        ]
    }))
}

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /pipeline/transform ============

/// Response body for `POST /pipeline/transform`.
#[derive(Serialize)]
struct TransformResponse {
    status: &'static str,
    processed_count: usize,
    skipped_count: usize,
    documents: Vec<CanonicalDocument>,
    /// One report per input record, in input order.
    reports: Vec<ProcessingReport>,
}

/// Transform raw records. The response carries the documents, one report
/// per input record, and the counts.
async fn handle_transform(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<TransformResponse>, AppError> {
    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.transform_input(&body))
        .await
        .map_err(|e| internal("transform", e.into()))?
        .map_err(|e| unprocessable(e.to_string()))?;

    let processed_count = outcome.processed_count();
    let skipped_count = outcome.skipped_count();
    let reports = outcome.reports.clone();
    Ok(Json(TransformResponse {
        status: "success",
        processed_count,
        skipped_count,
        documents: outcome.into_documents(),
        reports,
    }))
}

// ============ POST /pipeline/embed ============

/// Response body for `POST /pipeline/embed`. Serialized directly so vector
/// components keep their `f32` form.
#[derive(Serialize)]
struct EmbedResponse {
    status: &'static str,
    embedded_count: usize,
    documents: Vec<EmbeddedDocument>,
}

async fn handle_embed(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<EmbedResponse>, AppError> {
    let documents: Vec<CanonicalDocument> = parse_items(&body)?;
    let embedded = state.pipeline.embed(documents).await;
    Ok(Json(EmbedResponse {
        status: "success",
        embedded_count: embedded.len(),
        documents: embedded,
    }))
}

// ============ POST /pipeline/index ============

#[derive(Serialize)]
struct IndexResponse {
    status: &'static str,
    message: String,
    indexed_count: usize,
}

async fn handle_index(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let documents: Vec<EmbeddedDocument> = parse_items(&body)?;
    if documents.is_empty() {
        return Ok(warning("No documents provided to index.").into_response());
    }
    let indexed = state
        .pipeline
        .index(&documents)
        .await
        .map_err(|e| internal("index", e))?;
    Ok(Json(IndexResponse {
        status: "success",
        message: format!("Successfully indexed {} documents.", indexed),
        indexed_count: indexed,
    })
    .into_response())
}

// ============ POST /pipeline/run_full ============

#[derive(Serialize)]
struct RunFullResponse {
    status: &'static str,
    message: &'static str,
    #[serde(flatten)]
    summary: RunSummary,
}

async fn handle_run_full(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.transform_input(&body))
        .await
        .map_err(|e| internal("run_full", e.into()))?
        .map_err(|e| unprocessable(e.to_string()))?;

    if outcome.documents.is_empty() {
        return Ok(warning("No valid documents found.").into_response());
    }

    let summary = state
        .pipeline
        .finish(outcome)
        .await
        .map_err(|e| internal("run_full", e))?;
    Ok(Json(RunFullResponse {
        status: "success",
        message: "Full pipeline completed successfully.",
        summary,
    })
    .into_response())
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default = "default_k")]
    k: usize,
}

fn default_k() -> usize {
    3
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let hits = state
        .pipeline
        .search(&params.query, params.k)
        .await
        .map_err(|e| internal("search", e))?;
    Ok(Json(hits))
}
