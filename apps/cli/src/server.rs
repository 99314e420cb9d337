//! Axum router for the read-only paper API.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::QueryRejection;
use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use paperflow_search::{PaperListing, PaperStore, PaperView, SummaryView};
use paperflow_shared::{PaperSearchResult, PaperflowError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::telemetry::{REQUEST_DURATION_SECONDS, REQUESTS_TOTAL};

const DEFAULT_TOP_K: usize = 5;

type SharedStore = Arc<PaperStore>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound,
    Backend(String),
    Internal(String),
}

impl From<PaperflowError> for ApiError {
    fn from(err: PaperflowError) -> Self {
        match err {
            PaperflowError::InvalidQuery { message } => Self::BadRequest(message),
            PaperflowError::Search(_)
            | PaperflowError::Network(_)
            | PaperflowError::Enrichment(_)
            | PaperflowError::DimensionMismatch { .. } => Self::Backend(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound => (StatusCode::NOT_FOUND, "Paper not found".to_string()),
            Self::Backend(m) => {
                error!(error = %m, "search backend failed");
                (StatusCode::BAD_GATEWAY, m)
            }
            Self::Internal(m) => {
                error!(error = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(store): State<SharedStore>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "papers": store.len(),
        "backend": store.backend_name(),
    }))
}

async fn list_papers(State(store): State<SharedStore>) -> Json<Vec<PaperListing>> {
    Json(store.list_all())
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchParams {
    #[serde(default)]
    q: String,
    top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<PaperSearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

async fn search_papers(
    State(store): State<SharedStore>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let top_k = params.top_k.unwrap_or(DEFAULT_TOP_K);

    let results = store.search(&params.q, top_k).await?;
    let message = results.is_empty().then_some("No papers indexed yet");
    Ok(Json(SearchResponse {
        query: params.q,
        results,
        message,
    }))
}

async fn get_paper(
    State(store): State<SharedStore>,
    Path(paper_id): Path<String>,
) -> Result<Json<PaperView>, ApiError> {
    store.get(&paper_id).map(Json).ok_or(ApiError::NotFound)
}

async fn get_paper_summary(
    State(store): State<SharedStore>,
    Path(paper_id): Path<String>,
) -> Result<Json<SummaryView>, ApiError> {
    store
        .get_summary(&paper_id)
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// Count and time every routed request, labelled by route template.
async fn track_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status().as_u16().to_string();

    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.clone(),
        "endpoint" => endpoint.clone(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        REQUEST_DURATION_SECONDS,
        "method" => method,
        "endpoint" => endpoint,
        "status" => status
    )
    .record(started.elapsed().as_secs_f64());
    response
}

/// Build the full router over a loaded store.
pub(crate) fn build_router(store: SharedStore, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/papers", get(list_papers))
        .route("/papers/search", get(search_papers))
        .route("/papers/{paper_id}", get(get_paper))
        .route("/papers/{paper_id}/summary", get(get_paper_summary))
        .route_layer(middleware::from_fn(track_requests))
        .route("/metrics", get(move || std::future::ready(metrics.render())))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}
