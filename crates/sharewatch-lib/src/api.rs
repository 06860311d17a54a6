//! HTTP JSON API
//!
//! Read-only endpoints for the share inventory and the active anomaly
//! alerts, plus health checks and Prometheus metrics.

use crate::anomaly::AlertRegistry;
use crate::health::{ComponentStatus, HealthRegistry};
use crate::inventory::InventoryView;
use crate::models::ShareInfo;
use crate::observability::{encode_metrics, MonitorMetrics};
use crate::sources::InventoryError;
use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AlertRegistry>,
    pub inventory: InventoryView,
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
}

impl AppState {
    pub fn new(
        registry: Arc<AlertRegistry>,
        inventory: InventoryView,
        health_registry: HealthRegistry,
        metrics: MonitorMetrics,
    ) -> Self {
        Self {
            registry,
            inventory,
            health_registry,
            metrics,
        }
    }
}

/// Request failure surfaced as a status code with a plain-text reason
#[derive(Debug)]
pub enum ApiError {
    Inventory(InventoryError),
    Internal(String),
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match self {
            ApiError::Inventory(e) => {
                warn!(error = %e, "Failed to list shares");
                e.to_string()
            }
            ApiError::Internal(message) => message,
        };
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Inventory joined with the latest metric values
async fn shares(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ShareInfo>>, ApiError> {
    let shares = state.inventory.shares().await?;
    Ok(Json(shares))
}

/// Active anomaly alerts keyed by `<share>-<metric>`
async fn anomalies(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, String>> {
    Json(state.registry.snapshot())
}

/// Returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    state
        .metrics
        .set_active_alerts(state.registry.snapshot().len() as i64);

    let buffer = encode_metrics().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

/// Permissive CORS for the browser dashboard
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Every OPTIONS request is answered with an empty 204
///
/// `CorsLayer` short-circuits preflights with 200 and its headers; this
/// wraps it and only rewrites the status.
async fn preflight_no_content(req: Request, next: Next) -> Response {
    let preflight = req.method() == Method::OPTIONS;
    let mut response = next.run(req).await;
    if preflight {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/shares", get(shares))
        .route("/api/anomalies", get(anomalies))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .layer(cors_layer())
        .layer(middleware::from_fn(preflight_no_content))
        .with_state(state)
}

/// Start the API server
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
