use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{sync::Arc, time::Instant};
use tracing::info;
use uuid::Uuid;

use crate::{
    engine::ThreatEngine,
    error::{validation_error, AppError},
    types::{AnalyzeRequest, AnalyzeResponse},
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ThreatEngine>,
    pub metrics: PrometheusHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let start_time = Instant::now();

    if payload.input.len() > 4096 {
        return Err(validation_error("Input is too long"));
    }

    let (domain, verdict) = state.engine.analyze_input(&payload.input).await?;
    let analysis_id = Uuid::new_v4();

    info!(
        "Analysis {} for {} finished in {}ms",
        analysis_id,
        domain.canonical,
        start_time.elapsed().as_millis()
    );

    Ok(Json(AnalyzeResponse {
        analysis_id,
        domain: domain.canonical,
        verdict,
    }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
