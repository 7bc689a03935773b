use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    engine::PredictionEngine,
    error::AppError,
    features::FeatureExtractor,
    types::{PredictRequest, PredictionResult},
};

pub struct AppState<E> {
    pub engine: PredictionEngine<E>,
    pub deadline: Duration,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router<E: FeatureExtractor + 'static>(state: Arc<AppState<E>>) -> Router {
    Router::new()
        .route("/predict", post(predict::<E>))
        .route("/health", get(health::<E>))
        .route("/metrics", get(render_metrics::<E>))
        .with_state(state)
}

pub async fn predict<E: FeatureExtractor>(
    State(state): State<Arc<AppState<E>>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictionResult>, AppError> {
    info!("Received prediction request for {}", request.url);
    let result = state.engine.predict_within(&request.url, state.deadline).await?;
    Ok(Json(result))
}

pub async fn health<E: FeatureExtractor>(State(state): State<Arc<AppState<E>>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "model_version": state.engine.model_version(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn render_metrics<E: FeatureExtractor>(State(state): State<Arc<AppState<E>>>) -> String {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}
