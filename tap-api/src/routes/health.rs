//! Health check endpoint

use axum::{extract::State, Json};
use chrono::Utc;
use tracing::warn;

use crate::dto::HealthResponse;
use crate::state::AppState;

/// Always 200; `degraded` when the store does not answer
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            warn!(error = %e, "Store ping failed");
            "degraded"
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        version: state.version.clone(),
        store: state.store.backend_name().to_string(),
    })
}
