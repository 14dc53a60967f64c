use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// Liveness plus a MongoDB ping. 503 while the database is unreachable.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, mongodb) = match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, "up"),
        Err(e) => {
            tracing::error!(error = %e, "MongoDB health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "down")
        }
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "unavailable" },
            "service": state.config.service_name,
            "version": state.config.service_version,
            "environment": format!("{:?}", state.config.environment),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "checks": {
                "mongodb": mongodb
            }
        })),
    )
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        crate::services::metrics::get_metrics(),
    )
}
