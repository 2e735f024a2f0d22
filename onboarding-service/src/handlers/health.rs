use axum::{extract::State, http::StatusCode, Json};

use crate::{
    dtos::{HealthChecks, HealthResponse},
    AppState,
};

/// Liveness plus store, broker and consumer state
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "All dependencies reachable", body = HealthResponse),
        (status = 503, description = "A dependency is down", body = HealthResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.store.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::warn!(error = %e, "Health check: record store down");
            "down"
        }
    };
    let event_channel = match state.publisher.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::warn!(error = %e, "Health check: event channel down");
            "down"
        }
    };

    let event_consumer = match &state.consumer {
        None => "disabled",
        Some(health) if health.is_failed() => {
            tracing::warn!("Health check: event consumer stopped");
            "down"
        }
        Some(_) => "up",
    };

    let healthy = database == "up" && event_channel == "up" && event_consumer != "down";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            service: state.service_name.clone(),
            version: state.service_version.clone(),
            checks: HealthChecks {
                database: database.to_string(),
                event_channel: event_channel.to_string(),
                event_consumer: event_consumer.to_string(),
            },
        }),
    )
}
