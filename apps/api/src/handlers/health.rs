use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::dto::{HealthDependencyStatus, HealthResponse};
use crate::state::AppState;

mod checks;

use checks::{check_postgres, check_redis};

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let storage = check_postgres(state.postgres_pool.clone()).await;
    let redis = check_redis(state.redis_client.clone()).await;

    let ready = is_usable(storage.status) && is_usable(redis.status);
    let status = if ready { "ok" } else { "degraded" };
    let http_status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            ready,
            storage_backend: state.storage_backend,
            storage,
            redis,
        }),
    )
}

fn is_usable(status: &str) -> bool {
    matches!(status, "ok" | "disabled")
}

fn disabled() -> HealthDependencyStatus {
    HealthDependencyStatus {
        status: "disabled",
        detail: None,
    }
}
