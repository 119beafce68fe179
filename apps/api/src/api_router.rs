use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use auditrail_core::AppError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{ORGANIZATION_ID_HEADER, USER_ID_HEADER};
use crate::state::AppState;
use crate::{handlers, middleware};

pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    let identified_routes = Router::new()
        .route(
            "/api/audit/logs",
            get(handlers::audit_logs::search_audit_logs_handler),
        )
        .route(
            "/api/audit/logs/{entry_id}",
            get(handlers::audit_logs::get_audit_log_entry_handler),
        )
        .route(
            "/api/audit/exports",
            get(handlers::exports::list_exports_handler)
                .post(handlers::exports::create_export_handler),
        )
        .route(
            "/api/audit/exports/{job_id}",
            get(handlers::exports::export_status_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_gateway_identity,
        ));

    let cors_layer = CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(frontend_url)
                .map_err(|error| AppError::Internal(format!("invalid FRONTEND_URL: {error}")))?,
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(ORGANIZATION_ID_HEADER),
        ]);

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route(
            "/api/audit/exports/download/{token}",
            get(handlers::downloads::download_export_handler),
        )
        .merge(identified_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(app_state))
}
