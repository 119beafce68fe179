use axum::Json;
use axum::extract::{Extension, Path, Query, State};

use auditrail_core::{AppError, UserIdentity};
use uuid::Uuid;

use crate::dto::{
    AuditLogEntryDetailResponse, AuditLogFilterRequest, AuditLogPageResponse,
    AuditLogSearchParams,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn search_audit_logs_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Query(params): Query<AuditLogSearchParams>,
) -> ApiResult<Json<AuditLogPageResponse>> {
    let permissions = state.permissions_for(&user).await?;
    let filter = AuditLogFilterRequest::from(params).into_filter()?;
    let page = state
        .audit_query_service
        .search(&permissions, filter)
        .await?;

    Ok(Json(AuditLogPageResponse::from(page)))
}

pub async fn get_audit_log_entry_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(entry_id): Path<String>,
) -> ApiResult<Json<AuditLogEntryDetailResponse>> {
    let permissions = state.permissions_for(&user).await?;
    let entry_id = Uuid::parse_str(entry_id.trim()).map_err(|_| {
        AppError::NotFound(format!("audit log entry '{entry_id}' not found"))
    })?;
    let detail = state
        .audit_query_service
        .get_detail(&permissions, entry_id)
        .await?;

    Ok(Json(AuditLogEntryDetailResponse::from(detail)))
}
