use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;

use auditrail_core::{AppError, UserIdentity};
use auditrail_domain::{ExportFormat, ExportJobId, ExportJobStatus};

use crate::dto::{CreateExportRequest, ExportAcceptedResponse, ExportJobResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_export_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<CreateExportRequest>,
) -> ApiResult<(StatusCode, Json<ExportAcceptedResponse>)> {
    let permissions = state.permissions_for(&user).await?;
    let format = payload.format.parse::<ExportFormat>()?;
    let filter = payload.filter.into_filter()?;
    let job_id = state
        .export_job_service
        .request_export(user.user_id(), &permissions, format, filter)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ExportAcceptedResponse {
            job_id: job_id.to_string(),
            status: ExportJobStatus::Pending.as_str().to_owned(),
        }),
    ))
}

pub async fn list_exports_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<Vec<ExportJobResponse>>> {
    let permissions = state.permissions_for(&user).await?;
    let jobs = state
        .export_job_service
        .list_exports(user.user_id(), &permissions)
        .await?
        .into_iter()
        .map(ExportJobResponse::from)
        .collect();

    Ok(Json(jobs))
}

pub async fn export_status_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ExportJobResponse>> {
    let permissions = state.permissions_for(&user).await?;
    let job_id = ExportJobId::parse(job_id.trim())
        .map_err(|_| AppError::NotFound(format!("export job '{job_id}' not found")))?;
    let view = state
        .export_job_service
        .get_status(user.user_id(), &permissions, job_id)
        .await?;

    Ok(Json(ExportJobResponse::from(view)))
}
