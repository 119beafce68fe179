use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::ApiResult;
use crate::state::AppState;

/// Redeems a one-time download link. The token is the only credential.
pub async fn download_export_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Response> {
    let artifact = state
        .download_token_service
        .consume_and_get_artifact(token.as_str())
        .await?;

    let disposition = HeaderValue::from_str(
        format!("attachment; filename=\"{}\"", artifact.file_name).as_str(),
    )
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let mut response = (StatusCode::OK, artifact.bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(artifact.content_type),
    );
    headers.insert(CONTENT_DISPOSITION, disposition);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok(response)
}
