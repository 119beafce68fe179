use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use auditrail_core::{AppError, OrganizationId, UserId, UserIdentity};
use tracing::warn;

use crate::error::ApiResult;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-auditrail-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-auditrail-organization-id";

/// Accepts requests forwarded by the authenticating gateway and attaches the
/// asserted [`UserIdentity`].
pub async fn require_gateway_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let identity = gateway_identity(request.headers(), state.gateway_shared_secret.as_ref())?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

pub fn gateway_identity(headers: &HeaderMap, shared_secret: &str) -> Result<UserIdentity, AppError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();

    if !constant_time_eq(presented.as_bytes(), shared_secret.as_bytes()) {
        warn!("request rejected: missing or invalid gateway credentials");
        return Err(AppError::Unauthorized(
            "gateway authentication required".to_owned(),
        ));
    }

    let user_id = identity_header(headers, USER_ID_HEADER).and_then(UserId::parse)?;
    let organization_id =
        identity_header(headers, ORGANIZATION_ID_HEADER).and_then(OrganizationId::parse)?;

    Ok(UserIdentity::new(user_id, organization_id))
}

fn identity_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("{name} header is required")))
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    left.iter()
        .zip(right)
        .fold(0_u8, |difference, (left, right)| difference | (left ^ right))
        == 0
}
