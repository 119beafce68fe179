use axum::Json;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use auditrail_core::AppError;
use serde::Serialize;
use tracing::error;
use ts_rs::TS;

/// API error payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/error-response.ts"
)]
pub struct ErrorResponse {
    message: String,
    /// Stable code for rate limit refusals: `concurrent` or `hourly`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    rate_limit_reason: Option<String>,
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::InvalidToken => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let (rate_limit_reason, retry_after) = match &self.0 {
            AppError::RateLimited {
                reason,
                retry_after_seconds,
            } => (Some(reason.as_str().to_owned()), *retry_after_seconds),
            _ => (None, None),
        };

        let message = match &self.0 {
            AppError::Internal(detail) => {
                error!(error = %detail, "request failed with internal error");
                "internal server error".to_owned()
            }
            other => other.to_string(),
        };

        let payload = Json(ErrorResponse {
            message,
            rate_limit_reason,
        });
        let mut response = (status, payload).into_response();

        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds.max(1)));
        }

        response
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::http::header::RETRY_AFTER;
    use axum::response::IntoResponse;
    use auditrail_core::{AppError, RateLimitReason};

    use super::ApiError;

    #[test]
    fn error_categories_map_to_status_codes() {
        let cases = [
            (AppError::Validation("bad".to_owned()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("who".to_owned()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("no".to_owned()), StatusCode::FORBIDDEN),
            (AppError::NotFound("gone".to_owned()), StatusCode::NOT_FOUND),
            (AppError::Conflict("race".to_owned()), StatusCode::CONFLICT),
            (AppError::InvalidToken, StatusCode::NOT_FOUND),
            (
                AppError::Internal("db down".to_owned()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError(error).into_response().status(), expected);
        }
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let response = ApiError(AppError::RateLimited {
            reason: RateLimitReason::Hourly,
            retry_after_seconds: Some(120),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("120")
        );
    }

    #[test]
    fn concurrent_limit_has_no_retry_hint() {
        let response = ApiError(AppError::RateLimited {
            reason: RateLimitReason::Concurrent,
            retry_after_seconds: None,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }
}
