use std::collections::HashMap;

use axum::Json;
use axum::body::to_bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_DISPOSITION;
use auditrail_core::{AppError, OrganizationId, UserId, UserIdentity};
use auditrail_domain::{MembershipRole, REDACTION_PLACEHOLDER};

use super::{audit_logs, downloads, exports};
use crate::api_config::ApiConfig;
use crate::api_services::build_memory_runtime;
use crate::dev_seed;
use crate::dto::{AuditLogFilterRequest, AuditLogSearchParams, CreateExportRequest};
use crate::error::ApiError;
use crate::state::AppState;

async fn memory_state() -> AppState {
    let values = HashMap::from([
        ("AUDIT_STORAGE_BACKEND", "memory"),
        ("GATEWAY_SHARED_SECRET", "0123456789abcdef0123456789abcdef"),
    ]);
    let config = ApiConfig::from_lookup(None, |name| {
        values.get(name).map(|value| (*value).to_owned())
    })
    .unwrap_or_else(|_| unreachable!());

    build_memory_runtime(&config)
        .await
        .unwrap_or_else(|_| unreachable!())
        .state
}

fn seeded_user(role: MembershipRole) -> UserIdentity {
    let (user_id, organization_id, _) = dev_seed::memberships()
        .into_iter()
        .find(|(_, _, seeded_role)| *seeded_role == role)
        .unwrap_or_else(|| unreachable!());
    UserIdentity::new(user_id, organization_id)
}

#[tokio::test]
async fn search_stays_in_the_callers_organization() {
    let state = memory_state().await;
    let owner = seeded_user(MembershipRole::Owner);

    let Json(page) = audit_logs::search_audit_logs_handler(
        State(state),
        Extension(owner.clone()),
        Query(AuditLogSearchParams {
            page_size: Some(1000),
            ..AuditLogSearchParams::default()
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());

    let foreign = dev_seed::events()
        .into_iter()
        .filter(|event| event.organization_id != owner.organization_id())
        .count();
    assert_eq!(
        page.total_elements,
        u64::try_from(dev_seed::events().len() - foreign).unwrap_or_default()
    );
    assert!(page.is_first && page.is_last);
}

#[tokio::test]
async fn members_see_masked_payloads_and_no_system_actions() {
    let state = memory_state().await;
    let member = seeded_user(MembershipRole::Member);

    let Json(page) = audit_logs::search_audit_logs_handler(
        State(state),
        Extension(member),
        Query(AuditLogSearchParams {
            resource_types: Some("session".to_owned()),
            page_size: Some(1000),
            ..AuditLogSearchParams::default()
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());

    assert!(!page.entries.is_empty());
    for entry in &page.entries {
        assert!(entry.actor_id.is_some());
        assert_eq!(entry.payload["password"], REDACTION_PLACEHOLDER);
        assert_eq!(entry.ip_address.as_deref(), Some(REDACTION_PLACEHOLDER));
    }
}

#[tokio::test]
async fn non_members_are_unauthorized() {
    let state = memory_state().await;
    let stranger = UserIdentity::new(UserId::new(), dev_seed::organization_id());

    let result = audit_logs::search_audit_logs_handler(
        State(state),
        Extension(stranger),
        Query(AuditLogSearchParams::default()),
    )
    .await;

    assert!(matches!(result, Err(ApiError(AppError::Unauthorized(_)))));
}

#[tokio::test]
async fn foreign_entries_are_not_found() {
    let state = memory_state().await;
    let owner = seeded_user(MembershipRole::Owner);
    let foreign_event = dev_seed::events()
        .into_iter()
        .find(|event| event.organization_id != owner.organization_id())
        .unwrap_or_else(|| unreachable!());

    let result = audit_logs::get_audit_log_entry_handler(
        State(state.clone()),
        Extension(owner.clone()),
        Path(foreign_event.id.to_string()),
    )
    .await;
    assert!(matches!(result, Err(ApiError(AppError::NotFound(_)))));

    let malformed = audit_logs::get_audit_log_entry_handler(
        State(state),
        Extension(owner),
        Path("not-an-id".to_owned()),
    )
    .await;
    assert!(matches!(malformed, Err(ApiError(AppError::NotFound(_)))));
}

#[tokio::test]
async fn export_flow_issues_a_single_use_download() {
    let state = memory_state().await;
    let owner = seeded_user(MembershipRole::Owner);

    let (status, Json(accepted)) = exports::create_export_handler(
        State(state.clone()),
        Extension(owner.clone()),
        Json(CreateExportRequest {
            format: "csv".to_owned(),
            filter: AuditLogFilterRequest {
                resource_types: vec!["invoice".to_owned()],
                ..AuditLogFilterRequest::default()
            },
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted.status, "pending");

    let processed = state
        .export_job_service
        .process_next_job("handler-test")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(processed.is_some());

    let Json(job) = exports::export_status_handler(
        State(state.clone()),
        Extension(owner.clone()),
        Path(accepted.job_id.clone()),
    )
    .await
    .unwrap_or_else(|_| unreachable!());
    assert_eq!(job.status, "completed");
    let token = job.download_token.unwrap_or_else(|| unreachable!());

    let response = downloads::download_export_handler(State(state.clone()), Path(token.clone()))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    assert!(disposition.starts_with("attachment; filename=\"audit-logs-"));
    assert!(disposition.ends_with(".csv\""));
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    assert!(String::from_utf8_lossy(&body).contains("invoice.sent"));

    let second = downloads::download_export_handler(State(state), Path(token)).await;
    assert!(matches!(second, Err(ApiError(AppError::InvalidToken))));
}

#[tokio::test]
async fn other_members_see_status_without_the_token() {
    let state = memory_state().await;
    let owner = seeded_user(MembershipRole::Owner);
    let member = seeded_user(MembershipRole::Member);

    let (_, Json(accepted)) = exports::create_export_handler(
        State(state.clone()),
        Extension(owner),
        Json(CreateExportRequest {
            format: "json".to_owned(),
            filter: AuditLogFilterRequest::default(),
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());
    assert!(
        state
            .export_job_service
            .process_next_job("handler-test")
            .await
            .is_ok()
    );

    let Json(job) = exports::export_status_handler(
        State(state),
        Extension(member),
        Path(accepted.job_id),
    )
    .await
    .unwrap_or_else(|_| unreachable!());

    assert_eq!(job.status, "completed");
    assert!(job.download_token.is_none());
}

#[tokio::test]
async fn members_cannot_export_and_unknown_formats_are_rejected() {
    let state = memory_state().await;

    let forbidden = exports::create_export_handler(
        State(state.clone()),
        Extension(seeded_user(MembershipRole::Member)),
        Json(CreateExportRequest {
            format: "csv".to_owned(),
            filter: AuditLogFilterRequest::default(),
        }),
    )
    .await;
    assert!(matches!(forbidden, Err(ApiError(AppError::Forbidden(_)))));

    let unknown = exports::create_export_handler(
        State(state),
        Extension(seeded_user(MembershipRole::Owner)),
        Json(CreateExportRequest {
            format: "xlsx".to_owned(),
            filter: AuditLogFilterRequest::default(),
        }),
    )
    .await;
    assert!(matches!(unknown, Err(ApiError(AppError::Validation(_)))));
}

#[tokio::test]
async fn status_of_a_job_in_another_organization_is_not_found() {
    let state = memory_state().await;
    let owner = seeded_user(MembershipRole::Owner);

    let (_, Json(accepted)) = exports::create_export_handler(
        State(state.clone()),
        Extension(owner.clone()),
        Json(CreateExportRequest {
            format: "pdf".to_owned(),
            filter: AuditLogFilterRequest::default(),
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());

    let outsider = UserIdentity::new(owner.user_id(), OrganizationId::new());
    let result = exports::export_status_handler(
        State(state),
        Extension(outsider),
        Path(accepted.job_id),
    )
    .await;

    assert!(matches!(
        result,
        Err(ApiError(AppError::Unauthorized(_) | AppError::NotFound(_)))
    ));
}

#[tokio::test]
async fn memory_backend_reports_ready() {
    let state = memory_state().await;

    let (status, Json(health)) = super::health::health_handler(State(state)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(health.ready);
    assert_eq!(health.storage_backend, "memory");
    assert_eq!(health.storage.status, "disabled");
}
