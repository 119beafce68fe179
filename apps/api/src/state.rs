use std::sync::Arc;

use auditrail_application::{
    AuditPermissionResolver, AuditQueryService, DownloadTokenService, ExportJobService,
};
use auditrail_core::{AppResult, UserIdentity};
use auditrail_domain::UserAuditPermissions;
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub permission_resolver: AuditPermissionResolver,
    pub audit_query_service: AuditQueryService,
    pub export_job_service: ExportJobService,
    pub download_token_service: DownloadTokenService,
    pub gateway_shared_secret: Arc<str>,
    pub storage_backend: &'static str,
    pub postgres_pool: Option<PgPool>,
    pub redis_client: Option<redis::Client>,
}

impl AppState {
    /// Resolves the caller's capabilities in the organization bound to the
    /// gateway identity.
    pub async fn permissions_for(&self, user: &UserIdentity) -> AppResult<UserAuditPermissions> {
        self.permission_resolver
            .resolve(user.user_id(), user.organization_id())
            .await
    }
}
