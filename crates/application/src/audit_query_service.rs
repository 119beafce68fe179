use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use auditrail_core::{AppError, AppResult};
use auditrail_domain::{AuditLogEntry, AuditLogEntryDetail, AuditLogFilter, UserAuditPermissions};

use crate::audit_ports::{AuditEventSlice, AuditEventStore, ScopedAuditQuery};

mod export_batches;

#[cfg(test)]
mod tests;

/// One page of redacted audit entries with paging metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogPage {
    /// Entries of this page in sort order.
    pub entries: Vec<AuditLogEntry>,
    /// Zero-based page number.
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
    /// Total matching entries across all pages.
    pub total_elements: u64,
    /// Number of pages at this page size.
    pub total_pages: u64,
    /// Whether this is the first page.
    pub is_first: bool,
    /// Whether no page follows this one.
    pub is_last: bool,
}

impl AuditLogPage {
    fn new(entries: Vec<AuditLogEntry>, page: u32, page_size: u32, total_elements: u64) -> Self {
        let total_pages = total_elements.div_ceil(u64::from(page_size.max(1)));
        Self {
            entries,
            page,
            page_size,
            total_elements,
            total_pages,
            is_first: page == 0,
            is_last: u64::from(page) + 1 >= total_pages,
        }
    }
}

/// Permission-scoped reads over the audit event store.
///
/// Every entry leaves this service already redacted for the caller.
#[derive(Clone)]
pub struct AuditQueryService {
    event_store: Arc<dyn AuditEventStore>,
}

impl AuditQueryService {
    /// Creates a query service over an event store.
    #[must_use]
    pub fn new(event_store: Arc<dyn AuditEventStore>) -> Self {
        Self { event_store }
    }

    /// Searches audit logs inside the caller's organization.
    ///
    /// Any organization supplied in `filter` is replaced with the caller's.
    pub async fn search(
        &self,
        permissions: &UserAuditPermissions,
        filter: AuditLogFilter,
    ) -> AppResult<AuditLogPage> {
        require_view(permissions)?;

        let filter = filter.normalized()?;
        let page = filter.page;
        let page_size = filter.page_size;
        let slice = self.fetch_scoped(permissions, filter, None).await?;

        let entries = slice
            .events
            .into_iter()
            .map(|event| event.into_entry(permissions))
            .collect();

        Ok(AuditLogPage::new(entries, page, page_size, slice.total))
    }

    /// Returns one entry with detail fields.
    ///
    /// Entries of other organizations and hidden system entries are reported
    /// as not found.
    pub async fn get_detail(
        &self,
        permissions: &UserAuditPermissions,
        entry_id: uuid::Uuid,
    ) -> AppResult<AuditLogEntryDetail> {
        require_view(permissions)?;

        let organization_id = permissions.organization_id();
        let event = self
            .event_store
            .find_by_id(organization_id, entry_id)
            .await?
            .filter(|event| event.organization_id == organization_id)
            .filter(|event| permissions.can_view_system_actions() || !event.is_system_action())
            .ok_or_else(|| {
                AppError::NotFound(format!("audit log entry '{entry_id}' not found"))
            })?;

        Ok(event.into_detail(permissions))
    }

    async fn fetch_scoped(
        &self,
        permissions: &UserAuditPermissions,
        filter: AuditLogFilter,
        recorded_before: Option<DateTime<Utc>>,
    ) -> AppResult<AuditEventSlice> {
        require_view(permissions)?;

        let organization_id = permissions.organization_id();
        if let Some(requested) = filter.organization_id
            && requested != organization_id
        {
            warn!(
                organization_id = %organization_id,
                requested_organization_id = %requested,
                "ignoring foreign organization in audit filter"
            );
        }

        let query = ScopedAuditQuery {
            organization_id,
            filter: filter.scoped_to(organization_id),
            include_system_actions: permissions.can_view_system_actions(),
            include_sensitive_search: permissions.can_view_sensitive_data(),
            recorded_before,
        };
        let slice = self.event_store.query(&query).await?;

        if slice
            .events
            .iter()
            .any(|event| event.organization_id != organization_id)
        {
            error!(
                organization_id = %organization_id,
                "event store returned rows outside the requested organization"
            );
            return Err(AppError::Internal(
                "audit query returned rows outside the caller's organization".to_owned(),
            ));
        }

        Ok(slice)
    }
}

fn require_view(permissions: &UserAuditPermissions) -> AppResult<()> {
    if !permissions.can_view_audit_logs() {
        return Err(AppError::Forbidden(format!(
            "audit log access is not granted in organization '{}'",
            permissions.organization_id()
        )));
    }

    Ok(())
}
