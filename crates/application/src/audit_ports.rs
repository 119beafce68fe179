use async_trait::async_trait;
use chrono::{DateTime, Utc};

use auditrail_core::{AppResult, OrganizationId, UserId};
use auditrail_domain::{AuditEvent, AuditLogFilter, MembershipRole};

/// Tenant-bound read request handed to the event store.
///
/// Built only by the query service, after the filter has been validated and
/// its organization replaced with the caller's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedAuditQuery {
    /// Organization every returned row must belong to.
    pub organization_id: OrganizationId,
    /// Validated filter, sort, and page.
    pub filter: AuditLogFilter,
    /// Whether rows without an actor are returned.
    pub include_system_actions: bool,
    /// Whether free text may match masked payload values.
    pub include_sensitive_search: bool,
    /// Upper timestamp bound applied on top of the filter.
    pub recorded_before: Option<DateTime<Utc>>,
}

impl ScopedAuditQuery {
    /// Evaluates every predicate of the query against one event.
    ///
    /// Used by in-process stores; SQL stores express the same predicates.
    #[must_use]
    pub fn matches(&self, event: &AuditEvent) -> bool {
        event.organization_id == self.organization_id
            && (self.include_system_actions || !event.is_system_action())
            && self
                .recorded_before
                .is_none_or(|recorded_before| event.timestamp <= recorded_before)
            && self.filter.matches(event, self.include_sensitive_search)
    }
}

/// One page of raw events plus the total matching count.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEventSlice {
    /// Events of the requested page in sort order.
    pub events: Vec<AuditEvent>,
    /// Total number of matching events across all pages.
    pub total: u64,
}

/// Read-only port over the append-only audit event store.
#[async_trait]
pub trait AuditEventStore: Send + Sync {
    /// Returns one sorted page of events matching the query.
    async fn query(&self, query: &ScopedAuditQuery) -> AppResult<AuditEventSlice>;

    /// Returns one event when it exists inside the organization.
    async fn find_by_id(
        &self,
        organization_id: OrganizationId,
        event_id: uuid::Uuid,
    ) -> AppResult<Option<AuditEvent>>;
}

/// Identity and role provider consulted for every permission check.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Returns the user's role in the organization, if any.
    async fn find_role(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> AppResult<Option<MembershipRole>>;
}

/// Time source for expiry, window, and timeout decisions.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
