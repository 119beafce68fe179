use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use auditrail_application::{AuditEventSlice, AuditEventStore, ScopedAuditQuery};
use auditrail_core::{AppError, AppResult, OrganizationId};
use auditrail_domain::AuditEvent;

/// In-memory append-only audit event store.
#[derive(Debug, Default)]
pub struct InMemoryAuditEventStore {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event. Identifiers are unique.
    pub async fn append(&self, event: AuditEvent) -> AppResult<()> {
        let mut events = self.events.write().await;
        if events.iter().any(|stored| stored.id == event.id) {
            return Err(AppError::Conflict(format!(
                "audit event '{}' already exists",
                event.id
            )));
        }

        events.push(event);
        Ok(())
    }
}

#[async_trait]
impl AuditEventStore for InMemoryAuditEventStore {
    async fn query(&self, query: &ScopedAuditQuery) -> AppResult<AuditEventSlice> {
        let mut matching: Vec<AuditEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|event| query.matches(event))
            .cloned()
            .collect();
        matching.sort_by(|left, right| query.filter.compare(left, right));

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(query.filter.offset()).unwrap_or(usize::MAX);
        let page_size = usize::try_from(query.filter.page_size).unwrap_or(usize::MAX);

        Ok(AuditEventSlice {
            events: matching.into_iter().skip(offset).take(page_size).collect(),
            total,
        })
    }

    async fn find_by_id(
        &self,
        organization_id: OrganizationId,
        event_id: Uuid,
    ) -> AppResult<Option<AuditEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .find(|event| event.id == event_id && event.organization_id == organization_id)
            .cloned())
    }
}
