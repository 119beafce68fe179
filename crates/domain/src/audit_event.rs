use auditrail_core::{OrganizationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::permissions::UserAuditPermissions;
use crate::redaction::{REDACTION_PLACEHOLDER, redact_payload};

/// Immutable audit record owned by the event store.
///
/// Events are never updated after write. Ordering is total by
/// `(timestamp, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Stable event identifier.
    pub id: Uuid,
    /// Organization the event belongs to.
    pub organization_id: OrganizationId,
    /// Acting user, `None` for system-generated events.
    pub actor_id: Option<UserId>,
    /// Stable event type, e.g. `user.login`.
    pub event_type: String,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Time the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Structured payload which may contain sensitive fields.
    pub payload: Value,
    /// Originating IP address.
    pub ip_address: Option<String>,
    /// Originating user agent.
    pub user_agent: Option<String>,
}

impl AuditEvent {
    /// Returns whether the event was produced by the system rather than a user.
    #[must_use]
    pub fn is_system_action(&self) -> bool {
        self.actor_id.is_none()
    }

    /// Case-insensitive free-text match over the searchable fields.
    ///
    /// `needle` must already be lowercased. Without `include_sensitive` the
    /// payload is matched in its redacted form so a search cannot reveal
    /// masked values.
    #[must_use]
    pub fn matches_search(&self, needle: &str, include_sensitive: bool) -> bool {
        if self.event_type.to_lowercase().contains(needle)
            || self.resource_type.to_lowercase().contains(needle)
        {
            return true;
        }

        if include_sensitive {
            return self.payload.to_string().to_lowercase().contains(needle);
        }

        let mut payload = self.payload.clone();
        redact_payload(&mut payload);
        payload.to_string().to_lowercase().contains(needle)
    }

    /// Projects the event for a caller, masking whatever the caller may not see.
    #[must_use]
    pub fn into_detail(self, permissions: &UserAuditPermissions) -> AuditLogEntryDetail {
        let mut payload = self.payload;
        let mut redacted_fields = if permissions.can_view_sensitive_data() {
            Vec::new()
        } else {
            redact_payload(&mut payload)
        };

        let (ip_address, user_agent) = if permissions.can_view_technical_data() {
            (self.ip_address, self.user_agent)
        } else {
            let ip_address = self.ip_address.map(|_| {
                redacted_fields.push("ip_address".to_owned());
                REDACTION_PLACEHOLDER.to_owned()
            });
            let user_agent = self.user_agent.map(|_| {
                redacted_fields.push("user_agent".to_owned());
                REDACTION_PLACEHOLDER.to_owned()
            });
            (ip_address, user_agent)
        };

        AuditLogEntryDetail {
            entry: AuditLogEntry {
                id: self.id,
                organization_id: self.organization_id,
                actor_id: self.actor_id,
                event_type: self.event_type,
                resource_type: self.resource_type,
                resource_id: self.resource_id,
                timestamp: self.timestamp,
                payload,
                ip_address,
                redacted: !redacted_fields.is_empty(),
            },
            user_agent,
            redacted_fields,
        }
    }

    /// Projects the event into a list entry for a caller.
    #[must_use]
    pub fn into_entry(self, permissions: &UserAuditPermissions) -> AuditLogEntry {
        self.into_detail(permissions).entry
    }
}

/// Audit row as it leaves the query boundary, already redacted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Stable event identifier.
    pub id: Uuid,
    /// Organization the event belongs to.
    pub organization_id: OrganizationId,
    /// Acting user, `None` for system-generated events.
    pub actor_id: Option<UserId>,
    /// Stable event type.
    pub event_type: String,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Time the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Payload with sensitive fields replaced by the placeholder.
    pub payload: Value,
    /// IP address, or the placeholder when technical data is hidden.
    pub ip_address: Option<String>,
    /// Whether anything in this entry was masked.
    pub redacted: bool,
}

impl AuditLogEntry {
    /// Returns whether the entry was produced by the system.
    #[must_use]
    pub fn is_system_action(&self) -> bool {
        self.actor_id.is_none()
    }
}

/// Detailed view of a single audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntryDetail {
    /// The list projection of the row.
    pub entry: AuditLogEntry,
    /// User agent, or the placeholder when technical data is hidden.
    pub user_agent: Option<String>,
    /// Dotted paths of every field that was masked.
    pub redacted_fields: Vec<String>,
}
