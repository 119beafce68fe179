//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod audit_event;
mod export;
mod filter;
mod permissions;
mod redaction;

pub use audit_event::{AuditEvent, AuditLogEntry, AuditLogEntryDetail};
pub use export::{ExportArtifactInfo, ExportFormat, ExportJob, ExportJobId, ExportJobStatus};
pub use filter::{
    AuditLogFilter, DEFAULT_PAGE_SIZE, DateRange, MAX_PAGE_SIZE, MAX_SEARCH_TEXT_LENGTH,
    SortDirection, SortField,
};
pub use permissions::{MembershipRole, UserAuditPermissions};
pub use redaction::{REDACTION_PLACEHOLDER, SENSITIVE_PAYLOAD_FIELDS, redact_payload};
