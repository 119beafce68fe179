mod audit_logs;
mod exports;
mod health;

pub use audit_logs::{
    AuditLogEntryDetailResponse, AuditLogEntryResponse, AuditLogFilterRequest,
    AuditLogPageResponse, AuditLogSearchParams,
};
pub use exports::{CreateExportRequest, ExportAcceptedResponse, ExportJobResponse};
pub use health::{HealthDependencyStatus, HealthResponse};
