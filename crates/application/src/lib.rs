//! Application services and ports.

#![forbid(unsafe_code)]

mod audit_ports;
mod audit_query_service;
mod download_token_service;
mod export_config;
mod export_job_service;
mod export_ports;
mod export_quota_service;
mod export_worker_pool;
mod permission_resolver;

#[cfg(test)]
mod test_support;

pub use audit_ports::{
    AuditEventSlice, AuditEventStore, Clock, MembershipRepository, ScopedAuditQuery, SystemClock,
};
pub use audit_query_service::{AuditLogPage, AuditQueryService};
pub use download_token_service::{DownloadTokenService, ExportArtifact, IssuedDownloadToken};
pub use export_config::ExportPipelineConfig;
pub use export_job_service::{ExportJobService, ExportJobSettings, ExportJobView};
pub use export_ports::{
    ArtifactStore, DownloadTokenRecord, DownloadTokenRepository, ExportJobRepository,
    ExportQuotaLimits, ExportQuotaStore, ExportRenderer, QuotaReservation,
};
pub use export_quota_service::{AdmissionDecision, ExportQuotaService};
pub use export_worker_pool::{ExportWorkerPool, ExportWorkerPoolHandle};
pub use permission_resolver::AuditPermissionResolver;
