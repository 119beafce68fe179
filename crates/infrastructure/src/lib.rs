//! Infrastructure adapters for the audit log application ports.

#![forbid(unsafe_code)]

mod export_renderers;
mod filesystem_artifact_store;
mod in_memory_artifact_store;
mod in_memory_audit_event_store;
mod in_memory_download_token_repository;
mod in_memory_export_job_repository;
mod in_memory_export_quota_store;
mod in_memory_membership_repository;
mod postgres_audit_event_store;
mod postgres_download_token_repository;
mod postgres_export_job_repository;
mod postgres_export_quota_store;
mod postgres_membership_repository;
mod redis_export_quota_store;

#[cfg(test)]
mod postgres_test_support;

pub use export_renderers::{
    CsvExportRenderer, JsonExportRenderer, PdfExportRenderer, default_export_renderers,
};
pub use filesystem_artifact_store::FilesystemArtifactStore;
pub use in_memory_artifact_store::InMemoryArtifactStore;
pub use in_memory_audit_event_store::InMemoryAuditEventStore;
pub use in_memory_download_token_repository::InMemoryDownloadTokenRepository;
pub use in_memory_export_job_repository::InMemoryExportJobRepository;
pub use in_memory_export_quota_store::InMemoryExportQuotaStore;
pub use in_memory_membership_repository::InMemoryMembershipRepository;
pub use postgres_audit_event_store::PostgresAuditEventStore;
pub use postgres_download_token_repository::PostgresDownloadTokenRepository;
pub use postgres_export_job_repository::PostgresExportJobRepository;
pub use postgres_export_quota_store::PostgresExportQuotaStore;
pub use postgres_membership_repository::PostgresMembershipRepository;
pub use redis_export_quota_store::RedisExportQuotaStore;
