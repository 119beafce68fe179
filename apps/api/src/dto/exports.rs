use auditrail_application::ExportJobView;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::audit_logs::{AuditLogFilterRequest, timestamp_label};

/// Incoming payload for an export request.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/create-export-request.ts"
)]
pub struct CreateExportRequest {
    /// `csv`, `json`, or `pdf`.
    pub format: String,
    #[serde(default)]
    pub filter: AuditLogFilterRequest,
}

/// Acknowledgement of an accepted export.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/export-accepted-response.ts"
)]
pub struct ExportAcceptedResponse {
    pub job_id: String,
    pub status: String,
}

/// API representation of an export job.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/export-job-response.ts"
)]
pub struct ExportJobResponse {
    pub job_id: String,
    pub requested_by: String,
    pub format: String,
    pub status: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub failure_reason: Option<String>,
    #[ts(type = "number | null")]
    pub record_count: Option<u64>,
    #[ts(type = "number | null")]
    pub artifact_size_bytes: Option<u64>,
    /// Present only for the requesting user while the link is valid.
    pub download_token: Option<String>,
    pub download_expires_at: Option<String>,
}

impl From<ExportJobView> for ExportJobResponse {
    fn from(view: ExportJobView) -> Self {
        Self {
            job_id: view.job_id.to_string(),
            requested_by: view.requested_by.to_string(),
            format: view.format.as_str().to_owned(),
            status: view.status.as_str().to_owned(),
            created_at: timestamp_label(view.created_at),
            started_at: view.started_at.map(timestamp_label),
            completed_at: view.completed_at.map(timestamp_label),
            failure_reason: view.failure_reason,
            record_count: view.record_count,
            artifact_size_bytes: view.artifact_size_bytes,
            download_token: view.download_token,
            download_expires_at: view.download_expires_at.map(timestamp_label),
        }
    }
}
