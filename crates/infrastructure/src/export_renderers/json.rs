use serde::Serialize;

use super::*;

#[derive(Serialize)]
struct JsonExportDocument<'a> {
    export_info: JsonExportInfo,
    audit_logs: &'a [AuditLogEntry],
}

#[derive(Serialize)]
struct JsonExportInfo {
    export_id: String,
    organization_id: String,
    format: ExportFormat,
    snapshot_at: String,
    record_count: usize,
}

/// Pretty-printed JSON document with export metadata and the entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExportRenderer;

impl ExportRenderer for JsonExportRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn render(&self, job: &ExportJob, entries: &[AuditLogEntry]) -> AppResult<Vec<u8>> {
        let document = JsonExportDocument {
            export_info: JsonExportInfo {
                export_id: job.id.to_string(),
                organization_id: job.organization_id.to_string(),
                format: ExportFormat::Json,
                snapshot_at: utc_label(job.created_at),
                record_count: entries.len(),
            },
            audit_logs: entries,
        };

        let mut bytes = serde_json::to_vec_pretty(&document)
            .map_err(|error| render_error(ExportFormat::Json, error))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
