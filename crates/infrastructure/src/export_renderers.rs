//! Artifact renderers for the supported export formats.
//!
//! Renderers receive entries that were already redacted by the query
//! service; they never see raw events.

use std::fmt::Write as _;
use std::sync::Arc;

use auditrail_application::ExportRenderer;
use auditrail_core::{AppError, AppResult};
use auditrail_domain::{AuditLogEntry, ExportFormat, ExportJob};

mod csv;
mod json;
mod pdf;


pub use csv::CsvExportRenderer;
pub use json::JsonExportRenderer;
pub use pdf::PdfExportRenderer;

/// Returns one renderer per supported format.
#[must_use]
pub fn default_export_renderers() -> Vec<Arc<dyn ExportRenderer>> {
    vec![
        Arc::new(CsvExportRenderer),
        Arc::new(JsonExportRenderer),
        Arc::new(PdfExportRenderer::default()),
    ]
}

fn actor_label(entry: &AuditLogEntry) -> String {
    entry
        .actor_id
        .map_or_else(|| "system".to_owned(), |actor_id| actor_id.to_string())
}

fn render_error(format: ExportFormat, error: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("failed to render {format} export: {error}"))
}

fn utc_label(timestamp: chrono::DateTime<chrono::Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
