use super::*;

const HEADER: &str =
    "id,timestamp,actor,event_type,resource_type,resource_id,ip_address,redacted,payload";

/// RFC 4180 CSV with every field quoted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExportRenderer;

impl ExportRenderer for CsvExportRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }

    fn render(&self, _job: &ExportJob, entries: &[AuditLogEntry]) -> AppResult<Vec<u8>> {
        let mut output = String::with_capacity(HEADER.len() + entries.len() * 160);
        output.push_str(HEADER);
        output.push_str("\r\n");

        for entry in entries {
            let fields = [
                entry.id.to_string(),
                utc_label(entry.timestamp),
                actor_label(entry),
                entry.event_type.clone(),
                entry.resource_type.clone(),
                entry.resource_id.clone(),
                entry.ip_address.clone().unwrap_or_default(),
                entry.redacted.to_string(),
                entry.payload.to_string(),
            ];

            for (index, field) in fields.iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                write!(output, "\"{}\"", escape_field(field))
                    .map_err(|error| render_error(ExportFormat::Csv, error))?;
            }
            output.push_str("\r\n");
        }

        Ok(output.into_bytes())
    }
}

/// Doubles quotes and defuses spreadsheet formulas.
fn escape_field(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    if escaped.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{escaped}")
    } else {
        escaped
    }
}
