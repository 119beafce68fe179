use super::*;

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 36;
const FONT_SIZE: u32 = 7;
const LEADING: u32 = 10;
const MAX_LINE_CHARS: usize = 125;

/// Plain-text PDF 1.4 report in a monospaced font.
#[derive(Debug, Clone, Copy)]
pub struct PdfExportRenderer {
    lines_per_page: usize,
}

impl Default for PdfExportRenderer {
    fn default() -> Self {
        let usable_height = PAGE_HEIGHT - 2 * MARGIN;
        Self {
            lines_per_page: usize::try_from(usable_height / LEADING).unwrap_or(64),
        }
    }
}

impl PdfExportRenderer {
    /// Creates a renderer with a custom page length, mainly for tests.
    #[must_use]
    pub fn with_lines_per_page(lines_per_page: usize) -> Self {
        Self {
            lines_per_page: lines_per_page.max(1),
        }
    }
}

impl ExportRenderer for PdfExportRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn render(&self, job: &ExportJob, entries: &[AuditLogEntry]) -> AppResult<Vec<u8>> {
        let lines = report_lines(job, entries);
        let pages: Vec<&[String]> = lines.chunks(self.lines_per_page).collect();
        let mut document = PdfDocument::default();

        let page_count = pages.len();
        let kids = (0..page_count)
            .map(|index| format!("{} 0 R", page_object_number(index)))
            .collect::<Vec<_>>()
            .join(" ");

        document.object(1, "<< /Type /Catalog /Pages 2 0 R >>")?;
        document.object(
            2,
            format!("<< /Type /Pages /Kids [{kids}] /Count {page_count} >>").as_str(),
        )?;
        document.object(
            3,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Courier /Encoding /WinAnsiEncoding >>",
        )?;

        for (index, page_lines) in pages.iter().enumerate() {
            let page_number = page_object_number(index);
            let content_number = page_number + 1;
            document.object(
                page_number,
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                     /Resources << /Font << /F1 3 0 R >> >> /Contents {content_number} 0 R >>"
                )
                .as_str(),
            )?;

            let stream = content_stream(page_lines)?;
            document.object(
                content_number,
                format!(
                    "<< /Length {} >>\nstream\n{stream}\nendstream",
                    stream.len()
                )
                .as_str(),
            )?;
        }

        document.finish()
    }
}

fn page_object_number(page_index: usize) -> usize {
    4 + 2 * page_index
}

fn report_lines(job: &ExportJob, entries: &[AuditLogEntry]) -> Vec<String> {
    let mut lines = vec![
        "AUDIT LOG EXPORT REPORT".to_owned(),
        format!("Export: {}", job.id),
        format!("Organization: {}", job.organization_id),
        format!("Snapshot: {}", utc_label(job.created_at)),
        format!("Records: {}", entries.len()),
        String::new(),
    ];

    for entry in entries {
        lines.push(format!(
            "{}  {}  {}  {}/{}  ip={}",
            utc_label(entry.timestamp),
            actor_label(entry),
            entry.event_type,
            entry.resource_type,
            entry.resource_id,
            entry.ip_address.as_deref().unwrap_or("-"),
        ));
        lines.push(format!("    payload: {}", entry.payload));
    }

    lines
}

fn content_stream(lines: &[String]) -> AppResult<String> {
    let mut stream = String::new();
    let top = PAGE_HEIGHT - MARGIN;
    write!(
        stream,
        "BT\n/F1 {FONT_SIZE} Tf\n{LEADING} TL\n{MARGIN} {top} Td\n"
    )
    .map_err(|error| render_error(ExportFormat::Pdf, error))?;

    for line in lines {
        writeln!(stream, "({}) Tj T*", escape_text(line))
            .map_err(|error| render_error(ExportFormat::Pdf, error))?;
    }
    stream.push_str("ET");

    Ok(stream)
}

/// Escapes PDF string delimiters, replaces non-printable and non-ASCII
/// characters, and truncates to the printable width.
fn escape_text(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for (index, character) in line.chars().enumerate() {
        if index == MAX_LINE_CHARS {
            escaped.push_str("...");
            break;
        }

        match character {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(character);
            }
            ' '..='~' => escaped.push(character),
            _ => escaped.push('?'),
        }
    }
    escaped
}

#[derive(Default)]
struct PdfDocument {
    output: String,
    offsets: Vec<usize>,
}

impl PdfDocument {
    /// Appends object `number`; objects must be written in ascending order.
    fn object(&mut self, number: usize, body: &str) -> AppResult<()> {
        if self.output.is_empty() {
            self.output.push_str("%PDF-1.4\n");
        }

        self.offsets.push(self.output.len());
        debug_assert_eq!(self.offsets.len(), number);
        write!(self.output, "{number} 0 obj\n{body}\nendobj\n")
            .map_err(|error| render_error(ExportFormat::Pdf, error))
    }

    fn finish(mut self) -> AppResult<Vec<u8>> {
        let xref_offset = self.output.len();
        let size = self.offsets.len() + 1;
        write!(self.output, "xref\n0 {size}\n0000000000 65535 f \n")
            .map_err(|error| render_error(ExportFormat::Pdf, error))?;
        for offset in &self.offsets {
            write!(self.output, "{offset:010} 00000 n \n")
                .map_err(|error| render_error(ExportFormat::Pdf, error))?;
        }
        write!(
            self.output,
            "trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        )
        .map_err(|error| render_error(ExportFormat::Pdf, error))?;

        Ok(self.output.into_bytes())
    }
}
