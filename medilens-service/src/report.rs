//! Writing finished reports to disk as Markdown or PDF.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use medilens_flow::{DiagnosticReport, GraphError, Result};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use tracing::info;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const LINE_HEIGHT: f32 = 5.5;
const WRAP_COLUMNS: usize = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Pdf,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Pdf => "pdf",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = GraphError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            other => Err(GraphError::Validation(format!(
                "unsupported report format `{}` (expected md or pdf)",
                other
            ))),
        }
    }
}

/// Saves reports under one output directory
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    output_dir: PathBuf,
}

impl ReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `report` as `<stem>_<YYYYmmdd_HHMMSS>.<ext>` and return the path
    pub async fn save(
        &self,
        report: &DiagnosticReport,
        image_name: Option<&str>,
        format: ReportFormat,
    ) -> Result<PathBuf> {
        let contents = match format {
            ReportFormat::Markdown => report.to_markdown().into_bytes(),
            ReportFormat::Pdf => {
                let report = report.clone();
                tokio::task::spawn_blocking(move || render_pdf(&report))
                    .await
                    .map_err(|e| GraphError::Render(format!("PDF worker failed: {}", e)))??
            }
        };

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| render_io_error(&self.output_dir, e))?;

        let path = self
            .output_dir
            .join(file_name(image_name, format, report.generated_at));
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| render_io_error(&path, e))?;

        info!(path = %path.display(), format = format.extension(), "report saved");
        Ok(path)
    }
}

fn render_io_error(path: &Path, error: std::io::Error) -> GraphError {
    GraphError::Render(format!("cannot write {}: {}", path.display(), error))
}

pub fn file_name(image_name: Option<&str>, format: ReportFormat, at: DateTime<Utc>) -> String {
    let stem = image_name
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .map(|stem| {
            stem.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect::<String>()
        })
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "report".to_string());

    format!(
        "{}_{}.{}",
        stem,
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Lay the report out on A4 pages with the built-in Helvetica faces
pub fn render_pdf(report: &DiagnosticReport) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        "MediLens Diagnostic Report",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| GraphError::Render(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| GraphError::Render(e.to_string()))?;

    let layer = doc.get_page(page).get_layer(layer);
    let mut writer = PageWriter {
        doc: &doc,
        layer,
        y: PAGE_HEIGHT - MARGIN,
    };

    writer.line("MediLens Diagnostic Report", 16.0, &bold);
    writer.gap();
    writer.paragraph(&format!("Session: {}", report.session_id), 10.0, &regular);
    writer.paragraph(
        &format!("Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
        10.0,
        &regular,
    );
    writer.paragraph(&format!("Clinical question: {}", report.query), 10.0, &regular);

    for section in &report.sections {
        writer.gap();
        writer.line(&section.title, 13.0, &bold);
        for line in section.body.lines() {
            writer.paragraph(&plain_text(line), 10.0, &regular);
        }
    }

    drop(writer);
    doc.save_to_bytes()
        .map_err(|e| GraphError::Render(e.to_string()))
}

struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl PageWriter<'_> {
    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        if self.y < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
        self.layer
            .use_text(pdf_safe(text), size, Mm(MARGIN), Mm(self.y), font);
        self.y -= LINE_HEIGHT * size / 10.0;
    }

    fn paragraph(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        if text.trim().is_empty() {
            self.gap();
            return;
        }
        for wrapped in wrap(text, WRAP_COLUMNS) {
            self.line(&wrapped, size, font);
        }
    }

    fn gap(&mut self) {
        self.y -= LINE_HEIGHT / 2.0;
    }
}

/// Markdown emphasis and heading markers are dropped in the PDF
fn plain_text(line: &str) -> String {
    line.trim_start_matches('#').replace("**", "").trim().to_string()
}

/// The built-in fonts only cover Latin-1
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2022}' => '-',
            c if (c as u32) < 0x100 => c,
            _ => '?',
        })
        .collect()
}

fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
