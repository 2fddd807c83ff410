//! Native backend: edits the OOXML package in-process

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

use super::{BackendKind, DocumentBackend, DocumentFormat, FillJob, FillMode, FillReport};
use crate::error::{Result, ResultExt, SpecSyncError};
use crate::mapping::{Marker, MarkerTarget, DEFAULT_SHEET};
use crate::ooxml::{CellRef, CellValue, DocxDocument, XlsxWorkbook};
use crate::token::{token_for, Substitution};

/// Always available; runs the codecs on the blocking pool
#[derive(Debug, Clone, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fill(&self, job: &FillJob) -> Result<FillReport> {
        let job = job.clone();
        tokio::task::spawn_blocking(move || match job.format {
            DocumentFormat::Word => fill_word(&job),
            DocumentFormat::Excel => fill_excel(&job),
        })
        .await?
    }

    async fn read_text(&self, path: &Path, format: DocumentFormat) -> Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_text(&path, format)).await?
    }

    async fn read_cells(
        &self,
        path: &Path,
        sheet: &str,
        refs: &[String],
    ) -> Result<BTreeMap<String, Option<String>>> {
        let path = path.to_path_buf();
        let sheet = sheet.to_string();
        let refs = refs.to_vec();
        tokio::task::spawn_blocking(move || read_cells(&path, &sheet, &refs)).await?
    }
}

fn unmatched(report: &mut FillReport, job: &FillJob, marker: &Marker) {
    tracing::warn!(
        "Marker {} not found in {}",
        marker,
        job.template.display()
    );
    report.unmatched.push(marker.to_string());
}

/// `key -> text` lookup for token-mode jobs
fn token_values(job: &FillJob) -> BTreeMap<&str, String> {
    job.fields.iter().map(|f| (f.key.as_str(), f.text())).collect()
}

fn token_report(job: &FillJob, outcome: Substitution) -> FillReport {
    let mut report = FillReport::default();
    for field in &job.fields {
        if !outcome.replaced.contains_key(&field.key) {
            unmatched(&mut report, job, &field.marker);
        }
    }
    report.replaced = Some(outcome.replaced);
    report
}

fn fill_word(job: &FillJob) -> Result<FillReport> {
    let mut doc = DocxDocument::open(&job.template)?;
    let report = match job.mode {
        FillMode::Tokens => {
            let values = token_values(job);
            let outcome = doc.substitute_tokens(|key| values.get(key).cloned());
            token_report(job, outcome)
        }
        FillMode::Markers => fill_word_markers(&mut doc, job),
    };

    doc.save(&job.output)
        .with_context(|| format!("Writing {}", job.output.display()))?;
    Ok(report)
}

fn fill_word_markers(doc: &mut DocxDocument, job: &FillJob) -> FillReport {
    let mut report = FillReport::default();
    for field in &job.fields {
        let text = field.text();
        let hit = match &field.marker {
            Marker::Named(name) => {
                doc.set_bookmark_text(name, &text) || doc.replace_literal(&token_for(name), &text) > 0
            }
            Marker::Tagged(MarkerTarget::Bookmark(name)) => doc.set_bookmark_text(name, &text),
            Marker::Tagged(MarkerTarget::Token(name)) => {
                doc.replace_literal(&token_for(name), &text) > 0
            }
            Marker::Tagged(MarkerTarget::Cell(_)) => false,
        };
        if hit {
            tracing::debug!("{} -> {}", field.key, field.marker);
        } else {
            unmatched(&mut report, job, &field.marker);
        }
    }
    report
}

fn fill_excel(job: &FillJob) -> Result<FillReport> {
    let mut workbook = XlsxWorkbook::open(&job.template)?;
    let report = match job.mode {
        FillMode::Tokens => {
            let values = token_values(job);
            let outcome =
                workbook.substitute_tokens(job.sheet.as_deref(), |key| values.get(key).cloned())?;
            token_report(job, outcome)
        }
        FillMode::Markers => fill_excel_markers(&mut workbook, job)?,
    };

    workbook
        .save(&job.output)
        .with_context(|| format!("Writing {}", job.output.display()))?;
    Ok(report)
}

fn fill_excel_markers(workbook: &mut XlsxWorkbook, job: &FillJob) -> Result<FillReport> {
    let mut report = FillReport::default();
    let cell_sheet = job.sheet.as_deref().unwrap_or(DEFAULT_SHEET);
    let has_cell_markers = job
        .fields
        .iter()
        .any(|f| !matches!(f.marker, Marker::Tagged(MarkerTarget::Token(_) | MarkerTarget::Bookmark(_))));
    if has_cell_markers && !workbook.has_sheet(cell_sheet) {
        return Err(SpecSyncError::SheetNotFound(cell_sheet.to_string()));
    }

    for field in &job.fields {
        let hit = match &field.marker {
            Marker::Named(reference) | Marker::Tagged(MarkerTarget::Cell(reference)) => {
                if CellRef::parse(reference).is_ok() {
                    workbook.set_cell(cell_sheet, reference, &CellValue::from(&field.value))?;
                    true
                } else {
                    false
                }
            }
            Marker::Tagged(MarkerTarget::Token(name)) => {
                workbook.replace_literal(job.sheet.as_deref(), &token_for(name), &field.text())? > 0
            }
            Marker::Tagged(MarkerTarget::Bookmark(_)) => false,
        };
        if hit {
            tracing::debug!("{} -> {}", field.key, field.marker);
        } else {
            unmatched(&mut report, job, &field.marker);
        }
    }
    Ok(report)
}

fn read_text(path: &Path, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Word => Ok(DocxDocument::open(path)?.full_text()),
        DocumentFormat::Excel => Ok(XlsxWorkbook::open(path)?.full_text()),
    }
}

fn read_cells(path: &Path, sheet: &str, refs: &[String]) -> Result<BTreeMap<String, Option<String>>> {
    let workbook = XlsxWorkbook::open(path)?;
    let mut values = BTreeMap::new();
    for reference in refs {
        values.insert(reference.clone(), workbook.cell_value(sheet, reference)?);
    }
    Ok(values)
}
