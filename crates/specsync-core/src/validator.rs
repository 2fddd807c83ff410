//! Consistency Validator
//!
//! Checks the newest generated document of every mapped template against the
//! current SSOT. Read-only: nothing on disk changes.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::backend::{Backends, DocumentFormat, EnginePreference};
use crate::config::SpecSyncConfig;
use crate::error::Result;
use crate::mapping::TemplateMapping;
use crate::ssot;
use crate::workspace::Workspace;

/// One way a document disagrees with the SSOT
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// No `{template}_*.{ext}` file in `output/`
    MissingOutput { template: String },
    /// The document could not be read by any backend
    Unreadable { template: String, error: String },
    /// A Word document does not contain the expected text
    TextNotFound {
        template: String,
        key: String,
        expected: String,
    },
    /// An Excel cell holds something else
    CellMismatch {
        template: String,
        key: String,
        cell: String,
        expected: String,
        actual: Option<String>,
    },
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Discrepancy::MissingOutput { template } => {
                write!(f, "No output document found for {}", template)
            }
            Discrepancy::Unreadable { template, error } => {
                write!(f, "Cannot read output of {}: {}", template, error)
            }
            Discrepancy::TextNotFound {
                template,
                key,
                expected,
            } => write!(f, "{}: value of {} not found: {}", template, key, expected),
            Discrepancy::CellMismatch {
                template,
                key,
                cell,
                expected,
                actual,
            } => write!(
                f,
                "{}: cell {} ({}) mismatch: expected '{}', actual '{}'",
                template,
                cell,
                key,
                expected,
                actual.as_deref().unwrap_or("")
            ),
        }
    }
}

/// A key that could not be checked because the SSOT has no value for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unverifiable {
    pub template: String,
    pub key: String,
}

/// Which document was checked for a template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckedDocument {
    pub template: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub checked: Vec<CheckedDocument>,
    pub discrepancies: Vec<Discrepancy>,
    pub unverifiable: Vec<Unverifiable>,
}

impl ValidationReport {
    /// True iff there are no discrepancies
    pub fn passed(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// Human-readable discrepancy lines
    pub fn messages(&self) -> Vec<String> {
        self.discrepancies.iter().map(|d| d.to_string()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ConsistencyValidator {
    workspace: Workspace,
    backends: Backends,
    preference: EnginePreference,
}

impl ConsistencyValidator {
    pub fn new(config: &SpecSyncConfig) -> Self {
        Self {
            workspace: Workspace::new(config),
            backends: Backends::new(config.automation.clone()),
            preference: config.engine,
        }
    }

    pub fn with_preference(mut self, preference: EnginePreference) -> Self {
        self.preference = preference;
        self
    }

    /// Validate every mapped template. Fails only when SSOT or mapping cannot be loaded.
    pub async fn validate_all(&self) -> Result<ValidationReport> {
        let ssot_root = self.workspace.ssot().load()?;
        let mapping = self.workspace.mapping().load()?;
        tracing::info!("Validating {} template(s)", mapping.template_count());

        let mut report = ValidationReport::default();
        for (name, template) in &mapping.word_mappings {
            self.validate_template(name, template, DocumentFormat::Word, &ssot_root, &mut report)
                .await;
        }
        for (name, template) in &mapping.excel_mappings {
            self.validate_template(name, template, DocumentFormat::Excel, &ssot_root, &mut report)
                .await;
        }

        if report.passed() {
            tracing::info!("All documents consistent with the SSOT");
        } else {
            tracing::error!("Found {} discrepancies", report.discrepancies.len());
        }
        Ok(report)
    }

    async fn validate_template(
        &self,
        name: &str,
        template: &TemplateMapping,
        format: DocumentFormat,
        ssot_root: &Value,
        report: &mut ValidationReport,
    ) {
        let Some(path) = latest_output(self.workspace.output_dir(), name, format.extension()) else {
            report.discrepancies.push(Discrepancy::MissingOutput {
                template: name.to_string(),
            });
            return;
        };
        report.checked.push(CheckedDocument {
            template: name.to_string(),
            path: path.clone(),
        });

        // (key, marker cell, expected)
        let mut expected = Vec::new();
        for (key, marker) in &template.mappings {
            match ssot::resolve_present(ssot_root, key) {
                Some(value) => expected.push((key, marker, value)),
                None => report.unverifiable.push(Unverifiable {
                    template: name.to_string(),
                    key: key.clone(),
                }),
            }
        }

        match format {
            DocumentFormat::Word => {
                let text = match self.backends.read_text(self.preference, &path, format).await {
                    Ok((_, text)) => text,
                    Err(e) => return unreadable(report, name, e),
                };
                for (key, _, value) in expected {
                    let wanted = ssot::render(value);
                    if !text.contains(&wanted) {
                        report.discrepancies.push(Discrepancy::TextNotFound {
                            template: name.to_string(),
                            key: key.clone(),
                            expected: wanted,
                        });
                    }
                }
            }
            DocumentFormat::Excel => {
                let cells: Vec<_> = expected
                    .iter()
                    .filter_map(|(key, marker, value)| {
                        match marker.cell_ref() {
                            Some(cell) => Some((*key, cell.to_string(), *value)),
                            None => {
                                tracing::warn!("{}: {} has no cell reference, not checked", name, key);
                                None
                            }
                        }
                    })
                    .collect();
                let refs: Vec<String> = cells.iter().map(|(_, cell, _)| cell.clone()).collect();
                let actual = match self
                    .backends
                    .read_cells(self.preference, &path, template.sheet(), &refs)
                    .await
                {
                    Ok((_, values)) => values,
                    Err(e) => return unreadable(report, name, e),
                };
                for (key, cell, value) in cells {
                    let found = actual.get(&cell).cloned().flatten();
                    if !cell_matches(value, found.as_deref()) {
                        report.discrepancies.push(Discrepancy::CellMismatch {
                            template: name.to_string(),
                            key: key.clone(),
                            cell,
                            expected: ssot::render(value),
                            actual: found,
                        });
                    }
                }
            }
        }
    }
}

fn unreadable(report: &mut ValidationReport, template: &str, error: crate::error::SpecSyncError) {
    report.discrepancies.push(Discrepancy::Unreadable {
        template: template.to_string(),
        error: error.to_string(),
    });
}

/// Equal as strings, or as numbers when both sides parse as numbers
fn cell_matches(expected: &Value, actual: Option<&str>) -> bool {
    let wanted = ssot::render(expected);
    let Some(actual) = actual else {
        return wanted.is_empty();
    };
    if actual == wanted {
        return true;
    }
    match (wanted.trim().parse::<f64>(), actual.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Most recently modified `output/{name}_{YYYYMMDD}.{ext}`
pub fn latest_output(output_dir: &Path, name: &str, extension: &str) -> Option<PathBuf> {
    let prefix = format!("{}_", name);
    let suffix = format!(".{}", extension);
    std::fs::read_dir(output_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let file_name = entry.file_name().to_string_lossy().to_string();
            file_name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .is_some_and(is_date_stamp)
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}

fn is_date_stamp(stamp: &str) -> bool {
    stamp.len() == 8 && stamp.bytes().all(|b| b.is_ascii_digit())
}
