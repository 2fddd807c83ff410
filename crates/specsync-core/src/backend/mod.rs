//! Document backends
//!
//! A backend knows how to fill a template and read a finished document back.
//! Two exist: [`NativeBackend`] edits the OOXML package directly, and
//! [`AutomationBackend`] hands a JSON job to an external office driver.
//! Which ones are tried, and in what order, is decided by [`plan`].

pub mod automation;
pub mod native;

pub use automation::{AutomationBackend, AutomationSettings};
pub use native::NativeBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, SpecSyncError};
use crate::mapping::Marker;
use crate::ssot;

/// Which backend(s) the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnginePreference {
    /// Native first, automation as fallback
    #[default]
    #[serde(rename = "auto")]
    Auto,
    /// Native OOXML editing only
    #[serde(rename = "pure", alias = "native")]
    Native,
    /// External office automation only
    #[serde(rename = "office", alias = "automation")]
    Automation,
}

impl FromStr for EnginePreference {
    type Err = SpecSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(EnginePreference::Auto),
            "pure" | "native" => Ok(EnginePreference::Native),
            "office" | "automation" => Ok(EnginePreference::Automation),
            other => Err(SpecSyncError::BackendUnavailable(format!(
                "unknown engine '{}' (expected auto, pure or office)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EnginePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnginePreference::Auto => write!(f, "auto"),
            EnginePreference::Native => write!(f, "pure"),
            EnginePreference::Automation => write!(f, "office"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Native,
    Automation,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::Automation => write!(f, "automation"),
        }
    }
}

/// Order in which backends are tried. Pure function of its inputs.
///
/// An explicit preference is honoured even when that backend is unavailable,
/// so the caller gets the backend's own error instead of a silent switch.
pub fn plan(
    preference: EnginePreference,
    native_available: bool,
    automation_available: bool,
) -> Vec<BackendKind> {
    match preference {
        EnginePreference::Native => vec![BackendKind::Native],
        EnginePreference::Automation => vec![BackendKind::Automation],
        EnginePreference::Auto => {
            let mut order = Vec::new();
            if native_available {
                order.push(BackendKind::Native);
            }
            if automation_available {
                order.push(BackendKind::Automation);
            }
            order
        }
    }
}

/// Word or Excel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Word,
    Excel,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "docx" | "docm" => Ok(DocumentFormat::Word),
            "xlsx" | "xlsm" => Ok(DocumentFormat::Excel),
            _ => Err(SpecSyncError::UnsupportedFormat(format!(
                "{} (expected .docx or .xlsx)",
                path.display()
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Word => "docx",
            DocumentFormat::Excel => "xlsx",
        }
    }
}

/// One value to place into a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    /// SSOT key the value came from
    pub key: String,
    pub marker: Marker,
    pub value: Value,
}

impl FieldValue {
    pub fn new(key: impl Into<String>, marker: Marker, value: Value) -> Self {
        Self {
            key: key.into(),
            marker,
            value,
        }
    }

    /// Rendered text of the value
    pub fn text(&self) -> String {
        ssot::render(&self.value)
    }
}

/// How a backend places `fields` into the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// One lookup per field marker (bookmark, literal token or cell)
    #[default]
    Markers,
    /// One pass over the document replacing each `{key}` span with the value
    /// of the field with that key; inserted values are never rescanned
    Tokens,
}

/// Fill `template` with `fields` and save the result as `output`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillJob {
    pub format: DocumentFormat,
    #[serde(default)]
    pub mode: FillMode,
    pub template: PathBuf,
    pub output: PathBuf,
    /// Worksheet for cell markers; `None` means every sheet for token markers
    pub sheet: Option<String>,
    pub fields: Vec<FieldValue>,
}

/// What a backend reports after a fill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillReport {
    /// Markers that were not found in the template (display form)
    #[serde(default)]
    pub unmatched: Vec<String>,
    /// `key -> text` actually written, when the backend tracks it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced: Option<BTreeMap<String, String>>,
}

/// A way of filling and reading documents
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether this backend can run on this host
    fn is_available(&self) -> bool;

    /// Fill a template into a new output file; the template is never modified
    async fn fill(&self, job: &FillJob) -> Result<FillReport>;

    /// All text of a document (paragraphs and table cells, or string cells)
    async fn read_text(&self, path: &Path, format: DocumentFormat) -> Result<String>;

    /// Stringified values of the given cells; `None` for empty cells
    async fn read_cells(
        &self,
        path: &Path,
        sheet: &str,
        refs: &[String],
    ) -> Result<BTreeMap<String, Option<String>>>;
}

/// The set of backends with fallback across a [`plan`]
#[derive(Debug, Clone)]
pub struct Backends {
    native: NativeBackend,
    automation: AutomationBackend,
}

impl Backends {
    pub fn new(automation: AutomationSettings) -> Self {
        Self {
            native: NativeBackend::new(),
            automation: AutomationBackend::new(automation),
        }
    }

    pub fn get(&self, kind: BackendKind) -> &dyn DocumentBackend {
        match kind {
            BackendKind::Native => &self.native,
            BackendKind::Automation => &self.automation,
        }
    }

    /// Backends to try for `preference`, in order
    pub fn planned(&self, preference: EnginePreference) -> Result<Vec<&dyn DocumentBackend>> {
        let order = plan(
            preference,
            self.native.is_available(),
            self.automation.is_available(),
        );
        if order.is_empty() {
            return Err(SpecSyncError::BackendUnavailable(format!(
                "no document backend available for engine '{}'",
                preference
            )));
        }
        Ok(order.into_iter().map(|kind| self.get(kind)).collect())
    }

    /// Fill with the first backend that succeeds
    pub async fn fill(
        &self,
        preference: EnginePreference,
        job: &FillJob,
    ) -> Result<(BackendKind, FillReport)> {
        let mut last_error = None;
        for backend in self.planned(preference)? {
            match backend.fill(job).await {
                Ok(report) => return Ok((backend.kind(), report)),
                Err(e) => {
                    tracing::warn!(
                        "{} backend failed to fill {}: {}",
                        backend.kind(),
                        job.template.display(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(exhausted(last_error))
    }

    pub async fn read_text(
        &self,
        preference: EnginePreference,
        path: &Path,
        format: DocumentFormat,
    ) -> Result<(BackendKind, String)> {
        let mut last_error = None;
        for backend in self.planned(preference)? {
            match backend.read_text(path, format).await {
                Ok(text) => return Ok((backend.kind(), text)),
                Err(e) => {
                    tracing::warn!(
                        "{} backend failed to read {}: {}",
                        backend.kind(),
                        path.display(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(exhausted(last_error))
    }

    pub async fn read_cells(
        &self,
        preference: EnginePreference,
        path: &Path,
        sheet: &str,
        refs: &[String],
    ) -> Result<(BackendKind, BTreeMap<String, Option<String>>)> {
        let mut last_error = None;
        for backend in self.planned(preference)? {
            match backend.read_cells(path, sheet, refs).await {
                Ok(cells) => return Ok((backend.kind(), cells)),
                Err(e) => {
                    tracing::warn!(
                        "{} backend failed to read cells of {}: {}",
                        backend.kind(),
                        path.display(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(exhausted(last_error))
    }
}

fn exhausted(last_error: Option<SpecSyncError>) -> SpecSyncError {
    last_error.unwrap_or_else(|| {
        SpecSyncError::BackendUnavailable("no document backend available".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_docx, DocxSpec};
    use serde_json::json;

    #[test]
    fn test_plan() {
        use BackendKind::*;
        assert_eq!(plan(EnginePreference::Auto, true, true), vec![Native, Automation]);
        assert_eq!(plan(EnginePreference::Auto, true, false), vec![Native]);
        assert_eq!(plan(EnginePreference::Auto, false, true), vec![Automation]);
        assert!(plan(EnginePreference::Auto, false, false).is_empty());
        assert_eq!(plan(EnginePreference::Native, false, false), vec![Native]);
        assert_eq!(plan(EnginePreference::Automation, true, false), vec![Automation]);
    }

    #[test]
    fn test_engine_preference_parsing() {
        assert_eq!("pure".parse::<EnginePreference>().unwrap(), EnginePreference::Native);
        assert_eq!("Office".parse::<EnginePreference>().unwrap(), EnginePreference::Automation);
        assert_eq!("auto".parse::<EnginePreference>().unwrap(), EnginePreference::Auto);
        assert!("word".parse::<EnginePreference>().is_err());

        let parsed: EnginePreference = serde_json::from_value(json!("office")).unwrap();
        assert_eq!(parsed, EnginePreference::Automation);
        assert_eq!(serde_json::to_value(EnginePreference::Native).unwrap(), json!("pure"));
    }

    #[test]
    fn test_document_format() {
        assert_eq!(DocumentFormat::from_path(Path::new("a/B.DOCX")).unwrap(), DocumentFormat::Word);
        assert_eq!(DocumentFormat::from_path(Path::new("q.xlsx")).unwrap(), DocumentFormat::Excel);
        assert!(DocumentFormat::from_path(Path::new("notes.pdf")).is_err());
    }

    #[tokio::test]
    async fn test_auto_without_automation_uses_native() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.docx");
        write_docx(&template, &DocxSpec::new().paragraph("Name: {ProductName}"));

        let backends = Backends::new(AutomationSettings::default());
        let job = FillJob {
            format: DocumentFormat::Word,
            mode: FillMode::Markers,
            template: template.clone(),
            output: dir.path().join("out.docx"),
            sheet: None,
            fields: vec![FieldValue::new("product.name", Marker::Named("ProductName".into()), json!("Widget"))],
        };
        let (kind, report) = backends.fill(EnginePreference::Auto, &job).await.unwrap();
        assert_eq!(kind, BackendKind::Native);
        assert!(report.unmatched.is_empty());

        let (_, text) = backends
            .read_text(EnginePreference::Auto, &job.output, DocumentFormat::Word)
            .await
            .unwrap();
        assert_eq!(text, "Name: Widget");
    }

    #[tokio::test]
    async fn test_forced_automation_without_command_fails() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.docx");
        write_docx(&template, &DocxSpec::new().paragraph("x"));

        let backends = Backends::new(AutomationSettings::default());
        let err = backends
            .read_text(EnginePreference::Automation, &template, DocumentFormat::Word)
            .await
            .unwrap_err();
        assert!(matches!(err, SpecSyncError::BackendUnavailable(_)));
    }
}
