//! Document Fill Engine
//!
//! Two ways to produce documents from the SSOT:
//!
//! - **Mapping path** ([`FillEngine::generate_all`]): every template in the
//!   mapping file is filled with its configured keys and written to
//!   `output/{template_name}_{YYYYMMDD}.{docx|xlsx}`.
//! - **Token path** ([`FillEngine::fill_templates`]): the template itself says
//!   what it needs through `{dotted.key}` tokens, and the result is written to
//!   `output/filled_{file}`.
//!
//! A failure in one template never aborts the batch; it becomes that
//! template's [`TemplateOutcome`].

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::backend::{
    BackendKind, Backends, DocumentFormat, EnginePreference, FieldValue, FillJob, FillMode,
};
use crate::config::SpecSyncConfig;
use crate::error::Result;
use crate::mapping::{self, MappingConfig, Marker, TemplateMapping};
use crate::ssot;
use crate::token;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Error,
}

/// Result of filling one template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateOutcome {
    /// Template name (mapping path) or file name (token path)
    pub template: String,
    pub status: OutcomeStatus,
    /// Output file name inside `output/`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    /// `key -> rendered value` for everything written
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub replaced: BTreeMap<String, String>,
    /// Keys with no value in the SSOT
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub missing: BTreeSet<String>,
    /// Markers absent from the template
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TemplateOutcome {
    fn new(template: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            template: template.into(),
            status,
            output: None,
            backend: None,
            replaced: BTreeMap::new(),
            missing: BTreeSet::new(),
            unmatched: Vec::new(),
            error: None,
        }
    }

    pub fn failed(template: impl Into<String>, error: impl Into<String>) -> Self {
        let mut outcome = Self::new(template, OutcomeStatus::Error);
        outcome.error = Some(error.into());
        outcome
    }

    pub fn skipped(template: impl Into<String>) -> Self {
        Self::new(template, OutcomeStatus::Skipped)
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Outcomes of a batch, in processing order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationReport {
    pub outcomes: Vec<TemplateOutcome>,
}

impl GenerationReport {
    pub fn succeeded(&self) -> usize {
        self.count(OutcomeStatus::Success)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Error)
    }

    /// True when no template ended in an error
    pub fn all_ok(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Fills templates from the SSOT through the planned backends
#[derive(Debug, Clone)]
pub struct FillEngine {
    workspace: Workspace,
    backends: Backends,
    preference: EnginePreference,
}

impl FillEngine {
    pub fn new(config: &SpecSyncConfig) -> Self {
        Self {
            workspace: Workspace::new(config),
            backends: Backends::new(config.automation.clone()),
            preference: config.engine,
        }
    }

    /// Override the configured engine preference
    pub fn with_preference(mut self, preference: EnginePreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn preference(&self) -> EnginePreference {
        self.preference
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Fill every template of the mapping file.
    ///
    /// Fails only when the SSOT or mapping cannot be loaded.
    pub async fn generate_all(&self) -> Result<GenerationReport> {
        let ssot = self.workspace.ssot().load()?;
        let mapping = self.workspace.mapping().load()?;
        std::fs::create_dir_all(self.workspace.output_dir())?;

        tracing::info!(
            "Generating {} template(s) with engine '{}'",
            mapping.template_count(),
            self.preference
        );
        let date = Local::now().format("%Y%m%d").to_string();
        let mut report = GenerationReport::default();
        for (name, template) in &mapping.word_mappings {
            let outcome = self
                .generate_mapped(name, template, DocumentFormat::Word, &ssot, &date)
                .await;
            report.outcomes.push(outcome);
        }
        for (name, template) in &mapping.excel_mappings {
            let outcome = self
                .generate_mapped(name, template, DocumentFormat::Excel, &ssot, &date)
                .await;
            report.outcomes.push(outcome);
        }
        tracing::info!(
            "Generation finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    /// Fill one mapped template into `{name}_{date}.{ext}`
    pub async fn generate_mapped(
        &self,
        name: &str,
        template: &TemplateMapping,
        format: DocumentFormat,
        ssot_root: &Value,
        date: &str,
    ) -> TemplateOutcome {
        let template_path = template.template_path(self.workspace.templates_dir());
        if !template_path.is_file() {
            tracing::error!("Template not found for {}: {}", name, template_path.display());
            return TemplateOutcome::failed(
                name,
                format!("template not found: {}", template_path.display()),
            );
        }

        let mut missing = BTreeSet::new();
        let mut fields = Vec::new();
        for (key, marker) in &template.mappings {
            match ssot::resolve_present(ssot_root, key) {
                Some(value) => fields.push(FieldValue::new(key.clone(), marker.clone(), value.clone())),
                None => {
                    missing.insert(key.clone());
                }
            }
        }

        let output_name = format!("{}_{}.{}", name, date, format.extension());
        let job = FillJob {
            format,
            mode: FillMode::Markers,
            template: template_path,
            output: self.workspace.output_dir().join(&output_name),
            sheet: (format == DocumentFormat::Excel).then(|| template.sheet().to_string()),
            fields,
        };
        self.run_job(name, job, output_name, missing).await
    }

    /// Tokens found in a template under `templates/`
    pub async fn scan_template(&self, file_name: &str) -> Result<BTreeSet<String>> {
        let path = self.workspace.template_path(file_name)?;
        let format = DocumentFormat::from_path(&path)?;
        let (_, text) = self.backends.read_text(self.preference, &path, format).await?;
        Ok(token::scan(&text))
    }

    /// Token-path fill of the named templates
    pub async fn fill_templates(&self, files: &[String]) -> Result<GenerationReport> {
        self.fill_templates_with(files, |_| {}).await
    }

    /// Like [`fill_templates`](Self::fill_templates), calling `on_progress` after each template
    pub async fn fill_templates_with<F>(
        &self,
        files: &[String],
        mut on_progress: F,
    ) -> Result<GenerationReport>
    where
        F: FnMut(&TemplateOutcome),
    {
        let ssot = self.workspace.ssot().load()?;
        std::fs::create_dir_all(self.workspace.output_dir())?;

        let mut report = GenerationReport::default();
        for file in files {
            let outcome = self.fill_template(file, &ssot).await;
            on_progress(&outcome);
            report.outcomes.push(outcome);
        }
        Ok(report)
    }

    /// Token-path fill of one template into `filled_{file}`
    pub async fn fill_template(&self, file: &str, ssot_root: &Value) -> TemplateOutcome {
        let prepared = self.workspace.template_path(file).and_then(|path| {
            let format = DocumentFormat::from_path(&path)?;
            Ok((path, format))
        });
        let (template_path, format) = match prepared {
            Ok(found) => found,
            Err(e) => {
                tracing::error!("Cannot fill {}: {}", file, e);
                return TemplateOutcome::failed(file, e.to_string());
            }
        };

        let tokens = match self
            .backends
            .read_text(self.preference, &template_path, format)
            .await
        {
            Ok((_, text)) => token::scan(&text),
            Err(e) => return TemplateOutcome::failed(file, e.to_string()),
        };
        if tokens.is_empty() {
            tracing::info!("No tokens in {}, skipping", file);
            return TemplateOutcome::skipped(file);
        }

        let mut missing = BTreeSet::new();
        let mut fields = Vec::new();
        for key in tokens {
            match ssot::resolve_present(ssot_root, &key) {
                Some(value) => fields.push(FieldValue::new(key.clone(), Marker::token(key), value.clone())),
                None => {
                    missing.insert(key);
                }
            }
        }

        let output_name = format!("filled_{}", file);
        let job = FillJob {
            format,
            mode: FillMode::Tokens,
            template: template_path,
            output: self.workspace.output_dir().join(&output_name),
            sheet: None,
            fields,
        };
        self.run_job(file, job, output_name, missing).await
    }

    async fn run_job(
        &self,
        label: &str,
        job: FillJob,
        output_name: String,
        missing: BTreeSet<String>,
    ) -> TemplateOutcome {
        match self.backends.fill(self.preference, &job).await {
            Ok((backend, mut report)) => {
                let replaced = report.replaced.take().unwrap_or_else(|| {
                    job.fields
                        .iter()
                        .filter(|f| !report.unmatched.contains(&f.marker.to_string()))
                        .map(|f| (f.key.clone(), f.text()))
                        .collect()
                });
                tracing::info!("Generated {} via {} backend", output_name, backend);
                TemplateOutcome {
                    template: label.to_string(),
                    status: OutcomeStatus::Success,
                    output: Some(output_name),
                    backend: Some(backend),
                    replaced,
                    missing,
                    unmatched: report.unmatched,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!("Failed to generate {}: {}", label, e);
                let mut outcome = TemplateOutcome::failed(label, e.to_string());
                outcome.missing = missing;
                outcome
            }
        }
    }

    /// Write `output/ssot_flat.json` (`marker name -> value`) for external macros
    pub fn export_flat(&self) -> Result<(PathBuf, usize)> {
        let ssot = self.workspace.ssot().load()?;
        let mapping: MappingConfig = self.workspace.mapping().load()?;
        let flat = mapping::marker_values(&ssot, &mapping);

        let path = self.workspace.flat_export_path();
        std::fs::create_dir_all(self.workspace.output_dir())?;
        std::fs::write(&path, serde_json::to_string_pretty(&flat)?)?;
        tracing::info!("Exported {} marker value(s) to {}", flat.len(), path.display());
        Ok((path, flat.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::{DocxDocument, XlsxWorkbook};
    use crate::testing::{write_docx, write_xlsx, DocxSpec, XlsxSpec};

    const SSOT: &str = r#"
product:
  name: Widget
  version: "2.1"
  price: 12.5
  cpu:
    model: X1
  notes: null
"#;

    const MAPPING: &str = r#"
mapping_version: "1.0.0"
word_mappings:
  customer_a:
    file_path: templates/customer_a.docx
    mappings:
      product.name: ProductName
      product.version: { token: Version }
      product.sku: Sku
  ghost:
    file_path: templates/ghost.docx
    mappings:
      product.name: ProductName
excel_mappings:
  quote:
    file_path: templates/quote.xlsx
    sheet_name: Specs
    mappings:
      product.name: B3
      product.price: C3
"#;

    fn project() -> (tempfile::TempDir, FillEngine) {
        let dir = tempfile::tempdir().unwrap();
        let config = SpecSyncConfig::new().with_root(dir.path());
        let engine = FillEngine::new(&config).with_preference(EnginePreference::Native);
        engine.workspace().ensure_dirs().unwrap();
        std::fs::write(config.ssot_path(), SSOT).unwrap();
        std::fs::write(config.mapping_path(), MAPPING).unwrap();
        (dir, engine)
    }

    #[tokio::test]
    async fn test_generate_all_mapping_path() {
        let (_dir, engine) = project();
        let templates = engine.workspace().templates_dir().to_path_buf();
        write_docx(
            &templates.join("customer_a.docx"),
            &DocxSpec::new()
                .bookmark("Model: ", "ProductName", "____")
                .paragraph("Version {Version}"),
        );
        write_xlsx(&templates.join("quote.xlsx"), &XlsxSpec::new("Specs").shared("A3", "Name"));

        let report = engine.generate_all().await.unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);

        let date = Local::now().format("%Y%m%d").to_string();
        let customer = report.outcomes.iter().find(|o| o.template == "customer_a").unwrap();
        assert!(customer.is_success());
        assert_eq!(customer.output.as_deref(), Some(format!("customer_a_{}.docx", date).as_str()));
        assert_eq!(customer.backend, Some(BackendKind::Native));
        assert!(customer.missing.contains("product.sku"));
        assert_eq!(customer.replaced["product.name"], "Widget");

        let ghost = report.outcomes.iter().find(|o| o.template == "ghost").unwrap();
        assert_eq!(ghost.status, OutcomeStatus::Error);
        assert!(ghost.error.as_deref().unwrap().contains("template not found"));

        let out = engine.workspace().output_dir();
        let doc = DocxDocument::open(&out.join(format!("customer_a_{}.docx", date))).unwrap();
        assert_eq!(doc.full_text(), "Model: Widget\nVersion 2.1");

        let workbook = XlsxWorkbook::open(&out.join(format!("quote_{}.xlsx", date))).unwrap();
        assert_eq!(workbook.cell_value("Specs", "B3").unwrap().as_deref(), Some("Widget"));
        assert_eq!(workbook.cell_value("Specs", "C3").unwrap().as_deref(), Some("12.5"));
    }

    #[tokio::test]
    async fn test_generate_all_requires_ssot() {
        let (_dir, engine) = project();
        std::fs::remove_file(engine.workspace().ssot().path()).unwrap();
        assert!(engine.generate_all().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_token_fill() {
        let (_dir, engine) = project();
        write_docx(
            &engine.workspace().templates_dir().join("spec.docx"),
            &DocxSpec::new()
                .paragraph("Name: {product.name}, Ver: {product.version}")
                .table(vec![vec!["CPU", "{product.cpu.model}"], vec!["SKU", "{product.sku}"]]),
        );

        let tokens = engine.scan_template("spec.docx").await.unwrap();
        assert_eq!(tokens.len(), 4);

        let report = engine.fill_templates(&["spec.docx".to_string()]).await.unwrap();
        let outcome = &report.outcomes[0];
        assert!(outcome.is_success());
        assert_eq!(outcome.output.as_deref(), Some("filled_spec.docx"));
        assert_eq!(outcome.replaced.len(), 3);
        assert_eq!(outcome.replaced["product.version"], "2.1");
        assert_eq!(outcome.missing.iter().collect::<Vec<_>>(), vec!["product.sku"]);

        let filled = DocxDocument::open(&engine.workspace().output_dir().join("filled_spec.docx")).unwrap();
        let text = filled.full_text();
        assert!(text.contains("Name: Widget, Ver: 2.1"));
        assert!(text.contains("X1"));
        assert!(text.contains("{product.sku}"));
    }

    #[tokio::test]
    async fn test_token_values_are_not_rescanned() {
        let (_dir, engine) = project();
        engine
            .workspace()
            .ssot()
            .save(serde_json::json!({"a": "{b}", "b": "X"}))
            .unwrap();
        let templates = engine.workspace().templates_dir().to_path_buf();
        write_docx(&templates.join("nested.docx"), &DocxSpec::new().paragraph("V={a} W={b}"));
        write_xlsx(
            &templates.join("nested.xlsx"),
            &XlsxSpec::new("Sheet1").shared("A1", "V={a} W={b}"),
        );

        let files = vec!["nested.docx".to_string(), "nested.xlsx".to_string()];
        let report = engine.fill_templates(&files).await.unwrap();
        for outcome in &report.outcomes {
            assert!(outcome.is_success(), "{:?}", outcome);
            assert_eq!(outcome.replaced["a"], "{b}");
            assert_eq!(outcome.replaced["b"], "X");
            assert!(outcome.unmatched.is_empty());
        }

        let output = engine.workspace().output_dir();
        let doc = DocxDocument::open(&output.join("filled_nested.docx")).unwrap();
        assert!(doc.full_text().contains("V={b} W=X"));
        let workbook = XlsxWorkbook::open(&output.join("filled_nested.xlsx")).unwrap();
        assert_eq!(
            workbook.cell_value("Sheet1", "A1").unwrap().as_deref(),
            Some("V={b} W=X")
        );
    }

    #[tokio::test]
    async fn test_token_fill_skips_and_errors() {
        let (_dir, engine) = project();
        write_docx(
            &engine.workspace().templates_dir().join("plain.docx"),
            &DocxSpec::new().paragraph("Nothing to fill here"),
        );

        let files = vec!["plain.docx".to_string(), "absent.docx".to_string()];
        let mut seen = Vec::new();
        let report = engine
            .fill_templates_with(&files, |o| seen.push(o.template.clone()))
            .await
            .unwrap();
        assert_eq!(seen, files);
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Skipped);
        assert_eq!(report.outcomes[1].status, OutcomeStatus::Error);
        assert!(!engine.workspace().output_dir().join("filled_plain.docx").exists());
        assert!(!report.all_ok());
    }

    #[tokio::test]
    async fn test_refill_is_stable() {
        let (_dir, engine) = project();
        let templates = engine.workspace().templates_dir().to_path_buf();
        write_docx(&templates.join("a.docx"), &DocxSpec::new().paragraph("P {product.name}"));

        engine.fill_templates(&["a.docx".to_string()]).await.unwrap();
        let first = std::fs::read(engine.workspace().output_dir().join("filled_a.docx")).unwrap();

        // Filling the filled document finds nothing left to do.
        std::fs::write(templates.join("b.docx"), &first).unwrap();
        let report = engine.fill_templates(&["b.docx".to_string()]).await.unwrap();
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Skipped);

        engine.fill_templates(&["a.docx".to_string()]).await.unwrap();
        let again = DocxDocument::open(&engine.workspace().output_dir().join("filled_a.docx")).unwrap();
        assert_eq!(again.full_text(), DocxDocument::from_bytes(&first).unwrap().full_text());
    }

    #[tokio::test]
    async fn test_excel_token_fill() {
        let (_dir, engine) = project();
        write_xlsx(
            &engine.workspace().templates_dir().join("sheet.xlsx"),
            &XlsxSpec::new("Sheet1")
                .shared("A1", "{product.name}")
                .sheet("Other")
                .inline("B2", "CPU {product.cpu.model}"),
        );
        let report = engine.fill_templates(&["sheet.xlsx".to_string()]).await.unwrap();
        assert!(report.outcomes[0].is_success());

        let workbook = XlsxWorkbook::open(&engine.workspace().output_dir().join("filled_sheet.xlsx")).unwrap();
        assert_eq!(workbook.cell_value("Sheet1", "A1").unwrap().as_deref(), Some("Widget"));
        assert_eq!(workbook.cell_value("Other", "B2").unwrap().as_deref(), Some("CPU X1"));
    }

    #[test]
    fn test_export_flat() {
        let (_dir, engine) = project();
        let (path, count) = engine.export_flat().unwrap();
        assert_eq!(count, 2);
        let flat: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(flat["ProductName"], "Widget");
        assert_eq!(flat["Version"], "2.1");
    }
}
