//! `specsync discover` - marker suggestions for an unmarked Word template

use anyhow::{Context, Result};
use colored::Colorize;
use specsync_core::discovery::{self, FieldCandidate};
use specsync_core::ooxml::DocxDocument;
use specsync_core::{MappingStore, SpecSyncConfig, SsotStore};
use std::path::{Path, PathBuf};

/// Options for the `discover` command.
#[derive(Debug, Default)]
pub struct DiscoverOptions {
    pub template_name: Option<String>,
    pub report: Option<PathBuf>,
    pub mapping: Option<PathBuf>,
}

#[derive(Debug)]
pub struct DiscoverSummary {
    pub fields: Vec<FieldCandidate>,
    pub report: String,
    /// Set when the report went to a file instead of stdout
    pub report_path: Option<PathBuf>,
    pub mapping_path: Option<PathBuf>,
}

pub fn run(config: &SpecSyncConfig, document: &Path, opts: DiscoverOptions) -> Result<DiscoverSummary> {
    let doc = DocxDocument::open(document)
        .with_context(|| format!("Failed to open {}", document.display()))?;
    let mut fields = discovery::discover_fields(&doc);

    let store = SsotStore::new(config.ssot_path());
    if store.exists() {
        let data = store.load().context("Failed to load SSOT")?;
        discovery::suggest_ssot_paths(&mut fields, &data);
    } else {
        tracing::warn!(
            "SSOT not found at {}, skipping path suggestions",
            store.path().display()
        );
    }

    let report = discovery::render_report(&fields);
    if let Some(path) = &opts.report {
        std::fs::write(path, &report)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} report -> {}", "✓".green(), path.display());
    }

    if let Some(path) = &opts.mapping {
        let name = opts
            .template_name
            .clone()
            .or_else(|| document.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "template".to_string());
        let mapping = discovery::suggested_mapping(&fields, &name);
        MappingStore::new(path.clone())
            .save(&mapping)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} suggested mapping -> {}", "✓".green(), path.display());
    }

    Ok(DiscoverSummary {
        fields,
        report,
        report_path: opts.report,
        mapping_path: opts.mapping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use specsync_core::testing::{write_docx, DocxSpec};

    fn document(dir: &Path) -> PathBuf {
        let path = dir.join("datasheet.docx");
        write_docx(
            &path,
            &DocxSpec::new()
                .paragraph("產品名稱: ______")
                .paragraph("This paragraph is long enough that no keyword rule should ever consider it a field."),
        );
        path
    }

    #[test]
    fn test_report_without_ssot() {
        let dir = tempfile::tempdir().unwrap();
        let config = SpecSyncConfig::new().with_root(dir.path());
        let doc = document(dir.path());

        let summary = run(&config, &doc, DiscoverOptions::default()).unwrap();
        assert_eq!(summary.fields.len(), 1);
        assert_eq!(summary.fields[0].suggested_marker, "ProductName");
        assert!(summary.fields[0].suggested_ssot_path.is_none());
        assert!(summary.report.contains("ProductName"));
        assert!(summary.report_path.is_none());
    }

    #[test]
    fn test_writes_report_and_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let config = SpecSyncConfig::new().with_root(dir.path());
        std::fs::create_dir_all(dir.path().join("ssot")).unwrap();
        std::fs::write(config.ssot_path(), "product:\n  name: Widget\n").unwrap();
        let doc = document(dir.path());

        let opts = DiscoverOptions {
            template_name: Some("sheet_a".to_string()),
            report: Some(dir.path().join("report.txt")),
            mapping: Some(dir.path().join("suggested.yaml")),
        };
        let summary = run(&config, &doc, opts).unwrap();
        assert!(dir.path().join("report.txt").is_file());

        let mapping = MappingStore::new(summary.mapping_path.unwrap()).load().unwrap();
        let template = &mapping.word_mappings["sheet_a"];
        assert_eq!(template.file_path, "templates/sheet_a.docx");
    }

    #[test]
    fn test_missing_document_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SpecSyncConfig::new().with_root(dir.path());
        assert!(run(&config, &dir.path().join("none.docx"), DiscoverOptions::default()).is_err());
    }
}
