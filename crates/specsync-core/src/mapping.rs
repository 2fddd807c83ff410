//! Field mapping configuration
//!
//! A mapping file associates SSOT dotted keys with destination markers, per
//! template:
//!
//! ```yaml
//! mapping_version: "1.0.0"
//! word_mappings:
//!   customer_a:
//!     file_path: templates/customer_a.docx
//!     mappings:
//!       product.name: ProductName          # bookmark, else {ProductName}
//!       product.version: { token: Version }
//! excel_mappings:
//!   quote:
//!     file_path: templates/quote.xlsx
//!     sheet_name: Specs
//!     mappings:
//!       product.name: B3
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{FileKind, Result};
use crate::ssot;

/// Worksheet used when a mapping names none
pub const DEFAULT_SHEET: &str = "Sheet1";

/// Destination of one SSOT value inside a template
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Marker {
    /// Legacy bare name. Word: bookmark if present, else `{name}` token.
    /// Excel: a cell reference.
    Named(String),
    /// Explicit form
    Tagged(MarkerTarget),
}

/// Explicitly tagged destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerTarget {
    Bookmark(String),
    Token(String),
    Cell(String),
}

impl Marker {
    pub fn bookmark(name: impl Into<String>) -> Self {
        Marker::Tagged(MarkerTarget::Bookmark(name.into()))
    }

    pub fn token(name: impl Into<String>) -> Self {
        Marker::Tagged(MarkerTarget::Token(name.into()))
    }

    pub fn cell(reference: impl Into<String>) -> Self {
        Marker::Tagged(MarkerTarget::Cell(reference.into()))
    }

    /// The configured name, whatever the variant
    pub fn name(&self) -> &str {
        match self {
            Marker::Named(name) => name,
            Marker::Tagged(MarkerTarget::Bookmark(name))
            | Marker::Tagged(MarkerTarget::Token(name))
            | Marker::Tagged(MarkerTarget::Cell(name)) => name,
        }
    }

    /// Cell reference for spreadsheet mappings
    pub fn cell_ref(&self) -> Option<&str> {
        match self {
            Marker::Named(name) | Marker::Tagged(MarkerTarget::Cell(name)) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Marker::Named(name) => write!(f, "{}", name),
            Marker::Tagged(MarkerTarget::Bookmark(name)) => write!(f, "bookmark:{}", name),
            Marker::Tagged(MarkerTarget::Token(name)) => write!(f, "{{{}}}", name),
            Marker::Tagged(MarkerTarget::Cell(name)) => write!(f, "cell:{}", name),
        }
    }
}

/// Mapping of a single template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMapping {
    /// Template location, usually `templates/<file>`
    pub file_path: String,

    /// Worksheet for spreadsheet templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,

    /// `ssot.dotted.key -> marker`
    #[serde(default)]
    pub mappings: BTreeMap<String, Marker>,
}

impl TemplateMapping {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            sheet_name: None,
            mappings: BTreeMap::new(),
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet_name = Some(sheet.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, marker: Marker) -> Self {
        self.mappings.insert(key.into(), marker);
        self
    }

    pub fn sheet(&self) -> &str {
        self.sheet_name.as_deref().unwrap_or(DEFAULT_SHEET)
    }

    /// Resolve `file_path` against the templates directory.
    ///
    /// A leading `templates/` is dropped so both `templates/a.docx` and
    /// `a.docx` land in the same place; absolute paths are kept.
    pub fn template_path(&self, templates_dir: &Path) -> PathBuf {
        let raw = Path::new(&self.file_path);
        if raw.is_absolute() {
            return raw.to_path_buf();
        }
        let relative = raw.strip_prefix("templates").unwrap_or(raw);
        templates_dir.join(relative)
    }
}

/// Whole mapping file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub word_mappings: BTreeMap<String, TemplateMapping>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub excel_mappings: BTreeMap<String, TemplateMapping>,

    /// Anything else in the file, kept on round-trip
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MappingConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn template_count(&self) -> usize {
        self.word_mappings.len() + self.excel_mappings.len()
    }
}

/// Flat `marker name -> value` for every Word mapping.
///
/// Missing, null and empty-string values are left out. Feeds external macros
/// that fill protected documents themselves.
pub fn marker_values(ssot_root: &Value, mapping: &MappingConfig) -> Map<String, Value> {
    let mut flat = Map::new();
    for template in mapping.word_mappings.values() {
        for (key, marker) in &template.mappings {
            match ssot::lookup(ssot_root, key) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) if s.is_empty() => {}
                Some(value) => {
                    flat.insert(marker.name().to_string(), value.clone());
                }
            }
        }
    }
    flat
}

/// The mapping file on disk
#[derive(Debug, Clone)]
pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Raw document, as stored
    pub fn load_raw(&self) -> Result<Value> {
        ssot::read_tree(&self.path, FileKind::Mapping)
    }

    /// Typed mapping configuration
    pub fn load(&self) -> Result<MappingConfig> {
        MappingConfig::from_value(self.load_raw()?)
    }

    /// Replace the mapping file (with backup)
    pub fn save_raw(&self, value: Value) -> Result<Option<PathBuf>> {
        let backup = ssot::replace_tree(&self.path, value)?;
        tracing::info!("Mapping updated: {}", self.path.display());
        Ok(backup)
    }

    pub fn save(&self, config: &MappingConfig) -> Result<Option<PathBuf>> {
        self.save_raw(config.to_value()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
mapping_version: "1.0.0"
last_updated: "2025-11-13"
owner: sales
word_mappings:
  customer_a:
    file_path: templates/customer_a.docx
    mappings:
      product.name: ProductName
      product.version:
        token: Version
      product.cpu.model:
        bookmark: CpuModel
excel_mappings:
  quote:
    file_path: templates/quote.xlsx
    sheet_name: Specs
    mappings:
      product.name: B3
      product.version:
        cell: C4
"#;

    fn load_sample() -> MappingConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("customer_mapping.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        MappingStore::new(&path).load().unwrap()
    }

    #[test]
    fn test_marker_variants_parse() {
        let config = load_sample();
        let word = &config.word_mappings["customer_a"];
        assert_eq!(word.mappings["product.name"], Marker::Named("ProductName".into()));
        assert_eq!(word.mappings["product.version"], Marker::token("Version"));
        assert_eq!(word.mappings["product.cpu.model"], Marker::bookmark("CpuModel"));

        let excel = &config.excel_mappings["quote"];
        assert_eq!(excel.sheet(), "Specs");
        assert_eq!(excel.mappings["product.name"].cell_ref(), Some("B3"));
        assert_eq!(excel.mappings["product.version"].cell_ref(), Some("C4"));
        assert_eq!(config.template_count(), 2);
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let config = load_sample();
        assert_eq!(config.extra.get("owner"), Some(&json!("sales")));
        let value = config.to_value().unwrap();
        assert_eq!(value["owner"], json!("sales"));
        assert_eq!(value["word_mappings"]["customer_a"]["mappings"]["product.version"], json!({"token": "Version"}));
    }

    #[test]
    fn test_missing_mapping_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MappingStore::new(dir.path().join("nope.yaml")).load().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_template_path_resolution() {
        let templates = Path::new("/project/templates");
        assert_eq!(
            TemplateMapping::new("templates/a.docx").template_path(templates),
            PathBuf::from("/project/templates/a.docx")
        );
        assert_eq!(
            TemplateMapping::new("b.xlsx").template_path(templates),
            PathBuf::from("/project/templates/b.xlsx")
        );
        assert_eq!(TemplateMapping::new("x.xlsx").sheet(), DEFAULT_SHEET);
    }

    #[test]
    fn test_marker_values_skip_missing_and_empty() {
        let ssot = json!({"product": {"name": "Widget", "version": "", "cpu": {"model": null}}});
        let mapping = MappingConfig::default();
        let mut mapping = mapping;
        mapping.word_mappings.insert(
            "a".into(),
            TemplateMapping::new("a.docx")
                .with_field("product.name", Marker::Named("ProductName".into()))
                .with_field("product.version", Marker::token("Version"))
                .with_field("product.cpu.model", Marker::bookmark("Cpu"))
                .with_field("product.sku", Marker::Named("Sku".into())),
        );

        let flat = marker_values(&ssot, &mapping);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat["ProductName"], json!("Widget"));
    }
}
