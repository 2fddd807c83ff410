//! SSOT data model and the nested-key resolver
//!
//! The SSOT is an arbitrarily nested tree of [`Value`]s. Keys are addressed with
//! dotted paths (`product.cpu.model`). Absence at any depth is `None`, never an
//! error, so generation and validation can carry on and report it.

use chrono::Local;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{FileKind, Result, SpecSyncError};

/// Look up a dotted path inside a value tree.
///
/// Only mappings are descended into; a scalar or sequence met before the last
/// segment yields `None`.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Like [`lookup`], but an explicit `null` counts as absent and the miss is logged.
pub fn resolve_present<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    match lookup(root, path) {
        Some(Value::Null) | None => {
            tracing::warn!("SSOT field not found: {}", path);
            None
        }
        Some(value) => Some(value),
    }
}

/// String form of a value as it appears in generated documents.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Flatten mappings into `dotted.key -> value`; sequences are kept as leaves.
pub fn flatten(root: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    if let Value::Object(map) = root {
        flatten_into(map, "", &mut out);
    }
    out
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) => flatten_into(inner, &full, out),
            leaf => {
                out.insert(full, leaf.clone());
            }
        }
    }
}

/// Serialization format of an SSOT/mapping file, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Yaml,
    Json,
}

impl DataFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Ok(DataFormat::Yaml),
            "json" => Ok(DataFormat::Json),
            _ => Err(SpecSyncError::UnsupportedFormat(format!(
                "{} (expected .yaml or .json)",
                path.display()
            ))),
        }
    }

    pub fn parse(self, content: &str) -> Result<Value> {
        match self {
            DataFormat::Yaml => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
                Ok(serde_json::to_value(yaml)?)
            }
            DataFormat::Json => Ok(serde_json::from_str(content)?),
        }
    }

    pub fn serialize(self, value: &Value) -> Result<String> {
        match self {
            DataFormat::Yaml => Ok(serde_yaml::to_string(value)?),
            DataFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        }
    }
}

/// Read a YAML/JSON file into a value tree, mapping absence to `NotFound`.
pub(crate) fn read_tree(path: &Path, kind: FileKind) -> Result<Value> {
    if !path.exists() {
        return Err(SpecSyncError::NotFound {
            kind,
            path: path.to_path_buf(),
        });
    }
    let format = DataFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    let value = format.parse(&content)?;
    // An empty YAML file parses to null; treat it as an empty mapping.
    Ok(match value {
        Value::Null => Value::Object(Map::new()),
        other => other,
    })
}

/// Replace a data file wholesale, backing up the previous version first.
///
/// Stamps `last_updated` with today's date when the root is a mapping. Returns
/// the backup path if one was written.
pub(crate) fn replace_tree(path: &Path, mut value: Value) -> Result<Option<PathBuf>> {
    let format = DataFormat::from_path(path)?;

    let backup = if path.exists() {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let backup = path.with_file_name(format!(
            "{}.backup.{}",
            file_name,
            chrono::Utc::now().timestamp()
        ));
        std::fs::copy(path, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Value::Object(map) = &mut value {
        map.insert(
            "last_updated".to_string(),
            Value::String(Local::now().format("%Y-%m-%d").to_string()),
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format.serialize(&value)?)?;
    Ok(backup)
}

/// The SSOT file on disk
#[derive(Debug, Clone)]
pub struct SsotStore {
    path: PathBuf,
}

impl SsotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the whole SSOT document
    pub fn load(&self) -> Result<Value> {
        read_tree(&self.path, FileKind::Ssot)
    }

    /// Replace the whole SSOT document (with backup)
    pub fn save(&self, value: Value) -> Result<Option<PathBuf>> {
        let backup = replace_tree(&self.path, value)?;
        tracing::info!("SSOT updated: {}", self.path.display());
        Ok(backup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "version": "1.0",
            "product": {
                "name": "Widget",
                "version": "2.1",
                "cpu": { "model": "X200", "cores": 8 },
                "ports": ["usb", "hdmi"],
                "sku": null
            }
        })
    }

    #[test]
    fn test_lookup_present_keys() {
        let ssot = sample();
        assert_eq!(lookup(&ssot, "product.name"), Some(&json!("Widget")));
        assert_eq!(lookup(&ssot, "product.cpu.cores"), Some(&json!(8)));
        assert_eq!(lookup(&ssot, "product.ports"), Some(&json!(["usb", "hdmi"])));
        assert_eq!(lookup(&ssot, "version"), Some(&json!("1.0")));
    }

    #[test]
    fn test_lookup_absent_keys() {
        let ssot = sample();
        assert_eq!(lookup(&ssot, "product.nonexistent"), None);
        assert_eq!(lookup(&ssot, "missing.entirely"), None);
        // Descending through a scalar or a sequence is a miss, not a panic.
        assert_eq!(lookup(&ssot, "product.name.first"), None);
        assert_eq!(lookup(&ssot, "product.ports.0"), None);
        assert_eq!(lookup(&ssot, ""), None);
    }

    #[test]
    fn test_resolve_present_treats_null_as_missing() {
        let ssot = sample();
        assert_eq!(lookup(&ssot, "product.sku"), Some(&Value::Null));
        assert_eq!(resolve_present(&ssot, "product.sku"), None);
        assert_eq!(resolve_present(&ssot, "product.name"), Some(&json!("Widget")));
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&json!("2.1")), "2.1");
        assert_eq!(render(&json!(8)), "8");
        assert_eq!(render(&json!(2.5)), "2.5");
        assert_eq!(render(&json!(true)), "true");
        assert_eq!(render(&json!(["a", "b"])), "[\"a\",\"b\"]");
    }

    #[test]
    fn test_flatten_keeps_sequences_as_leaves() {
        let flat = flatten(&sample());
        assert_eq!(flat.get("product.cpu.model"), Some(&json!("X200")));
        assert_eq!(flat.get("product.ports"), Some(&json!(["usb", "hdmi"])));
        assert!(!flat.contains_key("product"));
        assert!(!flat.contains_key("product.cpu"));
    }

    #[test]
    fn test_store_load_yaml_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.yaml");
        let store = SsotStore::new(&path);
        assert!(store.load().unwrap_err().is_not_found());

        std::fs::write(&path, "product:\n  name: Widget\n  version: \"2.1\"\n").unwrap();
        let value = store.load().unwrap();
        assert_eq!(lookup(&value, "product.version"), Some(&json!("2.1")));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.txt");
        std::fs::write(&path, "x").unwrap();
        let err = SsotStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SpecSyncError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_save_writes_backup_and_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.yaml");
        std::fs::write(&path, "version: '1.0'\n").unwrap();

        let store = SsotStore::new(&path);
        let backup = store.save(json!({"version": "1.1"})).unwrap();

        let backup = backup.expect("previous file should be backed up");
        assert!(std::fs::read_to_string(&backup).unwrap().contains("1.0"));
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("master.yaml.backup."));

        let reloaded = store.load().unwrap();
        assert_eq!(lookup(&reloaded, "version"), Some(&json!("1.1")));
        assert!(lookup(&reloaded, "last_updated").is_some());
    }
}
