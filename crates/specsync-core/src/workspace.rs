//! Project directory layout
//!
//! ```text
//! <root>/ssot/master.yaml
//! <root>/mapping/customer_mapping.yaml
//! <root>/templates/*.docx|*.xlsx
//! <root>/output/
//! ```

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::backend::DocumentFormat;
use crate::config::SpecSyncConfig;
use crate::error::{FileKind, Result, SpecSyncError};
use crate::mapping::MappingStore;
use crate::ssot::SsotStore;

/// File name of the flat marker export
pub const FLAT_EXPORT_FILE: &str = "ssot_flat.json";

/// A template or output document on disk
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub format: DocumentFormat,
    pub size: u64,
    pub modified: DateTime<Local>,
}

/// Summary for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceStatus {
    pub ssot_exists: bool,
    pub mapping_exists: bool,
    pub templates_count: usize,
    pub output_count: usize,
    pub server_time: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    templates_dir: PathBuf,
    output_dir: PathBuf,
    ssot: SsotStore,
    mapping: MappingStore,
}

impl Workspace {
    pub fn new(config: &SpecSyncConfig) -> Self {
        Self {
            root: config.root.clone(),
            templates_dir: config.templates_dir(),
            output_dir: config.output_dir(),
            ssot: SsotStore::new(config.ssot_path()),
            mapping: MappingStore::new(config.mapping_path()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ssot(&self) -> &SsotStore {
        &self.ssot
    }

    pub fn mapping(&self) -> &MappingStore {
        &self.mapping
    }

    /// Create `templates/` and `output/` (and the data directories)
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.templates_dir.as_path(),
            self.output_dir.as_path(),
            parent_or_root(self.ssot.path()),
            parent_or_root(self.mapping.path()),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn list_templates(&self) -> Result<Vec<DocumentInfo>> {
        list_documents(&self.templates_dir)
    }

    pub fn list_outputs(&self) -> Result<Vec<DocumentInfo>> {
        list_documents(&self.output_dir)
    }

    /// Path of an existing template given its bare file name
    pub fn template_path(&self, name: &str) -> Result<PathBuf> {
        let path = self.templates_dir.join(safe_file_name(name)?);
        if !path.is_file() {
            return Err(SpecSyncError::NotFound {
                kind: FileKind::Template,
                path,
            });
        }
        Ok(path)
    }

    /// Store an uploaded template, replacing any file of the same name
    pub fn save_template(&self, name: &str, bytes: &[u8]) -> Result<DocumentInfo> {
        let name = safe_file_name(name)?;
        let format = DocumentFormat::from_path(Path::new(name))?;
        std::fs::create_dir_all(&self.templates_dir)?;
        let path = self.templates_dir.join(name);
        std::fs::write(&path, bytes)?;
        tracing::info!("Template uploaded: {} ({} bytes)", name, bytes.len());
        document_info(&path, format)
    }

    /// Path of an existing file in `output/`
    pub fn output_file(&self, name: &str) -> Result<PathBuf> {
        let path = self.output_dir.join(safe_file_name(name)?);
        if !path.is_file() {
            return Err(SpecSyncError::NotFound {
                kind: FileKind::Output,
                path,
            });
        }
        Ok(path)
    }

    /// Where the flat marker export is written
    pub fn flat_export_path(&self) -> PathBuf {
        self.output_dir.join(FLAT_EXPORT_FILE)
    }

    pub fn status(&self) -> WorkspaceStatus {
        WorkspaceStatus {
            ssot_exists: self.ssot.exists(),
            mapping_exists: self.mapping.exists(),
            templates_count: self.list_templates().map(|t| t.len()).unwrap_or(0),
            output_count: self.list_outputs().map(|t| t.len()).unwrap_or(0),
            server_time: Local::now(),
        }
    }
}

fn parent_or_root(path: &Path) -> &Path {
    path.parent().unwrap_or(path)
}

/// Accept a bare file name only: no separators, no `..`, not hidden
pub fn safe_file_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains(['/', '\\', '\0'])
        || trimmed.contains("..");
    if bad {
        return Err(SpecSyncError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

fn document_info(path: &Path, format: DocumentFormat) -> Result<DocumentInfo> {
    let meta = std::fs::metadata(path)?;
    let modified = meta.modified().map(DateTime::<Local>::from)?;
    Ok(DocumentInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        format,
        size: meta.len(),
        modified,
    })
}

/// `.docx`/`.xlsx` files in a directory, sorted by name; a missing directory is empty
fn list_documents(dir: &Path) -> Result<Vec<DocumentInfo>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut documents = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        // Office lock files
        if path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("~$"))
            .unwrap_or(false)
        {
            continue;
        }
        if let Ok(format) = DocumentFormat::from_path(&path) {
            documents.push(document_info(&path, format)?);
        }
    }
    documents.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(documents)
}
