//! Error types for Spec Sync Core
//!
//! Every fallible operation in the core returns [`Result`]. Missing SSOT fields
//! are deliberately *not* errors: lookups return `None` and callers report them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Spec Sync operations
pub type Result<T> = std::result::Result<T, SpecSyncError>;

/// Which kind of project file was involved in a not-found error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// The SSOT data file
    Ssot,
    /// The field mapping file
    Mapping,
    /// A Word or Excel template
    Template,
    /// A generated output document
    Output,
    /// A configuration file
    Config,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Ssot => write!(f, "SSOT file"),
            FileKind::Mapping => write!(f, "mapping file"),
            FileKind::Template => write!(f, "template"),
            FileKind::Output => write!(f, "output document"),
            FileKind::Config => write!(f, "config file"),
        }
    }
}

/// Main error type for Spec Sync operations
#[derive(Error, Debug)]
pub enum SpecSyncError {
    /// A required file does not exist
    #[error("{kind} not found: {}", path.display())]
    NotFound { kind: FileKind, path: PathBuf },

    /// The file extension is not one we can read or write
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// YAML decode/encode errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON decode/encode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decode errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip container errors
    #[error("Package error: {0}")]
    Package(#[from] zip::result::ZipError),

    /// XML parse errors
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The package opened but its content is not what we expect
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A worksheet named in the mapping is absent from the workbook
    #[error("Worksheet not found: {0}")]
    SheetNotFound(String),

    /// A user-supplied file name that is empty or escapes its directory
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    /// Malformed cell reference such as `B` or `3A`
    #[error("Invalid cell reference: {0}")]
    InvalidCellRef(String),

    /// The requested backend cannot run on this host
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The external automation command failed
    #[error("Automation failed: {0}")]
    Automation(String),

    /// An external invocation exceeded its time budget
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// A blocking worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<SpecSyncError>,
    },
}

impl From<quick_xml::events::attributes::AttrError> for SpecSyncError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        SpecSyncError::Xml(quick_xml::Error::InvalidAttr(e))
    }
}

impl SpecSyncError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True if this error (or the error it wraps) is a missing-file error
    pub fn is_not_found(&self) -> bool {
        match self {
            SpecSyncError::NotFound { .. } => true,
            SpecSyncError::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}
