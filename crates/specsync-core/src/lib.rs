//! Spec Sync Core - SSOT-driven document generation
//!
//! One YAML/JSON file (the SSOT) holds product facts. Word and Excel templates
//! are filled from it, and generated documents can be checked back against it.
//!
//! # Architecture
//!
//! 1. **Resolver** (`ssot`): dotted-key lookup into the SSOT value tree
//! 2. **Mapping** (`mapping`): template → `{ssot key: marker}` configuration
//! 3. **Tokens** (`token`): `{dotted.key}` scanning and substitution
//! 4. **Codecs** (`ooxml`): in-process .docx / .xlsx reading and editing
//! 5. **Backends** (`backend`): native codecs or an external office driver
//! 6. **Engine** (`engine`) and **Validator** (`validator`)
//!
//! # Quick Start
//!
//! ```no_run
//! use specsync_core::{FillEngine, SpecSyncConfig};
//!
//! # async fn run() -> specsync_core::Result<()> {
//! let config = SpecSyncConfig::new().with_root("/srv/specs");
//! let report = FillEngine::new(&config).generate_all().await?;
//! println!("{} document(s) generated", report.succeeded());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

pub mod backend;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod history;
pub mod mapping;
pub mod ooxml;
pub mod ssot;
pub mod token;
pub mod validator;
pub mod workspace;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use backend::{
    plan, AutomationSettings, BackendKind, Backends, DocumentBackend, DocumentFormat,
    EnginePreference, FillMode,
};
pub use config::SpecSyncConfig;
pub use engine::{FillEngine, GenerationReport, OutcomeStatus, TemplateOutcome};
pub use error::{FileKind, Result, ResultExt, SpecSyncError};
pub use history::{HistoryLog, HistoryRecord};
pub use mapping::{MappingConfig, MappingStore, Marker, MarkerTarget, TemplateMapping};
pub use ssot::SsotStore;
pub use validator::{ConsistencyValidator, Discrepancy, ValidationReport};
pub use workspace::{DocumentInfo, Workspace, WorkspaceStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
