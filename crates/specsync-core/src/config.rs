//! Project configuration
//!
//! Everything the library needs is passed in through [`SpecSyncConfig`]. The
//! environment is only consulted by the binaries, through [`SpecSyncConfig::apply_env`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::backend::{AutomationSettings, EnginePreference};
use crate::error::{FileKind, Result, SpecSyncError};

pub const SSOT_DIR: &str = "ssot";
pub const MAPPING_DIR: &str = "mapping";
pub const TEMPLATES_DIR: &str = "templates";
pub const OUTPUT_DIR: &str = "output";

/// Environment variable naming the project root
pub const ENV_ROOT: &str = "SPEC_SYNC_ROOT";
/// Environment variable naming the engine preference
pub const ENV_ENGINE: &str = "SPEC_SYNC_ENGINE";
/// Environment variable naming the automation driver
pub const ENV_AUTOMATION_CMD: &str = "SPEC_SYNC_AUTOMATION_CMD";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecSyncConfig {
    /// Project root holding `ssot/`, `mapping/`, `templates/` and `output/`
    pub root: PathBuf,

    /// File name inside `ssot/`
    pub ssot_file: String,

    /// File name inside `mapping/`
    pub mapping_file: String,

    /// Default backend preference
    pub engine: EnginePreference,

    /// External automation driver
    pub automation: AutomationSettings,
}

impl Default for SpecSyncConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            ssot_file: "master.yaml".to_string(),
            mapping_file: "customer_mapping.yaml".to_string(),
            engine: EnginePreference::Auto,
            automation: AutomationSettings::default(),
        }
    }
}

impl SpecSyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_engine(mut self, engine: EnginePreference) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_ssot_file(mut self, name: impl Into<String>) -> Self {
        self.ssot_file = name.into();
        self
    }

    pub fn with_mapping_file(mut self, name: impl Into<String>) -> Self {
        self.mapping_file = name.into();
        self
    }

    pub fn with_automation(mut self, automation: AutomationSettings) -> Self {
        self.automation = automation;
        self
    }

    pub fn ssot_path(&self) -> PathBuf {
        self.root.join(SSOT_DIR).join(&self.ssot_file)
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.root.join(MAPPING_DIR).join(&self.mapping_file)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(TEMPLATES_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SpecSyncError::NotFound {
                kind: FileKind::Config,
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay values from an environment lookup.
    ///
    /// Binaries pass `|k| std::env::var(k).ok()`; an unparseable engine is an error.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_ROOT).filter(|v| !v.is_empty()) {
            self.root = PathBuf::from(root);
        }
        if let Some(engine) = lookup(ENV_ENGINE).filter(|v| !v.is_empty()) {
            self.engine = engine.parse()?;
        }
        if let Some(command) = lookup(ENV_AUTOMATION_CMD).filter(|v| !v.is_empty()) {
            self.automation.command = Some(command);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_and_paths() {
        let config = SpecSyncConfig::new().with_root("/srv/project");
        assert_eq!(config.ssot_path(), PathBuf::from("/srv/project/ssot/master.yaml"));
        assert_eq!(
            config.mapping_path(),
            PathBuf::from("/srv/project/mapping/customer_mapping.yaml")
        );
        assert_eq!(config.output_dir(), PathBuf::from("/srv/project/output"));
        assert_eq!(config.engine, EnginePreference::Auto);
        assert!(config.automation.command.is_none());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("specsync.toml");
        std::fs::write(
            &path,
            r#"
root = "/data/specs"
engine = "office"

[automation]
command = "office-driver"
timeout_secs = 30
"#,
        )
        .unwrap();

        let config = SpecSyncConfig::from_file(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("/data/specs"));
        assert_eq!(config.engine, EnginePreference::Automation);
        assert_eq!(config.ssot_file, "master.yaml");
        assert_eq!(config.automation.command.as_deref(), Some("office-driver"));
        assert_eq!(config.automation.timeout_secs, 30);

        assert!(SpecSyncConfig::from_file(&dir.path().join("none.toml"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_apply_env() {
        let env: HashMap<&str, &str> = [
            (ENV_ROOT, "/env/root"),
            (ENV_ENGINE, "pure"),
            (ENV_AUTOMATION_CMD, ""),
        ]
        .into_iter()
        .collect();
        let config = SpecSyncConfig::new()
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.root, PathBuf::from("/env/root"));
        assert_eq!(config.engine, EnginePreference::Native);
        assert!(config.automation.command.is_none());

        let bad = SpecSyncConfig::new().apply_env(|k| (k == ENV_ENGINE).then(|| "word".to_string()));
        assert!(bad.is_err());
    }
}
