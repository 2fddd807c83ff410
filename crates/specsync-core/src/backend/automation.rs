//! Automation backend: drives an external office driver
//!
//! The driver is any executable that accepts a job file path as its last
//! argument. The job is a JSON document:
//!
//! ```json
//! { "action": "fill", "format": "word", "mode": "markers", "template": "...", "output": "...",
//!   "sheet": null, "fields": [{ "key": "product.name", "marker": "ProductName", "value": "Widget" }] }
//! ```
//!
//! `action` is one of `fill`, `read_text` or `read_cells`. With `"mode": "tokens"`
//! a fill replaces each `{key}` span in one pass. Paths are always absolute
//! since the driver runs in a scratch directory. The driver writes its
//! answer to `result.json` next to the job file: `{"unmatched": [...]}` (plus an
//! optional `"replaced"` map) for fills, `{"text": "..."}` and
//! `{"cells": {"B3": "x"}}` for reads. A non-zero exit status is a failure and
//! its stderr becomes the error message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{BackendKind, DocumentBackend, DocumentFormat, FieldValue, FillJob, FillMode, FillReport};
use crate::error::{Result, SpecSyncError};

const JOB_FILE: &str = "job.json";
const RESULT_FILE: &str = "result.json";

/// How to reach the external driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    /// Executable; the backend is unavailable while this is unset
    pub command: Option<String>,
    /// Arguments placed before the job file path
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: 120,
        }
    }
}

impl AutomationSettings {
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum AutomationJob<'a> {
    Fill {
        format: DocumentFormat,
        mode: FillMode,
        template: &'a Path,
        output: &'a Path,
        sheet: Option<&'a str>,
        fields: &'a [FieldValue],
    },
    ReadText {
        format: DocumentFormat,
        document: &'a Path,
    },
    ReadCells {
        document: &'a Path,
        sheet: &'a str,
        cells: &'a [String],
    },
}

#[derive(Debug, Default, Deserialize)]
struct TextResult {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct CellsResult {
    #[serde(default)]
    cells: BTreeMap<String, Option<Value>>,
}

/// Backend that shells out to the configured driver
#[derive(Debug, Clone)]
pub struct AutomationBackend {
    settings: AutomationSettings,
}

impl AutomationBackend {
    pub fn new(settings: AutomationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AutomationSettings {
        &self.settings
    }

    fn command(&self) -> Result<PathBuf> {
        let command = self.settings.command.as_deref().ok_or_else(|| {
            SpecSyncError::BackendUnavailable("no automation command configured".to_string())
        })?;
        resolve_command(command).ok_or_else(|| {
            SpecSyncError::BackendUnavailable(format!("automation command not found: {}", command))
        })
    }

    /// Run one job and return the parsed result file, if the driver wrote one
    async fn run(&self, job: &AutomationJob<'_>) -> Result<Option<Value>> {
        let command = self.command()?;
        let workdir = tempfile::Builder::new()
            .prefix("specsync-automation-")
            .tempdir()?;
        let job_path = workdir.path().join(JOB_FILE);
        std::fs::write(&job_path, serde_json::to_vec_pretty(job)?)?;

        tracing::debug!("Running {} {:?} {}", command.display(), self.settings.args, job_path.display());
        let child = Command::new(&command)
            .args(&self.settings.args)
            .arg(&job_path)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // On timeout the child is dropped with the future and killed.
        let budget = Duration::from_secs(self.settings.timeout_secs);
        let output = tokio::time::timeout(budget, child.wait_with_output())
            .await
            .map_err(|_| SpecSyncError::Timeout(self.settings.timeout_secs))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let message = if !stderr.is_empty() { stderr } else { stdout };
            return Err(SpecSyncError::Automation(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                message
            )));
        }

        let result_path = workdir.path().join(RESULT_FILE);
        if !result_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&result_path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[async_trait]
impl DocumentBackend for AutomationBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Automation
    }

    fn is_available(&self) -> bool {
        self.command().is_ok()
    }

    async fn fill(&self, job: &FillJob) -> Result<FillReport> {
        let template = absolute(&job.template)?;
        let output = absolute(&job.output)?;
        let result = self
            .run(&AutomationJob::Fill {
                format: job.format,
                mode: job.mode,
                template: &template,
                output: &output,
                sheet: job.sheet.as_deref(),
                fields: &job.fields,
            })
            .await?;
        if !job.output.exists() {
            return Err(SpecSyncError::Automation(format!(
                "driver finished without writing {}",
                job.output.display()
            )));
        }
        let report: FillReport = match result {
            Some(value) => serde_json::from_value(value)?,
            None => FillReport::default(),
        };
        for marker in &report.unmatched {
            tracing::warn!("Marker {} not found in {}", marker, job.template.display());
        }
        Ok(report)
    }

    async fn read_text(&self, path: &Path, format: DocumentFormat) -> Result<String> {
        let document = absolute(path)?;
        let result = self
            .run(&AutomationJob::ReadText {
                format,
                document: &document,
            })
            .await?;
        let parsed: TextResult = match result {
            Some(value) => serde_json::from_value(value)?,
            None => return Err(SpecSyncError::Automation("driver returned no text".to_string())),
        };
        Ok(parsed.text)
    }

    async fn read_cells(
        &self,
        path: &Path,
        sheet: &str,
        refs: &[String],
    ) -> Result<BTreeMap<String, Option<String>>> {
        let document = absolute(path)?;
        let result = self
            .run(&AutomationJob::ReadCells {
                document: &document,
                sheet,
                cells: refs,
            })
            .await?;
        let parsed: CellsResult = match result {
            Some(value) => serde_json::from_value(value)?,
            None => return Err(SpecSyncError::Automation("driver returned no cells".to_string())),
        };
        Ok(refs
            .iter()
            .map(|r| {
                let value = parsed.cells.get(r).cloned().flatten().and_then(|v| match v {
                    Value::Null => None,
                    Value::String(s) if s.is_empty() => None,
                    other => Some(crate::ssot::render(&other)),
                });
                (r.clone(), value)
            })
            .collect())
    }
}

/// The driver runs inside its own scratch directory, so job paths are anchored
/// to our working directory before they are written out
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Find an executable by path or on `PATH`
fn resolve_command(command: &str) -> Option<PathBuf> {
    let direct = Path::new(command);
    if direct.components().count() > 1 || direct.is_absolute() {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}
