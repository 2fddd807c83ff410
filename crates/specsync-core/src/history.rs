//! Generation history, newest first

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const HISTORY_FILE: &str = "generation_history.json";
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Local>,
    pub engine: String,
    pub templates: Vec<String>,
    pub succeeded: usize,
    pub failed: usize,
    /// Per-template results as reported to the client
    #[serde(default)]
    pub results: serde_json::Value,
}

/// JSON history file capped at `limit` records
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    limit: usize,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
        }
    }

    /// History kept in `output/`
    pub fn in_dir(output_dir: &Path, limit: usize) -> Self {
        Self::new(output_dir.join(HISTORY_FILE), limit)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, newest first. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Prepend a record and drop the oldest beyond the limit
    pub fn append(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.load()?;
        records.insert(0, record);
        records.truncate(self.limit);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&records)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> HistoryRecord {
        HistoryRecord {
            timestamp: Local::now(),
            engine: "auto".to_string(),
            templates: vec![format!("t{}.docx", n)],
            succeeded: n,
            failed: 0,
            results: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_newest_first_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::in_dir(dir.path(), 3);
        assert!(log.load().unwrap().is_empty());

        for n in 0..5 {
            log.append(record(n)).unwrap();
        }
        let records = log.load().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].succeeded, 4);
        assert_eq!(records[2].succeeded, 2);
    }
}
