//! Gateway configuration

use serde::{Deserialize, Serialize};
use specsync_core::history::DEFAULT_HISTORY_LIMIT;
use specsync_core::SpecSyncConfig;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{GatewayError, Result};
use crate::{DEFAULT_HOST, DEFAULT_PORT};

/// Gateway server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Allow any origin (the web UI is served separately)
    pub cors_permissive: bool,
    /// Budget for one `/api/generate` batch
    pub generate_timeout_secs: u64,
    /// Budget for one `/api/validate` run
    pub validate_timeout_secs: u64,
    pub history_limit: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
    pub project: SpecSyncConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_permissive: true,
            generate_timeout_secs: 300,
            validate_timeout_secs: 60,
            history_limit: DEFAULT_HISTORY_LIMIT,
            event_capacity: 256,
            project: SpecSyncConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_project(mut self, project: SpecSyncConfig) -> Self {
        self.project = project;
        self
    }

    pub fn with_generate_timeout(mut self, secs: u64) -> Self {
        self.generate_timeout_secs = secs;
        self
    }

    pub fn with_validate_timeout(mut self, secs: u64) -> Self {
        self.validate_timeout_secs = secs;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Address to bind
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GatewayError::InvalidConfig(format!("{}:{}: {}", self.host, self.port, e)))
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
