//! Spec Sync Gateway - HTTP/WebSocket access to the document engine
//!
//! Exposes the SSOT, the mapping, templates, generation, validation and
//! history over a JSON API, and pushes generation progress to WebSocket
//! subscribers.

#![warn(rust_2018_idioms, missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use events::{Event, EventHub};
pub use gateway::{Gateway, GatewayState};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port for the gateway
pub const DEFAULT_PORT: u16 = 5000;

/// Default host address
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[cfg(test)]
mod tests {
    /// Crate names in the manifest's `[dependencies]` table
    fn runtime_dependencies(manifest: &str) -> Vec<&str> {
        manifest
            .split("\n[")
            .find(|section| section.starts_with("dependencies]"))
            .map(|section| {
                section
                    .lines()
                    .skip(1)
                    .filter_map(|line| line.split_once('=').map(|(name, _)| name.trim()))
                    .filter(|name| !name.starts_with('#'))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_tower_is_test_only() {
        let deps = runtime_dependencies(include_str!("../Cargo.toml"));
        assert!(deps.contains(&"axum"));
        assert!(deps.contains(&"tower-http"));
        assert!(!deps.contains(&"tower"));
    }
}
