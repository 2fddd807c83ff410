//! Gateway error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use specsync_core::SpecSyncError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Operation timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Core(#[from] SpecSyncError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Core(e) => core_status(e),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn core_status(error: &SpecSyncError) -> StatusCode {
    match error {
        SpecSyncError::WithContext { source, .. } => core_status(source),
        SpecSyncError::NotFound { .. } => StatusCode::NOT_FOUND,
        // Request bodies are parsed into `BadRequest` before reaching core, so
        // a core parse error means a broken file on disk
        SpecSyncError::InvalidName(_) | SpecSyncError::UnsupportedFormat(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }
        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specsync_core::ssot::DataFormat;
    use specsync_core::FileKind;
    use std::path::PathBuf;

    #[test]
    fn test_core_errors_map_to_status() {
        let missing = GatewayError::from(
            SpecSyncError::NotFound {
                kind: FileKind::Ssot,
                path: PathBuf::from("ssot/master.yaml"),
            }
            .context("Failed to load SSOT"),
        );
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let bad_name = GatewayError::from(SpecSyncError::InvalidName("../x".into()));
        assert_eq!(bad_name.status_code(), StatusCode::BAD_REQUEST);

        let automation = GatewayError::from(SpecSyncError::Automation("exit code 2".into()));
        assert_eq!(automation.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_stored_file_parse_errors_are_server_errors() {
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let broken_json = GatewayError::from(
            SpecSyncError::Json(json).context("Failed to load SSOT"),
        );
        assert_eq!(broken_json.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let yaml = DataFormat::Yaml.parse("a: [").unwrap_err();
        assert!(matches!(yaml, SpecSyncError::Yaml(_)));
        let broken_yaml = GatewayError::from(yaml);
        assert_eq!(broken_yaml.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let bad_body = GatewayError::BadRequest("invalid request: EOF".into());
        assert_eq!(bad_body.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_timeout_is_server_error() {
        let err = GatewayError::Timeout(60);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("60s"));
    }
}
