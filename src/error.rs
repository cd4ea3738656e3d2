use thiserror::Error;

use crate::schema::SchemaError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Browser launch failed: {0}")]
    LaunchError(String),

    #[error("Navigation failed: {0}")]
    NavigationError(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("JavaScript error: {0}")]
    JsError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("Field '{field}' failed: {source}")]
    FieldFailed {
        field: String,
        #[source]
        source: Box<Error>,
    },

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
