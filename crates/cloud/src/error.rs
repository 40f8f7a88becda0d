//! Error types for the cloud layer.

use thiserror::Error;

/// Errors produced by remote evaluation, credential management and catalog
/// lookup.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("{kind} {name:?} not found in the catalog")]
    NotFound { kind: &'static str, name: String },

    #[error("user {0:?} is not registered; create its credentials first")]
    UserNotRegistered(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("core error: {0}")]
    Core(#[from] eetools_core::Error),
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
