//! Error types for the eetools expression core.

use thiserror::Error;

/// Main error type for expression building and evaluation.
///
/// Local precondition failures (unknown option strings) get typed variants
/// and are raised before any graph is built. Everything the client cannot
/// validate surfaces at fetch time as [`Error::Engine`] with the engine's
/// own message, unmodified.
#[derive(Error, Debug)]
pub enum Error {
    #[error("engine error: {0}")]
    Engine(String),

    #[error("unknown reducer: {0:?}")]
    UnknownReducer(String),

    #[error("unknown time unit: {0:?}")]
    UnknownTimeUnit(String),

    #[error("unknown band filter mode: {0:?} (expected \"ALL\" or \"ANY\")")]
    UnknownBandFilter(String),

    #[error("unknown id property type: {0:?}")]
    UnknownIdType(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for eetools operations.
pub type Result<T> = std::result::Result<T, Error>;
