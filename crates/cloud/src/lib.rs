//! # eetools Cloud
//!
//! Everything that leaves the process: the REST evaluation engine, the
//! on-disk credential manager and the public data catalog lookup.
//!
//! The async clients are the primitives; the [`blocking`] module wraps
//! them with an internal single-threaded Tokio runtime for synchronous
//! callers. [`blocking::RestEngineBlocking`] implements
//! [`eetools_core::engine::Engine`], so expression graphs built against
//! the in-memory engine evaluate remotely without any change.

pub mod blocking;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod users;

pub use catalog::{CatalogClient, CatalogClientOptions, CatalogEntry};
pub use engine::{RestEngine, RestEngineOptions};
pub use error::{CloudError, Result};
pub use users::{Authenticator, Credentials, UserManager, DEFAULT_USER};
