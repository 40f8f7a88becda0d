//! Blocking wrappers around the async clients.
//!
//! Each wrapper owns a single-threaded Tokio runtime so synchronous
//! callers never manage async plumbing themselves.

use eetools_core::engine::Engine;
use eetools_core::{Expr, Value};

use crate::catalog::{CatalogClient, CatalogClientOptions, CatalogEntry};
use crate::engine::{RestEngine, RestEngineOptions};
use crate::error::{CloudError, Result};
use crate::users::Credentials;

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CloudError::Network(e.to_string()))
}

/// Blocking wrapper around [`RestEngine`].
pub struct RestEngineBlocking {
    rt: tokio::runtime::Runtime,
    inner: RestEngine,
}

impl RestEngineBlocking {
    pub fn new(credentials: Credentials, options: RestEngineOptions) -> Result<Self> {
        let rt = runtime()?;
        let inner = RestEngine::new(credentials, options)?;
        Ok(Self { rt, inner })
    }

    /// Evaluate the graph remotely (blocking).
    pub fn evaluate(&self, expr: &Expr) -> Result<Value> {
        self.rt.block_on(self.inner.evaluate(expr))
    }
}

impl Engine for RestEngineBlocking {
    fn evaluate(&self, expr: &Expr) -> eetools_core::Result<Value> {
        RestEngineBlocking::evaluate(self, expr)
            .map_err(|e| eetools_core::Error::Engine(e.to_string()))
    }
}

/// Blocking wrapper around [`CatalogClient`].
pub struct CatalogClientBlocking {
    rt: tokio::runtime::Runtime,
    inner: CatalogClient,
}

impl CatalogClientBlocking {
    pub fn new(options: CatalogClientOptions) -> Result<Self> {
        let rt = runtime()?;
        let inner = CatalogClient::new(options)?;
        Ok(Self { rt, inner })
    }

    /// Resolve a catalog entry (blocking).
    pub fn collection(&self, asset_id: &str) -> Result<CatalogEntry> {
        self.rt.block_on(self.inner.collection(asset_id))
    }

    /// The `sci:doi` field of the resolved collection (blocking).
    pub fn doi(&self, asset_id: &str) -> Result<String> {
        self.rt.block_on(self.inner.doi(asset_id))
    }

    /// The `sci:citation` field of the resolved collection (blocking).
    pub fn citation(&self, asset_id: &str) -> Result<String> {
        self.rt.block_on(self.inner.citation(asset_id))
    }
}
