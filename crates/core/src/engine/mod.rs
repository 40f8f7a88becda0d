//! The evaluation seam.
//!
//! Building expressions never computes anything; an [`Engine`] is the one
//! place a graph becomes data. The in-memory engine here defines the
//! observable semantics of every [`crate::Op`] and backs the workspace test
//! suites; the REST engine in the cloud crate ships the same graphs to the
//! remote service.

mod memory;

pub use memory::{BandData, CollectionData, ImageData, MemoryEngine};

use crate::error::Result;
use crate::expr::Expr;
use crate::value::Value;

/// Evaluates expression graphs into materialized values.
pub trait Engine {
    /// Evaluate the graph and materialize the result. This is the single
    /// blocking point of the API; every deferred validation error of the
    /// graph surfaces here.
    fn evaluate(&self, expr: &Expr) -> Result<Value>;
}
