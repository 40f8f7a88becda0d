//! # eetools Core
//!
//! Lazy expression-graph model for a remote geospatial computation service.
//!
//! This crate provides:
//! - `Value`: the materialized result model (what a terminal fetch returns)
//! - `Expr` / `Op`: immutable, cheaply-clonable expression nodes over a
//!   closed set of remote primitives
//! - Typed handles (`Image`, `ImageCollection`, `List`, ...) exposing the
//!   primitive surface as chainable methods
//! - The `Engine` evaluation seam, with an in-memory reference engine used
//!   by the workspace test suites
//!
//! Nothing in this crate performs network I/O; graphs are only built and
//! chained here. Evaluation is delegated to an [`Engine`] implementation.

pub mod engine;
pub mod error;
pub mod expr;
pub mod handle;
pub mod reducer;
pub mod types;
pub mod value;

pub use engine::Engine;
pub use error::{Error, Result};
pub use expr::{Expr, Op};
pub use handle::{
    Array, Dictionary, Feature, FeatureCollection, Filter, Geometry, Handle, Image,
    ImageCollection, IntoExpr, List, Number, ReduceRegionOpts, Str,
};
pub use reducer::Reducer;
pub use types::{BandFilter, IdType, TimeUnit};
pub use value::Value;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::Engine;
    pub use crate::error::{Error, Result};
    pub use crate::handle::{
        Array, Dictionary, Feature, FeatureCollection, Filter, Geometry, Handle, Image,
        ImageCollection, IntoExpr, List, Number, ReduceRegionOpts, Str,
    };
    pub use crate::reducer::Reducer;
    pub use crate::types::{BandFilter, IdType, TimeUnit};
    pub use crate::value::Value;
}

/// The default image timestamp property.
pub const TIME_START: &str = "system:time_start";

/// End-of-bucket timestamp property set by interval reductions.
pub const TIME_END: &str = "system:time_end";

/// Default date pattern burned into synthetic band names.
///
/// Hyphenated time so the result is a valid band name. Round-tripping a
/// synthetic `<key>_<band>` name relies on stripping a known key prefix,
/// never on splitting at the separator.
pub const DATE_PATTERN: &str = "%Y-%m-%dT%H-%M-%S";
