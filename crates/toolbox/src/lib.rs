//! # eetools Toolbox
//!
//! Convenience extensions over the core handles: the image-collection
//! reshaping pipeline, array grid constructors and dictionary builders.
//!
//! Everything here composes core primitives into larger lazy graphs; no
//! operation in this crate evaluates anything. Extension traits keep the
//! added surface separate from the primitive surface of the core handles:
//!
//! ```no_run
//! use eetools_core::{ImageCollection, Reducer, TimeUnit};
//! use eetools_toolbox::ImageCollectionExt;
//!
//! let monthly = ImageCollection::load("sensor/sr")
//!     .reduce_interval(Reducer::Median, TimeUnit::Month, 1);
//! ```

pub mod array;
pub mod collection;
pub mod dictionary;

pub use array::ArrayExt;
pub use collection::{ImageCollectionExt, KeyedRegionOpts};
pub use dictionary::DictionaryExt;
