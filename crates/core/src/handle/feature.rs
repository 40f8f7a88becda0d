//! Geometry, feature and feature-collection handles.

use crate::expr::{Expr, Op};
use crate::handle::{handle_type, Handle, IntoExpr, List, Number};

handle_type! {
    /// A lazy region of the raster plane.
    Geometry
}

impl Geometry {
    /// Axis-aligned rectangle, corners `(x0, y0)` and `(x1, y1)` exclusive.
    pub fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Geometry(Expr::call(
            Op::GeometryRectangle,
            vec![
                Expr::literal(x0),
                Expr::literal(y0),
                Expr::literal(x1),
                Expr::literal(y1),
            ],
        ))
    }

    /// The unbounded region.
    pub fn everything() -> Geometry {
        Geometry(Expr::call(Op::GeometryEverything, vec![]))
    }
}

handle_type! {
    /// A geometry with a property bag.
    Feature
}

impl Feature {
    /// `properties` is a dictionary-shaped value.
    pub fn new(geometry: &Geometry, properties: impl IntoExpr) -> Feature {
        Feature(Expr::call(
            Op::FeatureCreate,
            vec![geometry.expr().clone(), properties.into_expr()],
        ))
    }

    /// Property bag restricted to `keys`.
    pub fn to_dictionary(&self, keys: &List) -> super::Dictionary {
        super::Dictionary::from_expr(Expr::call(
            Op::FeatureToDictionary,
            vec![self.0.clone(), keys.expr().clone()],
        ))
    }
}

handle_type! {
    /// An ordered collection of features.
    FeatureCollection
}

impl FeatureCollection {
    pub fn of(features: Vec<Feature>) -> FeatureCollection {
        FeatureCollection(Expr::call(
            Op::FeatureCollectionCreate,
            features.into_iter().map(Handle::into_expr).collect(),
        ))
    }

    pub fn to_list(&self) -> List {
        List::from_expr(Expr::call(Op::CollectionToList, vec![self.0.clone()]))
    }

    pub fn size(&self) -> Number {
        Number::from_expr(Expr::call(Op::CollectionSize, vec![self.0.clone()]))
    }

    /// Values of `property` across the collection, in collection order.
    pub fn aggregate_array(&self, property: &str) -> List {
        List::from_expr(Expr::call(
            Op::AggregateArray,
            vec![self.0.clone(), Expr::literal(property)],
        ))
    }
}
