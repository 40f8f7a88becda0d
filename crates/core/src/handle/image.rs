//! The multi-band raster handle.

use std::collections::BTreeMap;

use crate::expr::{Expr, Op};
use crate::handle::{handle_type, Dictionary, FeatureCollection, Geometry, List};
use crate::handle::{Handle, IntoExpr};
use crate::reducer::Reducer;
use crate::value::Value;

/// Tuning knobs of a region reduction, serialized as a literal parameter
/// dictionary. Defaults mean "let the engine decide".
#[derive(Debug, Clone, Default)]
pub struct ReduceRegionOpts {
    pub scale: Option<f64>,
    pub crs: Option<String>,
    pub crs_transform: Option<Vec<f64>>,
    pub best_effort: bool,
    pub max_pixels: Option<u64>,
    pub tile_scale: Option<f64>,
}

impl ReduceRegionOpts {
    pub fn with_scale(scale: f64) -> Self {
        ReduceRegionOpts {
            scale: Some(scale),
            ..ReduceRegionOpts::default()
        }
    }

    fn to_value(&self) -> Value {
        let mut params = BTreeMap::new();
        if let Some(scale) = self.scale {
            params.insert("scale".to_string(), Value::Float(scale));
        }
        if let Some(crs) = &self.crs {
            params.insert("crs".to_string(), Value::Str(crs.clone()));
        }
        if let Some(t) = &self.crs_transform {
            params.insert(
                "crsTransform".to_string(),
                Value::List(t.iter().map(|v| Value::Float(*v)).collect()),
            );
        }
        if self.best_effort {
            params.insert("bestEffort".to_string(), Value::Bool(true));
        }
        if let Some(max) = self.max_pixels {
            params.insert("maxPixels".to_string(), Value::Int(max as i64));
        }
        if let Some(tile) = self.tile_scale {
            params.insert("tileScale".to_string(), Value::Float(tile));
        }
        Value::Dict(params)
    }
}

handle_type! {
    /// A lazy multi-band raster. Bands are identified by name, unique
    /// within an image by convention only.
    Image
}

impl Image {
    /// Single-band constant image, band named `"constant"`.
    pub fn constant(value: impl IntoExpr) -> Image {
        Image(Expr::call(Op::ImageConstant, vec![value.into_expr()]))
    }

    fn unary(&self, op: Op) -> Image {
        Image(Expr::call(op, vec![self.0.clone()]))
    }

    fn binary(&self, op: Op, other: impl IntoExpr) -> Image {
        Image(Expr::call(op, vec![self.0.clone(), other.into_expr()]))
    }

    // ── band bookkeeping ────────────────────────────────────────────

    /// Subset of bands, by a (possibly computed) list of names.
    pub fn select(&self, bands: &List) -> Image {
        Image(Expr::call(Op::ImageSelect, vec![self.0.clone(), bands.expr().clone()]))
    }

    /// Subset of bands by client-known names.
    pub fn select_names(&self, bands: &[&str]) -> Image {
        self.select(&List::strings(bands))
    }

    /// Rename every band; the name list length must match the band count.
    pub fn rename(&self, names: &List) -> Image {
        Image(Expr::call(Op::ImageRename, vec![self.0.clone(), names.expr().clone()]))
    }

    pub fn rename_names(&self, names: &[&str]) -> Image {
        self.rename(&List::strings(names))
    }

    /// Append the bands of `other`; with `overwrite`, same-named bands of
    /// `other` replace the existing bands in place.
    pub fn add_bands(&self, other: &Image, overwrite: bool) -> Image {
        Image(Expr::call(
            Op::ImageAddBands,
            vec![self.0.clone(), other.0.clone(), Expr::literal(overwrite)],
        ))
    }

    pub fn band_names(&self) -> List {
        List::from_expr(Expr::call(Op::ImageBandNames, vec![self.0.clone()]))
    }

    // ── masking ─────────────────────────────────────────────────────

    /// Per-band validity as a 0/1 image with the same band names.
    pub fn mask(&self) -> Image {
        self.unary(Op::ImageMask)
    }

    /// Mask out pixels where `mask` is zero or itself masked.
    pub fn update_mask(&self, mask: &Image) -> Image {
        self.binary(Op::ImageUpdateMask, mask)
    }

    // ── algebra (bands pair positionally, names from self; the output
    //    carries no metadata) ───────────────────────────────────────────

    pub fn add(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::Add, other)
    }

    pub fn subtract(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::Subtract, other)
    }

    pub fn multiply(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::Multiply, other)
    }

    pub fn divide(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::Divide, other)
    }

    pub fn pow(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::Pow, other)
    }

    pub fn sqrt(&self) -> Image {
        self.unary(Op::Sqrt)
    }

    pub fn gt(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::Gt, other)
    }

    pub fn lt(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::Lt, other)
    }

    pub fn eq(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::Eq, other)
    }

    pub fn or(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::Or, other)
    }

    pub fn and(&self, other: impl IntoExpr) -> Image {
        self.binary(Op::And, other)
    }

    /// Logical negation of a 0/1 image.
    pub fn not(&self) -> Image {
        self.unary(Op::Not)
    }

    // ── reductions ──────────────────────────────────────────────────

    /// Reduce across bands into a single band named after the reducer.
    pub fn reduce(&self, reducer: Reducer) -> Image {
        Image(Expr::call(
            Op::ImageReduce,
            vec![self.0.clone(), Expr::literal(reducer.name())],
        ))
    }

    /// Aggregate the unmasked pixels inside `geometry`, one entry per band.
    pub fn reduce_region(
        &self,
        reducer: Reducer,
        geometry: &Geometry,
        opts: &ReduceRegionOpts,
    ) -> Dictionary {
        Dictionary::from_expr(Expr::call(
            Op::ReduceRegion,
            vec![
                self.0.clone(),
                Expr::literal(reducer.name()),
                geometry.expr().clone(),
                Expr::literal(opts.to_value()),
            ],
        ))
    }

    /// Aggregate per feature; results are merged into each feature's
    /// property bag, keyed by band name.
    pub fn reduce_regions(
        &self,
        regions: &FeatureCollection,
        reducer: Reducer,
        scale: f64,
    ) -> FeatureCollection {
        FeatureCollection::from_expr(Expr::call(
            Op::ReduceRegions,
            vec![
                self.0.clone(),
                regions.expr().clone(),
                Expr::literal(reducer.name()),
                Expr::literal(scale),
            ],
        ))
    }

    pub fn clip(&self, geometry: &Geometry) -> Image {
        Image(Expr::call(Op::ImageClip, vec![self.0.clone(), geometry.expr().clone()]))
    }

    // ── properties ──────────────────────────────────────────────────

    /// Property value; untyped, rewrap into the handle the caller expects.
    pub fn property(&self, name: &str) -> Expr {
        Expr::call(Op::GetProperty, vec![self.0.clone(), Expr::literal(name)])
    }

    /// Copy with one property set; the value may itself be a lazy element.
    pub fn set(&self, name: &str, value: impl IntoExpr) -> Image {
        Image(Expr::call(
            Op::SetProperty,
            vec![self.0.clone(), Expr::literal(name), value.into_expr()],
        ))
    }

    /// Copy the source's properties onto this image, minus `exclude`;
    /// source values win on conflicts.
    pub fn copy_properties(&self, source: impl IntoExpr, exclude: &List) -> Image {
        Image(Expr::call(
            Op::CopyProperties,
            vec![self.0.clone(), source.into_expr(), exclude.expr().clone()],
        ))
    }

    pub fn property_names(&self) -> List {
        List::from_expr(Expr::call(Op::PropertyNames, vec![self.0.clone()]))
    }
}
