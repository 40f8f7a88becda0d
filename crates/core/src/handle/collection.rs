//! The image-collection handle.

use crate::expr::{Expr, Op};
use crate::handle::{handle_type, lambda1, lambda2, Filter, Geometry, Image, List, Number};
use crate::handle::{Handle, IntoExpr};
use crate::reducer::Reducer;

handle_type! {
    /// A lazy ordered sequence of images, usually time-ordered. Size and
    /// contents are unknown client-side until a terminal fetch.
    ImageCollection
}

impl ImageCollection {
    /// Reference a stored collection by asset id.
    pub fn load(asset_id: &str) -> ImageCollection {
        ImageCollection(Expr::call(Op::LoadCollection, vec![Expr::literal(asset_id)]))
    }

    pub fn from_images(images: Vec<Image>) -> ImageCollection {
        let list = List::of(images.into_iter().map(Handle::into_expr).collect());
        ImageCollection::from_list(&list)
    }

    /// Wrap a (possibly computed) list of images.
    pub fn from_list(images: &List) -> ImageCollection {
        ImageCollection(Expr::call(Op::CollectionFromImages, vec![images.expr().clone()]))
    }

    pub fn merge(&self, other: &ImageCollection) -> ImageCollection {
        ImageCollection(Expr::call(Op::CollectionMerge, vec![self.0.clone(), other.0.clone()]))
    }

    // ── per-image transforms ────────────────────────────────────────

    /// Apply a server-side function to every image.
    pub fn map(&self, f: impl FnOnce(Image) -> Image) -> ImageCollection {
        ImageCollection(Expr::call(Op::CollectionMap, vec![self.0.clone(), lambda1(f)]))
    }

    /// Fold over the collection in order; `f` is `(image, accumulator)`.
    pub fn iterate(&self, f: impl FnOnce(Image, Image) -> Image, first: impl IntoExpr) -> Image {
        Image::from_expr(Expr::call(
            Op::CollectionIterate,
            vec![self.0.clone(), lambda2(f), first.into_expr()],
        ))
    }

    /// Per-image band subset; image properties are kept.
    pub fn select(&self, bands: &List) -> ImageCollection {
        ImageCollection(Expr::call(Op::CollectionSelect, vec![self.0.clone(), bands.expr().clone()]))
    }

    pub fn select_names(&self, bands: &[&str]) -> ImageCollection {
        self.select(&List::strings(bands))
    }

    // ── filtering and ordering ──────────────────────────────────────

    /// Ascending sort on a property value.
    pub fn sort(&self, property: &str) -> ImageCollection {
        ImageCollection(Expr::call(Op::CollectionSort, vec![self.0.clone(), Expr::literal(property)]))
    }

    pub fn filter(&self, filter: &Filter) -> ImageCollection {
        ImageCollection(Expr::call(Op::CollectionFilter, vec![self.0.clone(), filter.expr().clone()]))
    }

    /// Keep images whose time property falls in `[start, end)` epoch millis.
    pub fn filter_date(&self, start: impl IntoExpr, end: impl IntoExpr) -> ImageCollection {
        ImageCollection(Expr::call(
            Op::CollectionFilterDate,
            vec![self.0.clone(), start.into_expr(), end.into_expr()],
        ))
    }

    pub fn filter_bounds(&self, geometry: &Geometry) -> ImageCollection {
        ImageCollection(Expr::call(
            Op::CollectionFilterBounds,
            vec![self.0.clone(), geometry.expr().clone()],
        ))
    }

    // ── reductions and composites ───────────────────────────────────

    /// Pixel-wise reduction across the stack. Output band names carry a
    /// `_<reducer>` suffix (`minMax` yields `_min` and `_max` pairs).
    pub fn reduce(&self, reducer: Reducer) -> Image {
        Image::from_expr(Expr::call(
            Op::CollectionReduce,
            vec![self.0.clone(), Expr::literal(reducer.name())],
        ))
    }

    /// Pixel-wise mean with the original band names restored.
    pub fn mean(&self) -> Image {
        self.reduce(Reducer::Mean).rename(&self.first().band_names())
    }

    /// Pixel-wise sum with the original band names restored.
    pub fn sum(&self) -> Image {
        self.reduce(Reducer::Sum).rename(&self.first().band_names())
    }

    /// Last-on-top composite: per pixel, the newest unmasked value wins.
    pub fn mosaic(&self) -> Image {
        Image::from_expr(Expr::call(Op::CollectionMosaic, vec![self.0.clone()]))
    }

    /// Per-pixel argmax composite keyed on `band`.
    pub fn quality_mosaic(&self, band: impl IntoExpr) -> Image {
        Image::from_expr(Expr::call(
            Op::CollectionQualityMosaic,
            vec![self.0.clone(), band.into_expr()],
        ))
    }

    /// Stack every band of every image into one image, band names
    /// `<index>_<band>`.
    pub fn to_bands(&self) -> Image {
        Image::from_expr(Expr::call(Op::CollectionToBands, vec![self.0.clone()]))
    }

    // ── terminal shapes ─────────────────────────────────────────────

    pub fn to_list(&self) -> List {
        List::from_expr(Expr::call(Op::CollectionToList, vec![self.0.clone()]))
    }

    pub fn size(&self) -> Number {
        Number::from_expr(Expr::call(Op::CollectionSize, vec![self.0.clone()]))
    }

    pub fn first(&self) -> Image {
        Image::from_expr(Expr::call(Op::CollectionFirst, vec![self.0.clone()]))
    }

    /// Union of the image footprints.
    pub fn geometry(&self) -> Geometry {
        Geometry::from_expr(Expr::call(Op::CollectionGeometry, vec![self.0.clone()]))
    }

    // ── property aggregation ────────────────────────────────────────

    /// Values of `property` across the collection, in collection order.
    /// The property name may itself be computed.
    pub fn aggregate_array(&self, property: impl IntoExpr) -> List {
        List::from_expr(Expr::call(
            Op::AggregateArray,
            vec![self.0.clone(), property.into_expr()],
        ))
    }

    pub fn aggregate_min(&self, property: &str) -> Number {
        Number::from_expr(Expr::call(
            Op::AggregateMin,
            vec![self.0.clone(), Expr::literal(property)],
        ))
    }

    pub fn aggregate_max(&self, property: &str) -> Number {
        Number::from_expr(Expr::call(
            Op::AggregateMax,
            vec![self.0.clone(), Expr::literal(property)],
        ))
    }

    // ── collection-level properties ─────────────────────────────────

    pub fn property(&self, name: &str) -> Expr {
        Expr::call(Op::GetProperty, vec![self.0.clone(), Expr::literal(name)])
    }

    pub fn set(&self, name: &str, value: impl IntoExpr) -> ImageCollection {
        ImageCollection(Expr::call(
            Op::SetProperty,
            vec![self.0.clone(), Expr::literal(name), value.into_expr()],
        ))
    }

    pub fn copy_properties(&self, source: impl IntoExpr, exclude: &List) -> ImageCollection {
        ImageCollection(Expr::call(
            Op::CopyProperties,
            vec![self.0.clone(), source.into_expr(), exclude.expr().clone()],
        ))
    }

    pub fn property_names(&self) -> List {
        List::from_expr(Expr::call(Op::PropertyNames, vec![self.0.clone()]))
    }
}
