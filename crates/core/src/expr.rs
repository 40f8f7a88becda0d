//! Expression-graph nodes.
//!
//! An [`Expr`] is an immutable, `Arc`-shared node in a lazily evaluated
//! remote computation. Nothing is computed client-side; chaining methods on
//! handles only grows the graph. Evaluation happens in one place, a
//! blocking [`crate::Engine::evaluate`] call.
//!
//! [`Op`] is the closed set of remote primitives the toolbox composes.
//! Keeping it closed (instead of dispatching on primitive names at runtime)
//! moves "unknown operation" failures to compile time.

use std::sync::Arc;

use crate::value::Value;

// ---------------------------------------------------------------------------
// Op enum
// ---------------------------------------------------------------------------

/// A remote primitive invocation. Argument positions are fixed per variant
/// and documented where they are not obvious.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // ── lists ───────────────────────────────────────────────────────
    /// Variadic: build a list from computed elements.
    ListCreate,
    /// `(value, count)`
    ListRepeat,
    /// `(start, end)` — inclusive on both ends.
    ListSequence,
    /// `(list, index)` — negative indices count from the end.
    ListGet,
    /// `(list, index, value)`
    ListSet,
    /// `(list, fn)`
    ListMap,
    /// `(list, filter)`
    ListFilter,
    ListDistinct,
    ListSort,
    ListFlatten,

    // ── dictionaries ────────────────────────────────────────────────
    /// `(keys, values)`
    DictFromLists,
    /// `(pairs)` — list of `[key, value]` lists.
    DictFromPairs,
    DictKeys,
    DictValues,
    /// `(dict, keys)`
    DictSelect,

    // ── strings ─────────────────────────────────────────────────────
    /// `(a, b)`
    StringCat,
    /// `(s, pattern, replacement)` — first occurrence only.
    StringReplace,
    /// `(s, start)`
    StringSlice,

    // ── numbers ─────────────────────────────────────────────────────
    /// `(n, pattern)` — `"%s"` or `"%d"`.
    NumberFormat,
    NumberToInt,

    // ── dates (epoch milliseconds) ──────────────────────────────────
    /// `(millis, pattern)` — chrono pattern, UTC.
    DateFormat,
    /// `(millis, unit, in_unit)` — e.g. `("day", "year")` for 0-based DOY.
    DateGetRelative,
    /// `(millis, field)` — e.g. `"year"`.
    DateGet,
    /// `(start, end, step_millis)` — list of `[start, end)` pairs covering
    /// the span in `ceil(span/step)` buckets (at least one); the final
    /// bucket is closed so the span's end instant is included.
    DateRangeList,

    // ── algebra (numbers or images; images pair bands positionally) ─
    Add,
    Subtract,
    Multiply,
    Divide,
    Pow,
    Sqrt,
    Gt,
    Lt,
    Eq,
    Or,
    And,
    Not,

    // ── arrays ──────────────────────────────────────────────────────
    ArrayFromList,
    ArrayToList,

    // ── images ──────────────────────────────────────────────────────
    /// `(value)` — single unbounded constant band named `"constant"`.
    ImageConstant,
    /// `(image, names)`
    ImageSelect,
    /// `(image, names)`
    ImageRename,
    /// `(image, other, overwrite)`
    ImageAddBands,
    ImageBandNames,
    /// Per-band validity mask as a 0/1 image.
    ImageMask,
    /// `(image, mask)`
    ImageUpdateMask,
    /// `(image, reducer)` — reduce across bands into one band named after
    /// the reducer.
    ImageReduce,
    /// `(image, geometry)`
    ImageClip,
    /// `(image, reducer, geometry, params)` — params is a literal dict
    /// (scale, crs, bestEffort, maxPixels, tileScale).
    ReduceRegion,
    /// `(image, regions, reducer, scale)`
    ReduceRegions,

    // ── collections ─────────────────────────────────────────────────
    /// `(asset_id)`
    LoadCollection,
    /// `(images)` — list of images.
    CollectionFromImages,
    /// `(a, b)`
    CollectionMerge,
    /// `(collection, fn)`
    CollectionMap,
    /// `(collection, fn, first)` — fn is `(element, accumulator)`.
    CollectionIterate,
    /// `(collection, reducer)` — pixel-wise across the stack; output bands
    /// carry a `_<reducer>` suffix (`minMax` yields `_min` and `_max`).
    CollectionReduce,
    /// `(collection, names)` — per-image band subset, properties kept.
    CollectionSelect,
    /// `(collection, property)`
    CollectionSort,
    /// `(collection, filter)`
    CollectionFilter,
    /// `(collection, start, end)` — `[start, end)` on the time property.
    CollectionFilterDate,
    /// `(collection, geometry)`
    CollectionFilterBounds,
    /// Stack every band of every image into one image, band names
    /// `<index>_<band>`.
    CollectionToBands,
    CollectionToList,
    CollectionSize,
    CollectionFirst,
    /// Last-on-top composite.
    CollectionMosaic,
    /// `(collection, band)` — per-pixel argmax composite on `band`.
    CollectionQualityMosaic,
    CollectionGeometry,
    /// `(collection, property)`
    AggregateArray,
    AggregateMin,
    AggregateMax,

    // ── element properties (images, collections, features) ──────────
    /// `(element, name)`
    GetProperty,
    /// `(element, name, value)` — value may itself be any element.
    SetProperty,
    /// `(destination, source, exclude)` — source wins on conflicts.
    CopyProperties,
    PropertyNames,

    // ── features ────────────────────────────────────────────────────
    /// `(geometry, properties)`
    FeatureCreate,
    /// `(feature, keys)`
    FeatureToDictionary,
    /// Variadic: build a feature collection from features.
    FeatureCollectionCreate,

    // ── filters ─────────────────────────────────────────────────────
    /// `(name, value)` for the binary filters; variadic for and/or.
    FilterEq,
    FilterGt,
    FilterLt,
    FilterLte,
    FilterGte,
    FilterListContains,
    FilterStringStartsWith,
    FilterAnd,
    FilterOr,

    // ── geometries ──────────────────────────────────────────────────
    /// `(x0, y0, x1, y1)`
    GeometryRectangle,
    GeometryEverything,
}

impl Op {
    /// Wire name of the primitive, used by the JSON graph encoding.
    pub fn name(self) -> &'static str {
        use Op::*;
        match self {
            ListCreate => "List.create",
            ListRepeat => "List.repeat",
            ListSequence => "List.sequence",
            ListGet => "List.get",
            ListSet => "List.set",
            ListMap => "List.map",
            ListFilter => "List.filter",
            ListDistinct => "List.distinct",
            ListSort => "List.sort",
            ListFlatten => "List.flatten",
            DictFromLists => "Dictionary.fromLists",
            DictFromPairs => "Dictionary.fromPairs",
            DictKeys => "Dictionary.keys",
            DictValues => "Dictionary.values",
            DictSelect => "Dictionary.select",
            StringCat => "String.cat",
            StringReplace => "String.replace",
            StringSlice => "String.slice",
            NumberFormat => "Number.format",
            NumberToInt => "Number.int",
            DateFormat => "Date.format",
            DateGetRelative => "Date.getRelative",
            DateGet => "Date.get",
            DateRangeList => "DateRange.list",
            Add => "Element.add",
            Subtract => "Element.subtract",
            Multiply => "Element.multiply",
            Divide => "Element.divide",
            Pow => "Element.pow",
            Sqrt => "Element.sqrt",
            Gt => "Element.gt",
            Lt => "Element.lt",
            Eq => "Element.eq",
            Or => "Element.or",
            And => "Element.and",
            Not => "Element.not",
            ArrayFromList => "Array.fromList",
            ArrayToList => "Array.toList",
            ImageConstant => "Image.constant",
            ImageSelect => "Image.select",
            ImageRename => "Image.rename",
            ImageAddBands => "Image.addBands",
            ImageBandNames => "Image.bandNames",
            ImageMask => "Image.mask",
            ImageUpdateMask => "Image.updateMask",
            ImageReduce => "Image.reduce",
            ImageClip => "Image.clip",
            ReduceRegion => "Image.reduceRegion",
            ReduceRegions => "Image.reduceRegions",
            LoadCollection => "ImageCollection.load",
            CollectionFromImages => "ImageCollection.fromImages",
            CollectionMerge => "ImageCollection.merge",
            CollectionMap => "ImageCollection.map",
            CollectionIterate => "ImageCollection.iterate",
            CollectionReduce => "ImageCollection.reduce",
            CollectionSelect => "ImageCollection.select",
            CollectionSort => "ImageCollection.sort",
            CollectionFilter => "ImageCollection.filter",
            CollectionFilterDate => "ImageCollection.filterDate",
            CollectionFilterBounds => "ImageCollection.filterBounds",
            CollectionToBands => "ImageCollection.toBands",
            CollectionToList => "ImageCollection.toList",
            CollectionSize => "ImageCollection.size",
            CollectionFirst => "ImageCollection.first",
            CollectionMosaic => "ImageCollection.mosaic",
            CollectionQualityMosaic => "ImageCollection.qualityMosaic",
            CollectionGeometry => "ImageCollection.geometry",
            AggregateArray => "Collection.aggregateArray",
            AggregateMin => "Collection.aggregateMin",
            AggregateMax => "Collection.aggregateMax",
            GetProperty => "Element.get",
            SetProperty => "Element.set",
            CopyProperties => "Element.copyProperties",
            PropertyNames => "Element.propertyNames",
            FeatureCreate => "Feature.create",
            FeatureToDictionary => "Feature.toDictionary",
            FeatureCollectionCreate => "FeatureCollection.create",
            FilterEq => "Filter.eq",
            FilterGt => "Filter.gt",
            FilterLt => "Filter.lt",
            FilterLte => "Filter.lte",
            FilterGte => "Filter.gte",
            FilterListContains => "Filter.listContains",
            FilterStringStartsWith => "Filter.stringStartsWith",
            FilterAnd => "Filter.and",
            FilterOr => "Filter.or",
            GeometryRectangle => "Geometry.rectangle",
            GeometryEverything => "Geometry.everything",
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum Node {
    Literal(Value),
    Var(String),
    Function { params: Vec<String>, body: Expr },
    Call { op: Op, args: Vec<Expr> },
}

/// A handle to one node of an unevaluated expression graph.
///
/// Cloning is cheap (`Arc`); nodes are never mutated after construction.
#[derive(Debug, Clone)]
pub struct Expr(pub(crate) Arc<Node>);

impl Expr {
    /// A client-known constant.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr(Arc::new(Node::Literal(value.into())))
    }

    /// A parameter reference inside a server-side function body.
    pub fn var(name: &str) -> Self {
        Expr(Arc::new(Node::Var(name.to_string())))
    }

    /// A server-side function (used by map / iterate / filter).
    pub fn function(params: Vec<String>, body: Expr) -> Self {
        Expr(Arc::new(Node::Function { params, body }))
    }

    /// One remote primitive invocation.
    pub fn call(op: Op, args: Vec<Expr>) -> Self {
        Expr(Arc::new(Node::Call { op, args }))
    }

    /// JSON wire encoding of the graph, as POSTed by the REST engine.
    pub fn to_json(&self) -> serde_json::Value {
        match &*self.0 {
            Node::Literal(v) => serde_json::json!({ "const": v }),
            Node::Var(name) => serde_json::json!({ "ref": name }),
            Node::Function { params, body } => serde_json::json!({
                "fn": { "params": params, "body": body.to_json() }
            }),
            Node::Call { op, args } => serde_json::json!({
                "op": op.name(),
                "args": args.iter().map(Expr::to_json).collect::<Vec<_>>(),
            }),
        }
    }
}
