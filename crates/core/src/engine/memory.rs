//! In-memory reference engine.
//!
//! Evaluates expression graphs eagerly over small in-memory rasters. This
//! is the semantic reference for every [`Op`] and the backing engine of the
//! workspace test suites; it is not meant for production-sized data.
//!
//! Conventions fixed here:
//! - image algebra pairs bands positionally, band names come from the left
//!   operand, masks are intersected;
//! - a band with a single stored value is a constant band, broadcast to the
//!   image dimensions on read;
//! - `stdDev` is the population standard deviation (divide by N);
//! - collection reduction suffixes band names with `_<reducer>` (`minMax`
//!   yields `_min` and `_max`);
//! - `toBands` prefixes band names with the image's `system:index` (or its
//!   position) as `<index>_<band>`;
//! - date filtering is `[start, end)` on epoch milliseconds.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, TimeZone, Utc};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::expr::{Expr, Node, Op};
use crate::reducer::Reducer;
use crate::value::Value;

// ---------------------------------------------------------------------------
// Raster model
// ---------------------------------------------------------------------------

/// One named channel of an in-memory raster. `values.len()` is either the
/// full pixel count or 1 (a constant band, broadcast on read).
#[derive(Debug, Clone, PartialEq)]
pub struct BandData {
    pub name: String,
    pub values: Vec<f64>,
    pub mask: Vec<bool>,
}

impl BandData {
    fn sample(&self, pixel: usize) -> (f64, bool) {
        if self.values.len() == 1 {
            (self.values[0], self.mask[0])
        } else {
            (self.values[pixel], self.mask[pixel])
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Prop {
    Value(Value),
    /// Property values may themselves be images (used by running
    /// accumulations that stash the previous element in a property).
    Image(Box<ImageData>),
}

/// A small in-memory raster with a property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    width: usize,
    height: usize,
    bands: Vec<BandData>,
    props: BTreeMap<String, Prop>,
}

impl ImageData {
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "image dimensions must be positive");
        ImageData {
            width,
            height,
            bands: Vec::new(),
            props: BTreeMap::new(),
        }
    }

    /// Add a fully valid band; `values.len()` must equal `width * height`.
    pub fn with_band(mut self, name: &str, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), self.width * self.height, "band size mismatch");
        let mask = vec![true; values.len()];
        self.bands.push(BandData {
            name: name.to_string(),
            values,
            mask,
        });
        self
    }

    /// Add a band with an explicit validity mask.
    pub fn with_masked_band(mut self, name: &str, values: Vec<f64>, mask: Vec<bool>) -> Self {
        assert_eq!(values.len(), self.width * self.height, "band size mismatch");
        assert_eq!(mask.len(), values.len(), "mask size mismatch");
        self.bands.push(BandData {
            name: name.to_string(),
            values,
            mask,
        });
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.props.insert(name.to_string(), Prop::Value(value.into()));
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bands(&self) -> &[BandData] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn band(&self, name: &str) -> Option<&BandData> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        match self.props.get(name) {
            Some(Prop::Value(v)) => Some(v),
            _ => None,
        }
    }

    fn pixels(&self) -> usize {
        self.width * self.height
    }

    /// Band values expanded to the full pixel count.
    fn expanded(&self, band: &BandData) -> (Vec<f64>, Vec<bool>) {
        let n = self.pixels();
        let mut values = Vec::with_capacity(n);
        let mut mask = Vec::with_capacity(n);
        for i in 0..n {
            let (v, m) = band.sample(i);
            values.push(v);
            mask.push(m);
        }
        (values, mask)
    }
}

/// An ordered stack of images with a collection-level property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionData {
    images: Vec<ImageData>,
    props: BTreeMap<String, Prop>,
}

impl CollectionData {
    pub fn images(&self) -> &[ImageData] {
        &self.images
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        match self.props.get(name) {
            Some(Prop::Value(v)) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Geom {
    Everything,
    Rect { x0: f64, y0: f64, x1: f64, y1: f64 },
}

impl Geom {
    fn contains(&self, x: usize, y: usize) -> bool {
        match self {
            Geom::Everything => true,
            Geom::Rect { x0, y0, x1, y1 } => {
                let (x, y) = (x as f64, y as f64);
                x >= *x0 && x < *x1 && y >= *y0 && y < *y1
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FeatureData {
    geometry: Geom,
    props: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Gt,
    Lt,
    Lte,
    Gte,
}

#[derive(Debug, Clone)]
enum FilterData {
    Cmp(CmpOp, String, Value),
    ListContains(String, Value),
    StartsWith(String, Value),
    All(Vec<FilterData>),
    Any(Vec<FilterData>),
}

type Env = BTreeMap<String, EvalValue>;

#[derive(Debug, Clone)]
enum EvalValue {
    Val(Value),
    List(Vec<EvalValue>),
    Image(ImageData),
    Collection(CollectionData),
    Feature(FeatureData),
    Features(Vec<FeatureData>),
    Geometry(Geom),
    Filter(FilterData),
    Func {
        params: Vec<String>,
        body: Expr,
        env: Env,
    },
}

fn err(msg: impl Into<String>) -> Error {
    Error::Engine(msg.into())
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Eager interpreter over in-memory assets.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    assets: HashMap<String, Vec<ImageData>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        MemoryEngine {
            assets: HashMap::new(),
        }
    }

    /// Register a stored collection. Images without a `system:index`
    /// property get their position assigned, matching stored-asset behavior.
    pub fn insert_collection(&mut self, asset_id: &str, images: Vec<ImageData>) {
        let images = images
            .into_iter()
            .enumerate()
            .map(|(i, mut img)| {
                img.props
                    .entry("system:index".to_string())
                    .or_insert_with(|| Prop::Value(Value::Str(i.to_string())));
                img
            })
            .collect();
        self.assets.insert(asset_id.to_string(), images);
    }

    /// Evaluate a graph expected to yield an image.
    pub fn evaluate_image(&self, expr: &Expr) -> Result<ImageData> {
        as_image(self.eval(expr, &Env::new())?)
    }

    /// Evaluate a graph expected to yield an image collection.
    pub fn evaluate_collection(&self, expr: &Expr) -> Result<CollectionData> {
        as_collection(self.eval(expr, &Env::new())?)
    }

    fn eval(&self, expr: &Expr, env: &Env) -> Result<EvalValue> {
        match &*expr.0 {
            Node::Literal(v) => Ok(EvalValue::Val(v.clone())),
            Node::Var(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| err(format!("unbound reference: {name}"))),
            Node::Function { params, body } => Ok(EvalValue::Func {
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
            }),
            Node::Call { op, args } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, env))
                    .collect::<Result<Vec<_>>>()?;
                self.eval_call(*op, args)
            }
        }
    }

    fn apply(&self, func: EvalValue, call_args: Vec<EvalValue>) -> Result<EvalValue> {
        let EvalValue::Func { params, body, env } = func else {
            return Err(err("expected a function argument"));
        };
        if params.len() != call_args.len() {
            return Err(err(format!(
                "function arity mismatch: expected {}, got {}",
                params.len(),
                call_args.len()
            )));
        }
        let mut env = env;
        for (p, a) in params.into_iter().zip(call_args) {
            env.insert(p, a);
        }
        self.eval(&body, &env)
    }

    #[allow(clippy::too_many_lines)]
    fn eval_call(&self, op: Op, mut args: Vec<EvalValue>) -> Result<EvalValue> {
        use Op::*;
        match op {
            // ── lists ───────────────────────────────────────────────
            ListCreate => Ok(EvalValue::List(args)),
            ListRepeat => {
                let count = as_int(&args[1])?;
                if count < 0 {
                    return Err(err("negative repeat count"));
                }
                Ok(EvalValue::List(vec![args[0].clone(); count as usize]))
            }
            ListSequence => {
                let (start, end) = (as_int(&args[0])?, as_int(&args[1])?);
                let items = (start..=end).map(Value::Int).collect();
                Ok(EvalValue::Val(Value::List(items)))
            }
            ListGet => {
                let list = as_list(args.remove(0))?;
                let idx = resolve_index(as_int(&args[0])?, list.len())?;
                Ok(list[idx].clone())
            }
            ListSet => {
                let mut list = as_list(args.remove(0))?;
                let idx = resolve_index(as_int(&args[0])?, list.len())?;
                list[idx] = args.remove(1);
                Ok(EvalValue::List(list))
            }
            ListMap => {
                let list = as_list(args.remove(0))?;
                let func = args.remove(0);
                let mapped = list
                    .into_iter()
                    .map(|item| self.apply(func.clone(), vec![item]))
                    .collect::<Result<Vec<_>>>()?;
                Ok(EvalValue::List(mapped))
            }
            ListFilter => {
                let list = as_list(args.remove(0))?;
                let filter = as_filter(args.remove(0))?;
                let kept = list
                    .into_iter()
                    .filter(|item| filter_matches_element(&filter, item))
                    .collect();
                Ok(EvalValue::List(kept))
            }
            ListDistinct => {
                let list = as_list(args.remove(0))?;
                let mut seen: Vec<Value> = Vec::new();
                for item in list {
                    let v = as_plain(&item)?;
                    if !seen.iter().any(|s| s.loosely_eq(&v)) {
                        seen.push(v);
                    }
                }
                Ok(EvalValue::Val(Value::List(seen)))
            }
            ListSort => {
                let list = as_list(args.remove(0))?;
                let mut items = list
                    .iter()
                    .map(as_plain)
                    .collect::<Result<Vec<_>>>()?;
                items.sort_by(|a, b| order_values(a, b));
                Ok(EvalValue::Val(Value::List(items)))
            }
            ListFlatten => {
                let list = as_list(args.remove(0))?;
                let mut flat = Vec::new();
                for item in list {
                    flatten_into(item, &mut flat);
                }
                Ok(EvalValue::List(flat))
            }

            // ── dictionaries ────────────────────────────────────────
            DictFromLists => {
                let keys = as_strings(args.remove(0))?;
                let values = as_list(args.remove(0))?;
                if keys.len() != values.len() {
                    return Err(err(format!(
                        "dictionary key/value length mismatch: {} vs {}",
                        keys.len(),
                        values.len()
                    )));
                }
                let mut dict = BTreeMap::new();
                for (k, v) in keys.into_iter().zip(values) {
                    dict.insert(k, self.to_value(v)?);
                }
                Ok(EvalValue::Val(Value::Dict(dict)))
            }
            DictFromPairs => {
                let pairs = as_list(args.remove(0))?;
                let mut dict = BTreeMap::new();
                for pair in pairs {
                    let mut pair = as_list(pair)?;
                    if pair.len() != 2 {
                        return Err(err("dictionary pair must have exactly two elements"));
                    }
                    let value = self.to_value(pair.remove(1))?;
                    let key = as_string(&pair[0])?;
                    dict.insert(key, value);
                }
                Ok(EvalValue::Val(Value::Dict(dict)))
            }
            DictKeys => {
                let dict = as_dict(&args[0])?;
                let keys = dict.keys().map(|k| Value::Str(k.clone())).collect();
                Ok(EvalValue::Val(Value::List(keys)))
            }
            DictValues => {
                let dict = as_dict(&args[0])?;
                Ok(EvalValue::Val(Value::List(dict.values().cloned().collect())))
            }
            DictSelect => {
                let keys = as_strings(args.remove(1))?;
                let dict = as_dict(&args[0])?;
                let mut out = BTreeMap::new();
                for k in keys {
                    if let Some(v) = dict.get(&k) {
                        out.insert(k, v.clone());
                    }
                }
                Ok(EvalValue::Val(Value::Dict(out)))
            }

            // ── strings ─────────────────────────────────────────────
            StringCat => {
                let a = as_string(&args[0])?;
                let b = as_string(&args[1])?;
                Ok(EvalValue::Val(Value::Str(format!("{a}{b}"))))
            }
            StringReplace => {
                let s = as_string(&args[0])?;
                let pattern = as_string(&args[1])?;
                let replacement = as_string(&args[2])?;
                Ok(EvalValue::Val(Value::Str(s.replacen(&pattern, &replacement, 1))))
            }
            StringSlice => {
                let s = as_string(&args[0])?;
                let chars: Vec<char> = s.chars().collect();
                let start = as_int(&args[1])?;
                let start = if start < 0 {
                    (chars.len() as i64 + start).max(0) as usize
                } else {
                    (start as usize).min(chars.len())
                };
                Ok(EvalValue::Val(Value::Str(chars[start..].iter().collect())))
            }

            // ── numbers ─────────────────────────────────────────────
            NumberFormat => {
                let pattern = as_string(&args[1])?;
                let rendered = match (&args[0], pattern.as_str()) {
                    (_, "%d") => as_int(&args[0])?.to_string(),
                    (EvalValue::Val(Value::Int(i)), "%s") => i.to_string(),
                    (EvalValue::Val(Value::Float(f)), "%s") => format!("{f}"),
                    _ => return Err(err(format!("unsupported number format: {pattern}"))),
                };
                Ok(EvalValue::Val(Value::Str(rendered)))
            }
            NumberToInt => Ok(EvalValue::Val(Value::Int(as_int(&args[0])?))),

            // ── dates ───────────────────────────────────────────────
            DateFormat => {
                let date = to_datetime(as_int(&args[0])?)?;
                let pattern = as_string(&args[1])?;
                Ok(EvalValue::Val(Value::Str(date.format(&pattern).to_string())))
            }
            DateGetRelative => {
                let date = to_datetime(as_int(&args[0])?)?;
                let unit = as_string(&args[1])?;
                let in_unit = as_string(&args[2])?;
                match (unit.as_str(), in_unit.as_str()) {
                    ("day", "year") => Ok(EvalValue::Val(Value::Int(date.ordinal0() as i64))),
                    _ => Err(err(format!("unsupported relative unit: {unit} in {in_unit}"))),
                }
            }
            DateGet => {
                let date = to_datetime(as_int(&args[0])?)?;
                let field = as_string(&args[1])?;
                let value = match field.as_str() {
                    "year" => date.year() as i64,
                    "month" => date.month() as i64,
                    "day" => date.day() as i64,
                    _ => return Err(err(format!("unsupported date field: {field}"))),
                };
                Ok(EvalValue::Val(Value::Int(value)))
            }
            DateRangeList => {
                let start = as_int(&args[0])?;
                let end = as_int(&args[1])?;
                let step = as_int(&args[2])?;
                if step <= 0 {
                    return Err(err("date range step must be positive"));
                }
                let span = end - start;
                let buckets = if span <= 0 { 1 } else { (span + step - 1) / step };
                let mut ranges = Vec::with_capacity(buckets as usize);
                for i in 0..buckets {
                    let s = start + i * step;
                    // the final bucket is closed so the span's end instant
                    // survives half-open date filtering
                    let e = if i == buckets - 1 { end + 1 } else { s + step };
                    ranges.push(Value::List(vec![Value::Int(s), Value::Int(e)]));
                }
                Ok(EvalValue::Val(Value::List(ranges)))
            }

            // ── algebra ─────────────────────────────────────────────
            Add => self.numeric_binary(op, args, |a, b| a + b),
            Subtract => self.numeric_binary(op, args, |a, b| a - b),
            Multiply => self.numeric_binary(op, args, |a, b| a * b),
            Divide => self.numeric_binary(op, args, |a, b| a / b),
            Pow => self.numeric_binary(op, args, f64::powf),
            Gt => self.numeric_binary(op, args, |a, b| flag(a > b)),
            Lt => self.numeric_binary(op, args, |a, b| flag(a < b)),
            Eq => self.numeric_binary(op, args, |a, b| flag(a == b)),
            Or => self.numeric_binary(op, args, |a, b| flag(a != 0.0 || b != 0.0)),
            And => self.numeric_binary(op, args, |a, b| flag(a != 0.0 && b != 0.0)),
            Sqrt => match args.remove(0) {
                EvalValue::Image(image) => Ok(EvalValue::Image(image_unary(&image, f64::sqrt))),
                other => Ok(EvalValue::Val(Value::Float(as_num(&other)?.sqrt()))),
            },
            Not => match args.remove(0) {
                EvalValue::Image(image) => {
                    Ok(EvalValue::Image(image_unary(&image, |v| flag(v == 0.0))))
                }
                other => Ok(EvalValue::Val(Value::Int(i64::from(as_num(&other)? == 0.0)))),
            },

            // ── arrays ──────────────────────────────────────────────
            ArrayFromList | ArrayToList => {
                let v = self.to_value(args.remove(0))?;
                match v {
                    Value::List(_) => Ok(EvalValue::Val(v)),
                    _ => Err(err("array payload must be a list")),
                }
            }

            // ── images ──────────────────────────────────────────────
            ImageConstant => {
                let value = as_num(&args[0])?;
                Ok(EvalValue::Image(
                    ImageData::new(1, 1).with_band("constant", vec![value]),
                ))
            }
            ImageSelect => {
                let image = as_image(args.remove(0))?;
                let names = as_strings(args.remove(0))?;
                Ok(EvalValue::Image(select_bands(&image, &names)?))
            }
            ImageRename => {
                let mut image = as_image(args.remove(0))?;
                let names = as_strings(args.remove(0))?;
                if names.len() != image.bands.len() {
                    return Err(err(format!(
                        "rename expects {} names, got {}",
                        image.bands.len(),
                        names.len()
                    )));
                }
                for (band, name) in image.bands.iter_mut().zip(names) {
                    band.name = name;
                }
                Ok(EvalValue::Image(image))
            }
            ImageAddBands => {
                let mut image = as_image(args.remove(0))?;
                let other = as_image(args.remove(0))?;
                let overwrite = truthy(&as_plain(&args[0])?)?;
                let (width, height) = broadcast_dims(&image, &other)?;
                image.width = width;
                image.height = height;
                for band in &other.bands {
                    let existing = image.bands.iter_mut().find(|b| b.name == band.name);
                    match existing {
                        Some(slot) if overwrite => *slot = band.clone(),
                        _ => image.bands.push(band.clone()),
                    }
                }
                Ok(EvalValue::Image(image))
            }
            ImageBandNames => {
                let image = as_image(args.remove(0))?;
                let names = image
                    .bands
                    .iter()
                    .map(|b| Value::Str(b.name.clone()))
                    .collect();
                Ok(EvalValue::Val(Value::List(names)))
            }
            ImageMask => {
                let image = as_image(args.remove(0))?;
                let bands = image
                    .bands
                    .iter()
                    .map(|b| BandData {
                        name: b.name.clone(),
                        values: b.mask.iter().map(|m| flag(*m)).collect(),
                        mask: vec![true; b.mask.len()],
                    })
                    .collect();
                Ok(EvalValue::Image(ImageData { bands, ..image }))
            }
            ImageUpdateMask => {
                let image = as_image(args.remove(0))?;
                let mask = as_image(args.remove(0))?;
                Ok(EvalValue::Image(update_mask(&image, &mask)?))
            }
            ImageReduce => {
                let image = as_image(args.remove(0))?;
                let reducer = as_reducer(&args[0])?;
                Ok(EvalValue::Image(reduce_bands(&image, reducer)))
            }
            ImageClip => {
                let image = as_image(args.remove(0))?;
                let geom = as_geometry(&args[0])?;
                Ok(EvalValue::Image(clip(&image, geom)))
            }
            ReduceRegion => {
                let image = as_image(args.remove(0))?;
                let reducer = as_reducer(&args[0])?;
                let geom = as_geometry(&args[1])?;
                // the params dictionary (scale, crs, ...) has no effect on
                // the in-memory raster model
                as_dict(&args[2])?;
                Ok(EvalValue::Val(Value::Dict(reduce_region(&image, reducer, geom))))
            }
            ReduceRegions => {
                let image = as_image(args.remove(0))?;
                let features = as_features(args.remove(0))?;
                let reducer = as_reducer(&args[0])?;
                as_num(&args[1])?; // scale, unused in-memory
                let reduced = features
                    .into_iter()
                    .map(|mut f| {
                        let stats = reduce_region(&image, reducer, f.geometry);
                        f.props.extend(stats);
                        f
                    })
                    .collect();
                Ok(EvalValue::Features(reduced))
            }

            // ── collections ─────────────────────────────────────────
            LoadCollection => {
                let id = as_string(&args[0])?;
                let images = self
                    .assets
                    .get(&id)
                    .ok_or_else(|| err(format!("collection not found: {id}")))?;
                Ok(EvalValue::Collection(CollectionData {
                    images: images.clone(),
                    props: BTreeMap::new(),
                }))
            }
            CollectionFromImages => {
                let images = as_list(args.remove(0))?
                    .into_iter()
                    .map(as_image)
                    .collect::<Result<Vec<_>>>()?;
                Ok(EvalValue::Collection(CollectionData {
                    images,
                    props: BTreeMap::new(),
                }))
            }
            CollectionMerge => {
                let mut a = as_collection(args.remove(0))?;
                let b = as_collection(args.remove(0))?;
                a.images.extend(b.images);
                Ok(EvalValue::Collection(a))
            }
            CollectionMap => {
                let collection = as_collection(args.remove(0))?;
                let func = args.remove(0);
                let images = collection
                    .images
                    .into_iter()
                    .map(|img| as_image(self.apply(func.clone(), vec![EvalValue::Image(img)])?))
                    .collect::<Result<Vec<_>>>()?;
                Ok(EvalValue::Collection(CollectionData {
                    images,
                    props: collection.props,
                }))
            }
            CollectionIterate => {
                let collection = as_collection(args.remove(0))?;
                let func = args.remove(0);
                let mut acc = args.remove(0);
                for img in collection.images {
                    acc = self.apply(func.clone(), vec![EvalValue::Image(img), acc])?;
                }
                Ok(acc)
            }
            CollectionReduce => {
                let collection = as_collection(args.remove(0))?;
                let reducer = as_reducer(&args[0])?;
                Ok(EvalValue::Image(reduce_collection(&collection.images, reducer)?))
            }
            CollectionSelect => {
                let collection = as_collection(args.remove(0))?;
                let names = as_strings(args.remove(0))?;
                let images = collection
                    .images
                    .iter()
                    .map(|img| select_bands(img, &names))
                    .collect::<Result<Vec<_>>>()?;
                Ok(EvalValue::Collection(CollectionData {
                    images,
                    props: collection.props,
                }))
            }
            CollectionSort => {
                let collection = as_collection(args.remove(0))?;
                let property = as_string(&args[0])?;
                Ok(EvalValue::Collection(sort_collection(collection, &property)?))
            }
            CollectionFilter => {
                let mut collection = as_collection(args.remove(0))?;
                let filter = as_filter(args.remove(0))?;
                collection
                    .images
                    .retain(|img| filter_matches_props(&filter, &img.props));
                Ok(EvalValue::Collection(collection))
            }
            CollectionFilterDate => {
                let mut collection = as_collection(args.remove(0))?;
                let start = as_num(&args[0])?;
                let end = as_num(&args[1])?;
                collection.images.retain(|img| {
                    img.property(crate::TIME_START)
                        .and_then(Value::as_f64)
                        .map(|t| t >= start && t < end)
                        .unwrap_or(false)
                });
                Ok(EvalValue::Collection(collection))
            }
            // footprints are not modeled; every image intersects everything
            CollectionFilterBounds => {
                let collection = as_collection(args.remove(0))?;
                as_geometry(&args[0])?;
                Ok(EvalValue::Collection(collection))
            }
            CollectionToBands => {
                let collection = as_collection(args.remove(0))?;
                Ok(EvalValue::Image(to_bands(&collection.images)?))
            }
            CollectionToList => match args.remove(0) {
                EvalValue::Collection(c) => Ok(EvalValue::List(
                    c.images.into_iter().map(EvalValue::Image).collect(),
                )),
                EvalValue::Features(fs) => Ok(EvalValue::List(
                    fs.into_iter().map(EvalValue::Feature).collect(),
                )),
                _ => Err(err("expected a collection")),
            },
            CollectionSize => match &args[0] {
                EvalValue::Collection(c) => Ok(EvalValue::Val(Value::Int(c.images.len() as i64))),
                EvalValue::Features(fs) => Ok(EvalValue::Val(Value::Int(fs.len() as i64))),
                _ => Err(err("expected a collection")),
            },
            CollectionFirst => {
                let collection = as_collection(args.remove(0))?;
                collection
                    .images
                    .into_iter()
                    .next()
                    .map(EvalValue::Image)
                    .ok_or_else(|| err("first() on an empty collection"))
            }
            CollectionMosaic => {
                let collection = as_collection(args.remove(0))?;
                Ok(EvalValue::Image(mosaic(&collection.images)?))
            }
            CollectionQualityMosaic => {
                let collection = as_collection(args.remove(0))?;
                let band = as_string(&args[0])?;
                Ok(EvalValue::Image(quality_mosaic(&collection.images, &band)?))
            }
            CollectionGeometry => {
                as_collection(args.remove(0))?;
                Ok(EvalValue::Geometry(Geom::Everything))
            }
            AggregateArray => {
                let property = as_string(&args[1])?;
                let values = property_bags(&args[0])?
                    .into_iter()
                    .map(|bag| bag.get(&property).cloned().unwrap_or(Value::Null))
                    .collect();
                Ok(EvalValue::Val(Value::List(values)))
            }
            AggregateMin | AggregateMax => {
                let property = as_string(&args[1])?;
                let mut best: Option<f64> = None;
                for bag in property_bags(&args[0])? {
                    let v = bag
                        .get(&property)
                        .and_then(Value::as_f64)
                        .ok_or_else(|| err(format!("missing numeric property: {property}")))?;
                    best = Some(match best {
                        None => v,
                        Some(b) if op == AggregateMin => b.min(v),
                        Some(b) => b.max(v),
                    });
                }
                let best = best.ok_or_else(|| err("aggregate over an empty collection"))?;
                Ok(EvalValue::Val(Value::Float(best)))
            }

            // ── element properties ──────────────────────────────────
            GetProperty => {
                let name = as_string(&args[1])?;
                let prop = match &args[0] {
                    EvalValue::Image(img) => img.props.get(&name).cloned(),
                    EvalValue::Collection(c) => c.props.get(&name).cloned(),
                    EvalValue::Feature(f) => f.props.get(&name).cloned().map(Prop::Value),
                    _ => return Err(err("get() expects an element")),
                };
                Ok(match prop {
                    Some(Prop::Value(v)) => EvalValue::Val(v),
                    Some(Prop::Image(img)) => EvalValue::Image(*img),
                    None => EvalValue::Val(Value::Null),
                })
            }
            SetProperty => {
                let name = as_string(&args[1])?;
                let value = match args.remove(2) {
                    EvalValue::Image(img) => Prop::Image(Box::new(img)),
                    other => Prop::Value(self.to_value(other)?),
                };
                match args.remove(0) {
                    EvalValue::Image(mut img) => {
                        img.props.insert(name, value);
                        Ok(EvalValue::Image(img))
                    }
                    EvalValue::Collection(mut c) => {
                        c.props.insert(name, value);
                        Ok(EvalValue::Collection(c))
                    }
                    EvalValue::Feature(mut f) => match value {
                        Prop::Value(v) => {
                            f.props.insert(name, v);
                            Ok(EvalValue::Feature(f))
                        }
                        Prop::Image(_) => Err(err("feature properties must be plain values")),
                    },
                    _ => Err(err("set() expects an element")),
                }
            }
            CopyProperties => {
                let exclude = as_strings(args.remove(2))?;
                let source = element_props(&args[1])?;
                let mut copied: BTreeMap<String, Prop> = source
                    .into_iter()
                    .filter(|(k, _)| !exclude.contains(k))
                    .collect();
                match args.remove(0) {
                    EvalValue::Image(mut img) => {
                        img.props.append(&mut copied);
                        Ok(EvalValue::Image(img))
                    }
                    EvalValue::Collection(mut c) => {
                        c.props.append(&mut copied);
                        Ok(EvalValue::Collection(c))
                    }
                    _ => Err(err("copyProperties() expects an image or collection")),
                }
            }
            PropertyNames => {
                let names = match &args[0] {
                    EvalValue::Image(img) => img.props.keys().cloned().collect::<Vec<_>>(),
                    EvalValue::Collection(c) => c.props.keys().cloned().collect(),
                    EvalValue::Feature(f) => f.props.keys().cloned().collect(),
                    _ => return Err(err("propertyNames() expects an element")),
                };
                Ok(EvalValue::Val(Value::List(
                    names.into_iter().map(Value::Str).collect(),
                )))
            }

            // ── features ────────────────────────────────────────────
            FeatureCreate => {
                let geometry = as_geometry(&args[0])?;
                let props = as_dict(&args[1])?.clone();
                Ok(EvalValue::Feature(FeatureData {
                    geometry,
                    props,
                }))
            }
            FeatureToDictionary => {
                let keys = as_strings(args.remove(1))?;
                let EvalValue::Feature(feature) = args.remove(0) else {
                    return Err(err("toDictionary() expects a feature"));
                };
                let mut dict = BTreeMap::new();
                for k in keys {
                    if let Some(v) = feature.props.get(&k) {
                        dict.insert(k, v.clone());
                    }
                }
                Ok(EvalValue::Val(Value::Dict(dict)))
            }
            FeatureCollectionCreate => {
                let features = args
                    .into_iter()
                    .map(|a| match a {
                        EvalValue::Feature(f) => Ok(f),
                        _ => Err(err("feature collection elements must be features")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(EvalValue::Features(features))
            }

            // ── filters ─────────────────────────────────────────────
            FilterEq => self.make_cmp_filter(CmpOp::Eq, args),
            FilterGt => self.make_cmp_filter(CmpOp::Gt, args),
            FilterLt => self.make_cmp_filter(CmpOp::Lt, args),
            FilterLte => self.make_cmp_filter(CmpOp::Lte, args),
            FilterGte => self.make_cmp_filter(CmpOp::Gte, args),
            FilterListContains => {
                let name = as_string(&args[0])?;
                let value = self.to_value(args.remove(1))?;
                Ok(EvalValue::Filter(FilterData::ListContains(name, value)))
            }
            FilterStringStartsWith => {
                let name = as_string(&args[0])?;
                let value = self.to_value(args.remove(1))?;
                Ok(EvalValue::Filter(FilterData::StartsWith(name, value)))
            }
            FilterAnd | FilterOr => {
                let parts = args
                    .into_iter()
                    .map(as_filter)
                    .collect::<Result<Vec<_>>>()?;
                Ok(EvalValue::Filter(if op == FilterAnd {
                    FilterData::All(parts)
                } else {
                    FilterData::Any(parts)
                }))
            }

            // ── geometries ──────────────────────────────────────────
            GeometryRectangle => Ok(EvalValue::Geometry(Geom::Rect {
                x0: as_num(&args[0])?,
                y0: as_num(&args[1])?,
                x1: as_num(&args[2])?,
                y1: as_num(&args[3])?,
            })),
            GeometryEverything => Ok(EvalValue::Geometry(Geom::Everything)),
        }
    }

    fn make_cmp_filter(&self, cmp: CmpOp, mut args: Vec<EvalValue>) -> Result<EvalValue> {
        let name = as_string(&args[0])?;
        let value = self.to_value(args.remove(1))?;
        Ok(EvalValue::Filter(FilterData::Cmp(cmp, name, value)))
    }

    /// Arithmetic and comparisons over numbers and images. Image operands
    /// broadcast scalars and single-band / single-pixel images.
    fn numeric_binary(
        &self,
        op: Op,
        mut args: Vec<EvalValue>,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<EvalValue> {
        let right = args.remove(1);
        let left = args.remove(0);
        match (left, right) {
            (EvalValue::Image(a), EvalValue::Image(b)) => {
                Ok(EvalValue::Image(image_binary(&a, &b, f)?))
            }
            (EvalValue::Image(a), rhs) => {
                let x = as_num(&rhs)?;
                Ok(EvalValue::Image(image_unary(&a, |v| f(v, x))))
            }
            (lhs, EvalValue::Image(b)) => {
                let x = as_num(&lhs)?;
                Ok(EvalValue::Image(image_unary(&b, |v| f(x, v))))
            }
            (lhs, rhs) => {
                let a = as_plain(&lhs)?;
                let b = as_plain(&rhs)?;
                // integer timestamps survive add/subtract/multiply
                if let (Value::Int(x), Value::Int(y), true) = (
                    &a,
                    &b,
                    matches!(op, Op::Add | Op::Subtract | Op::Multiply),
                ) {
                    let out = match op {
                        Op::Add => x + y,
                        Op::Subtract => x - y,
                        _ => x * y,
                    };
                    return Ok(EvalValue::Val(Value::Int(out)));
                }
                let out = f(
                    a.as_f64().ok_or_else(|| err("expected a number"))?,
                    b.as_f64().ok_or_else(|| err("expected a number"))?,
                );
                if matches!(op, Op::Gt | Op::Lt | Op::Eq | Op::Or | Op::And) {
                    Ok(EvalValue::Val(Value::Int(out as i64)))
                } else {
                    Ok(EvalValue::Val(Value::Float(out)))
                }
            }
        }
    }

    /// Deep conversion into a materialized [`Value`], used by terminal
    /// fetches and dictionary construction.
    fn to_value(&self, ev: EvalValue) -> Result<Value> {
        match ev {
            EvalValue::Val(v) => Ok(v),
            EvalValue::List(items) => Ok(Value::List(
                items
                    .into_iter()
                    .map(|i| self.to_value(i))
                    .collect::<Result<Vec<_>>>()?,
            )),
            EvalValue::Image(img) => Ok(image_info(&img)),
            EvalValue::Collection(c) => {
                let mut dict = BTreeMap::new();
                dict.insert("type".to_string(), Value::Str("ImageCollection".into()));
                dict.insert(
                    "images".to_string(),
                    Value::List(c.images.iter().map(image_info).collect()),
                );
                dict.insert("properties".to_string(), Value::Dict(props_info(&c.props)));
                Ok(Value::Dict(dict))
            }
            EvalValue::Feature(f) => Ok(feature_info(&f)),
            EvalValue::Features(fs) => {
                let mut dict = BTreeMap::new();
                dict.insert("type".to_string(), Value::Str("FeatureCollection".into()));
                dict.insert(
                    "features".to_string(),
                    Value::List(fs.iter().map(feature_info).collect()),
                );
                Ok(Value::Dict(dict))
            }
            EvalValue::Geometry(g) => {
                let mut dict = BTreeMap::new();
                match g {
                    Geom::Everything => {
                        dict.insert("type".to_string(), Value::Str("Everything".into()));
                    }
                    Geom::Rect { x0, y0, x1, y1 } => {
                        dict.insert("type".to_string(), Value::Str("Rectangle".into()));
                        dict.insert(
                            "coordinates".to_string(),
                            Value::List(vec![
                                Value::Float(x0),
                                Value::Float(y0),
                                Value::Float(x1),
                                Value::Float(y1),
                            ]),
                        );
                    }
                }
                Ok(Value::Dict(dict))
            }
            EvalValue::Filter(_) | EvalValue::Func { .. } => {
                Err(err("expression does not materialize to a value"))
            }
        }
    }
}

impl Engine for MemoryEngine {
    fn evaluate(&self, expr: &Expr) -> Result<Value> {
        let ev = self.eval(expr, &Env::new())?;
        self.to_value(ev)
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn as_plain(ev: &EvalValue) -> Result<Value> {
    match ev {
        EvalValue::Val(v) => Ok(v.clone()),
        _ => Err(err("expected a plain value")),
    }
}

fn as_num(ev: &EvalValue) -> Result<f64> {
    as_plain(ev)?
        .as_f64()
        .ok_or_else(|| err("expected a number"))
}

fn as_int(ev: &EvalValue) -> Result<i64> {
    as_plain(ev)?
        .as_i64()
        .ok_or_else(|| err("expected an integer"))
}

fn as_string(ev: &EvalValue) -> Result<String> {
    match as_plain(ev)? {
        Value::Str(s) => Ok(s),
        other => Err(err(format!("expected a string, got {other:?}"))),
    }
}

fn as_list(ev: EvalValue) -> Result<Vec<EvalValue>> {
    match ev {
        EvalValue::List(items) => Ok(items),
        EvalValue::Val(Value::List(items)) => {
            Ok(items.into_iter().map(EvalValue::Val).collect())
        }
        _ => Err(err("expected a list")),
    }
}

fn as_strings(ev: EvalValue) -> Result<Vec<String>> {
    as_list(ev)?.iter().map(as_string).collect()
}

fn as_image(ev: EvalValue) -> Result<ImageData> {
    match ev {
        EvalValue::Image(img) => Ok(img),
        _ => Err(err("expected an image")),
    }
}

fn as_collection(ev: EvalValue) -> Result<CollectionData> {
    match ev {
        EvalValue::Collection(c) => Ok(c),
        _ => Err(err("expected an image collection")),
    }
}

fn as_geometry(ev: &EvalValue) -> Result<Geom> {
    match ev {
        EvalValue::Geometry(g) => Ok(*g),
        _ => Err(err("expected a geometry")),
    }
}

fn as_filter(ev: EvalValue) -> Result<FilterData> {
    match ev {
        EvalValue::Filter(f) => Ok(f),
        _ => Err(err("expected a filter")),
    }
}

fn as_features(ev: EvalValue) -> Result<Vec<FeatureData>> {
    match ev {
        EvalValue::Features(fs) => Ok(fs),
        _ => Err(err("expected a feature collection")),
    }
}

fn as_dict(ev: &EvalValue) -> Result<&BTreeMap<String, Value>> {
    match ev {
        EvalValue::Val(Value::Dict(d)) => Ok(d),
        _ => Err(err("expected a dictionary")),
    }
}

fn as_reducer(ev: &EvalValue) -> Result<Reducer> {
    as_string(ev)?.parse()
}

fn truthy(v: &Value) -> Result<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        _ => v
            .as_f64()
            .map(|n| n != 0.0)
            .ok_or_else(|| err("expected a boolean")),
    }
}

fn resolve_index(index: i64, len: usize) -> Result<usize> {
    let idx = if index < 0 { len as i64 + index } else { index };
    if idx < 0 || idx as usize >= len {
        return Err(err(format!("list index {index} out of range for length {len}")));
    }
    Ok(idx as usize)
}

fn to_datetime(millis: i64) -> Result<chrono::DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| err(format!("timestamp out of range: {millis}")))
}

fn flatten_into(item: EvalValue, out: &mut Vec<EvalValue>) {
    match item {
        EvalValue::List(items) => {
            for i in items {
                flatten_into(i, out);
            }
        }
        EvalValue::Val(Value::List(items)) => {
            for i in items {
                flatten_into(EvalValue::Val(i), out);
            }
        }
        other => out.push(other),
    }
}

fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => match (a, b) {
            (Value::Str(x), Value::Str(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn filter_matches(filter: &FilterData, get: &dyn Fn(&str) -> Option<Value>) -> bool {
    match filter {
        FilterData::Cmp(op, name, expected) => match get(name) {
            Some(actual) => {
                let ord = order_values(&actual, expected);
                match op {
                    CmpOp::Eq => actual.loosely_eq(expected),
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Lte => ord != Ordering::Greater,
                    CmpOp::Gte => ord != Ordering::Less,
                }
            }
            None => false,
        },
        FilterData::ListContains(name, expected) => match get(name) {
            Some(Value::List(items)) => items.iter().any(|i| i.loosely_eq(expected)),
            _ => false,
        },
        FilterData::StartsWith(name, expected) => match (get(name), expected) {
            (Some(Value::Str(s)), Value::Str(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
        FilterData::All(parts) => parts.iter().all(|p| filter_matches(p, get)),
        FilterData::Any(parts) => parts.iter().any(|p| filter_matches(p, get)),
    }
}

fn filter_matches_props(filter: &FilterData, props: &BTreeMap<String, Prop>) -> bool {
    filter_matches(filter, &|name| match props.get(name) {
        Some(Prop::Value(v)) => Some(v.clone()),
        _ => None,
    })
}

/// Filtering over list elements: elements with property bags match on their
/// properties, bare values match the pseudo-property `"item"`.
fn filter_matches_element(filter: &FilterData, item: &EvalValue) -> bool {
    match item {
        EvalValue::Image(img) => filter_matches_props(filter, &img.props),
        EvalValue::Collection(c) => filter_matches_props(filter, &c.props),
        EvalValue::Feature(f) => filter_matches(filter, &|name| f.props.get(name).cloned()),
        EvalValue::Val(v) => filter_matches(filter, &|name| {
            (name == "item").then(|| v.clone())
        }),
        _ => false,
    }
}

fn property_bags(ev: &EvalValue) -> Result<Vec<BTreeMap<String, Value>>> {
    match ev {
        EvalValue::Collection(c) => Ok(c
            .images
            .iter()
            .map(|img| {
                img.props
                    .iter()
                    .filter_map(|(k, p)| match p {
                        Prop::Value(v) => Some((k.clone(), v.clone())),
                        Prop::Image(_) => None,
                    })
                    .collect()
            })
            .collect()),
        EvalValue::Features(fs) => Ok(fs.iter().map(|f| f.props.clone()).collect()),
        _ => Err(err("expected a collection")),
    }
}

fn element_props(ev: &EvalValue) -> Result<BTreeMap<String, Prop>> {
    match ev {
        EvalValue::Image(img) => Ok(img.props.clone()),
        EvalValue::Collection(c) => Ok(c.props.clone()),
        EvalValue::Feature(f) => Ok(f
            .props
            .iter()
            .map(|(k, v)| (k.clone(), Prop::Value(v.clone())))
            .collect()),
        _ => Err(err("expected an element")),
    }
}

// ---------------------------------------------------------------------------
// Raster operations
// ---------------------------------------------------------------------------

fn broadcast_dims(a: &ImageData, b: &ImageData) -> Result<(usize, usize)> {
    if a.width == b.width && a.height == b.height {
        Ok((a.width, a.height))
    } else if a.pixels() == 1 {
        Ok((b.width, b.height))
    } else if b.pixels() == 1 {
        Ok((a.width, a.height))
    } else {
        Err(err(format!(
            "image dimensions mismatch: {}x{} vs {}x{}",
            a.width, a.height, b.width, b.height
        )))
    }
}

fn common_dims(images: &[ImageData]) -> Result<(usize, usize)> {
    let mut dims = (1, 1);
    for img in images {
        if img.pixels() > 1 {
            if dims == (1, 1) {
                dims = (img.width, img.height);
            } else if dims != (img.width, img.height) {
                return Err(err("collection images have mismatched dimensions"));
            }
        }
    }
    Ok(dims)
}

fn image_unary(image: &ImageData, f: impl Fn(f64) -> f64) -> ImageData {
    let bands = image
        .bands
        .iter()
        .map(|b| BandData {
            name: b.name.clone(),
            values: b.values.iter().map(|v| f(*v)).collect(),
            mask: b.mask.clone(),
        })
        .collect();
    ImageData {
        width: image.width,
        height: image.height,
        bands,
        props: BTreeMap::new(),
    }
}

/// Pairwise band combination: equal band counts pair positionally, a
/// single-band right operand broadcasts. Names come from the left operand,
/// masks are intersected. Algebra output carries no metadata; callers that
/// need the source properties copy them back explicitly.
fn image_binary(a: &ImageData, b: &ImageData, f: impl Fn(f64, f64) -> f64) -> Result<ImageData> {
    let (width, height) = broadcast_dims(a, b)?;
    let n = width * height;
    let pairs: Vec<(&BandData, &BandData)> = if a.bands.len() == b.bands.len() {
        a.bands.iter().zip(b.bands.iter()).collect()
    } else if b.bands.len() == 1 {
        a.bands.iter().map(|ab| (ab, &b.bands[0])).collect()
    } else {
        return Err(err(format!(
            "band count mismatch: {} vs {}",
            a.bands.len(),
            b.bands.len()
        )));
    };
    let bands = pairs
        .into_iter()
        .map(|(ab, bb)| {
            let mut values = Vec::with_capacity(n);
            let mut mask = Vec::with_capacity(n);
            for i in 0..n {
                let (av, am) = ab.sample(i);
                let (bv, bm) = bb.sample(i);
                values.push(f(av, bv));
                mask.push(am && bm);
            }
            BandData {
                name: ab.name.clone(),
                values,
                mask,
            }
        })
        .collect();
    Ok(ImageData {
        width,
        height,
        bands,
        props: BTreeMap::new(),
    })
}

fn update_mask(image: &ImageData, mask: &ImageData) -> Result<ImageData> {
    let (width, height) = broadcast_dims(image, mask)?;
    let n = width * height;
    let pick = |i: usize| -> Result<&BandData> {
        if mask.bands.len() == 1 {
            Ok(&mask.bands[0])
        } else {
            mask.bands
                .get(i)
                .ok_or_else(|| err("mask band count mismatch"))
        }
    };
    if mask.bands.len() != 1 && mask.bands.len() != image.bands.len() {
        return Err(err("mask band count mismatch"));
    }
    let bands = image
        .bands
        .iter()
        .enumerate()
        .map(|(bi, band)| {
            let mband = pick(bi)?;
            let mut values = Vec::with_capacity(n);
            let mut masked = Vec::with_capacity(n);
            for i in 0..n {
                let (v, m) = band.sample(i);
                let (mv, mm) = mband.sample(i);
                values.push(v);
                masked.push(m && mm && mv != 0.0);
            }
            Ok(BandData {
                name: band.name.clone(),
                values,
                mask: masked,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ImageData {
        width,
        height,
        bands,
        props: image.props.clone(),
    })
}

fn select_bands(image: &ImageData, names: &[String]) -> Result<ImageData> {
    let bands = names
        .iter()
        .map(|name| {
            image
                .band(name)
                .cloned()
                .ok_or_else(|| err(format!("band not found: {name}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ImageData {
        bands,
        ..image.clone()
    })
}

fn clip(image: &ImageData, geom: Geom) -> ImageData {
    let n = image.pixels();
    let bands = image
        .bands
        .iter()
        .map(|band| {
            let (values, mut mask) = image.expanded(band);
            for i in 0..n {
                let (x, y) = (i % image.width, i / image.width);
                mask[i] = mask[i] && geom.contains(x, y);
            }
            BandData {
                name: band.name.clone(),
                values,
                mask,
            }
        })
        .collect();
    ImageData {
        bands,
        ..image.clone()
    }
}

/// Number of outputs a reducer produces per input.
fn reducer_outputs(reducer: Reducer) -> usize {
    match reducer {
        Reducer::MinMax => 2,
        _ => 1,
    }
}

/// Output name suffixes, matching the `_<reducer>` convention.
fn reducer_suffixes(reducer: Reducer) -> Vec<&'static str> {
    match reducer {
        Reducer::MinMax => vec!["min", "max"],
        other => vec![other.name()],
    }
}

/// Apply a reducer to a non-empty slice (empty is allowed for `count`).
fn apply_reducer(reducer: Reducer, vals: &[f64]) -> Vec<f64> {
    let n = vals.len() as f64;
    match reducer {
        Reducer::Count => vec![vals.len() as f64],
        Reducer::Mean => vec![vals.iter().sum::<f64>() / n],
        Reducer::Sum => vec![vals.iter().sum()],
        Reducer::Min => vec![vals.iter().cloned().fold(f64::INFINITY, f64::min)],
        Reducer::Max => vec![vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max)],
        Reducer::MinMax => vec![
            vals.iter().cloned().fold(f64::INFINITY, f64::min),
            vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        ],
        Reducer::First => vec![vals[0]],
        Reducer::Median => {
            let mut sorted = vals.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 1 {
                vec![sorted[mid]]
            } else {
                vec![(sorted[mid - 1] + sorted[mid]) / 2.0]
            }
        }
        Reducer::StdDev => {
            // population standard deviation
            let mean = vals.iter().sum::<f64>() / n;
            let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            vec![var.sqrt()]
        }
    }
}

/// Reduce across the bands of one image into `reducer_outputs` bands named
/// after the reducer.
fn reduce_bands(image: &ImageData, reducer: Reducer) -> ImageData {
    let n = image.pixels();
    let outputs = reducer_outputs(reducer);
    let mut values = vec![Vec::with_capacity(n); outputs];
    let mut mask = vec![Vec::with_capacity(n); outputs];
    for i in 0..n {
        let vals: Vec<f64> = image
            .bands
            .iter()
            .filter_map(|b| {
                let (v, m) = b.sample(i);
                m.then_some(v)
            })
            .collect();
        let valid = !vals.is_empty() || reducer == Reducer::Count;
        let outs = if valid {
            apply_reducer(reducer, &vals)
        } else {
            vec![0.0; outputs]
        };
        for (o, out) in outs.into_iter().enumerate() {
            values[o].push(out);
            mask[o].push(valid);
        }
    }
    let bands = reducer_suffixes(reducer)
        .into_iter()
        .zip(values.into_iter().zip(mask))
        .map(|(suffix, (values, mask))| BandData {
            name: suffix.to_string(),
            values,
            mask,
        })
        .collect();
    ImageData {
        width: image.width,
        height: image.height,
        bands,
        props: BTreeMap::new(),
    }
}

/// Pixel-wise reduction across a stack of images, band by band name of the
/// first image. Output bands carry the `_<reducer>` suffix.
fn reduce_collection(images: &[ImageData], reducer: Reducer) -> Result<ImageData> {
    let Some(first) = images.first() else {
        return Ok(ImageData::new(1, 1));
    };
    let (width, height) = common_dims(images)?;
    let n = width * height;
    let suffixes = reducer_suffixes(reducer);
    let mut bands = Vec::new();
    for band in &first.bands {
        let sources: Vec<&BandData> = images.iter().filter_map(|img| img.band(&band.name)).collect();
        let mut values = vec![Vec::with_capacity(n); suffixes.len()];
        let mut mask = vec![Vec::with_capacity(n); suffixes.len()];
        for i in 0..n {
            let vals: Vec<f64> = sources
                .iter()
                .filter_map(|b| {
                    let (v, m) = b.sample(i);
                    m.then_some(v)
                })
                .collect();
            let valid = !vals.is_empty() || reducer == Reducer::Count;
            let outs = if valid {
                apply_reducer(reducer, &vals)
            } else {
                vec![0.0; suffixes.len()]
            };
            for (o, out) in outs.into_iter().enumerate() {
                values[o].push(out);
                mask[o].push(valid);
            }
        }
        for (suffix, (values, mask)) in suffixes.iter().zip(values.into_iter().zip(mask)) {
            bands.push(BandData {
                name: format!("{}_{}", band.name, suffix),
                values,
                mask,
            });
        }
    }
    Ok(ImageData {
        width,
        height,
        bands,
        props: BTreeMap::new(),
    })
}

/// Last-on-top composite over the band names of the first image.
fn mosaic(images: &[ImageData]) -> Result<ImageData> {
    let Some(first) = images.first() else {
        return Ok(ImageData::new(1, 1));
    };
    let (width, height) = common_dims(images)?;
    let n = width * height;
    let bands = first
        .bands
        .iter()
        .map(|band| {
            let mut values = Vec::with_capacity(n);
            let mut mask = Vec::with_capacity(n);
            for i in 0..n {
                let mut chosen = None;
                for img in images.iter().rev() {
                    if let Some(b) = img.band(&band.name) {
                        let (v, m) = b.sample(i);
                        if m {
                            chosen = Some(v);
                            break;
                        }
                    }
                }
                values.push(chosen.unwrap_or(0.0));
                mask.push(chosen.is_some());
            }
            BandData {
                name: band.name.clone(),
                values,
                mask,
            }
        })
        .collect();
    Ok(ImageData {
        width,
        height,
        bands,
        props: BTreeMap::new(),
    })
}

/// Per-pixel argmax composite keyed on `quality`; the earliest image wins
/// ties. Output bands are those of the first image.
fn quality_mosaic(images: &[ImageData], quality: &str) -> Result<ImageData> {
    if images.is_empty() {
        return Err(err("qualityMosaic over an empty collection"));
    }
    let (width, height) = common_dims(images)?;
    let n = width * height;
    let first = &images[0];
    // chosen image index per pixel
    let mut choice: Vec<Option<usize>> = vec![None; n];
    for i in 0..n {
        let mut best = f64::NEG_INFINITY;
        for (j, img) in images.iter().enumerate() {
            let Some(q) = img.band(quality) else {
                return Err(err(format!("quality band not found: {quality}")));
            };
            let (v, m) = q.sample(i);
            if m && v > best {
                best = v;
                choice[i] = Some(j);
            }
        }
    }
    let bands = first
        .bands
        .iter()
        .map(|band| {
            let mut values = Vec::with_capacity(n);
            let mut mask = Vec::with_capacity(n);
            for i in 0..n {
                match choice[i].and_then(|j| images[j].band(&band.name)) {
                    Some(b) => {
                        let (v, m) = b.sample(i);
                        values.push(v);
                        mask.push(m);
                    }
                    None => {
                        values.push(0.0);
                        mask.push(false);
                    }
                }
            }
            BandData {
                name: band.name.clone(),
                values,
                mask,
            }
        })
        .collect();
    Ok(ImageData {
        width,
        height,
        bands,
        props: BTreeMap::new(),
    })
}

/// Stack every band of every image, names `<index>_<band>` where the index
/// is the image's `system:index` property or its position.
fn to_bands(images: &[ImageData]) -> Result<ImageData> {
    if images.is_empty() {
        return Ok(ImageData::new(1, 1));
    }
    let (width, height) = common_dims(images)?;
    let mut bands = Vec::new();
    for (pos, img) in images.iter().enumerate() {
        let prefix = match img.property("system:index") {
            Some(Value::Str(s)) => s.clone(),
            _ => pos.to_string(),
        };
        for band in &img.bands {
            let (values, mask) = img.expanded(band);
            bands.push(BandData {
                name: format!("{}_{}", prefix, band.name),
                values,
                mask,
            });
        }
    }
    Ok(ImageData {
        width,
        height,
        bands,
        props: BTreeMap::new(),
    })
}

fn sort_collection(collection: CollectionData, property: &str) -> Result<CollectionData> {
    let keys = collection
        .images
        .iter()
        .map(|img| {
            img.property(property)
                .cloned()
                .ok_or_else(|| err(format!("sort property missing: {property}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let mut keyed: Vec<(Value, ImageData)> = keys.into_iter().zip(collection.images).collect();
    keyed.sort_by(|(a, _), (b, _)| order_values(a, b));
    Ok(CollectionData {
        images: keyed.into_iter().map(|(_, img)| img).collect(),
        props: collection.props,
    })
}

/// Aggregate the unmasked pixels inside `geom`, one entry per band; bands
/// with no contributing pixels map to null.
fn reduce_region(image: &ImageData, reducer: Reducer, geom: Geom) -> BTreeMap<String, Value> {
    let n = image.pixels();
    let mut out = BTreeMap::new();
    for band in &image.bands {
        let mut vals = Vec::new();
        for i in 0..n {
            let (x, y) = (i % image.width, i / image.width);
            let (v, m) = band.sample(i);
            if m && geom.contains(x, y) {
                vals.push(v);
            }
        }
        let keys: Vec<String> = match reducer {
            Reducer::MinMax => vec![format!("{}_min", band.name), format!("{}_max", band.name)],
            _ => vec![band.name.clone()],
        };
        if vals.is_empty() && reducer != Reducer::Count {
            for k in keys {
                out.insert(k, Value::Null);
            }
        } else {
            let outs = apply_reducer(reducer, &vals);
            for (k, v) in keys.into_iter().zip(outs) {
                let value = if reducer == Reducer::Count {
                    Value::Int(v as i64)
                } else {
                    Value::Float(v)
                };
                out.insert(k, value);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Materialized metadata shapes
// ---------------------------------------------------------------------------

fn props_info(props: &BTreeMap<String, Prop>) -> BTreeMap<String, Value> {
    props
        .iter()
        .map(|(k, p)| {
            let v = match p {
                Prop::Value(v) => v.clone(),
                Prop::Image(img) => image_info(img),
            };
            (k.clone(), v)
        })
        .collect()
}

fn image_info(image: &ImageData) -> Value {
    let mut dict = BTreeMap::new();
    dict.insert("type".to_string(), Value::Str("Image".into()));
    dict.insert(
        "bands".to_string(),
        Value::List(
            image
                .bands
                .iter()
                .map(|b| Value::Str(b.name.clone()))
                .collect(),
        ),
    );
    dict.insert("properties".to_string(), Value::Dict(props_info(&image.props)));
    Value::Dict(dict)
}

fn feature_info(feature: &FeatureData) -> Value {
    let mut dict = BTreeMap::new();
    dict.insert("type".to_string(), Value::Str("Feature".into()));
    dict.insert(
        "properties".to_string(),
        Value::Dict(feature.props.clone()),
    );
    Value::Dict(dict)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Filter, Geometry, Handle, Image, ImageCollection, List, ReduceRegionOpts};
    use crate::TIME_START;

    fn engine_with(images: Vec<ImageData>) -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        engine.insert_collection("test/collection", images);
        engine
    }

    fn img1(value: f64, time: i64) -> ImageData {
        ImageData::new(1, 1)
            .with_band("B1", vec![value])
            .with_property(TIME_START, time)
    }

    #[test]
    fn constant_algebra_broadcasts() {
        let engine = MemoryEngine::new();
        let expr = Image::constant(2.0).add(Image::constant(3.0)).multiply(4.0);
        let img = engine.evaluate_image(expr.expr()).unwrap();
        assert_eq!(img.band("constant").unwrap().values, vec![20.0]);
    }

    #[test]
    fn binary_keeps_left_names_and_masks() {
        let engine = MemoryEngine::new();
        let a = ImageData::new(2, 1)
            .with_band("B1", vec![1.0, 2.0])
            .with_masked_band("B2", vec![5.0, 6.0], vec![true, false]);
        let b = ImageData::new(2, 1)
            .with_band("x", vec![10.0, 10.0])
            .with_band("y", vec![1.0, 1.0]);
        let mut engine2 = engine;
        engine2.insert_collection("a", vec![a]);
        engine2.insert_collection("b", vec![b]);
        let expr = ImageCollection::load("a")
            .first()
            .add(ImageCollection::load("b").first());
        let img = engine2.evaluate_image(expr.expr()).unwrap();
        assert_eq!(img.band_names(), vec!["B1", "B2"]);
        assert_eq!(img.band("B1").unwrap().values, vec![11.0, 12.0]);
        assert_eq!(img.band("B2").unwrap().mask, vec![true, false]);
    }

    #[test]
    fn collection_reduce_suffixes_and_population_stddev() {
        let values = [1.0, 5.0, 6.0, 4.0, 7.0, 10.0];
        let images = values.iter().enumerate().map(|(i, v)| img1(*v, i as i64)).collect();
        let engine = engine_with(images);
        let collection = ImageCollection::load("test/collection");

        let mean = engine
            .evaluate_image(collection.reduce(Reducer::Mean).expr())
            .unwrap();
        assert_eq!(mean.band_names(), vec!["B1_mean"]);
        assert!((mean.band("B1_mean").unwrap().values[0] - 5.5).abs() < 1e-9);

        let sd = engine
            .evaluate_image(collection.reduce(Reducer::StdDev).expr())
            .unwrap();
        let expected = (values.iter().map(|v| (v - 5.5f64).powi(2)).sum::<f64>() / 6.0).sqrt();
        assert!((sd.band("B1_stdDev").unwrap().values[0] - expected).abs() < 1e-9);

        let minmax = engine
            .evaluate_image(collection.reduce(Reducer::MinMax).expr())
            .unwrap();
        assert_eq!(minmax.band_names(), vec!["B1_min", "B1_max"]);
    }

    #[test]
    fn mosaic_is_last_on_top() {
        let a = ImageData::new(2, 1).with_masked_band("B1", vec![1.0, 1.0], vec![true, true]);
        let b = ImageData::new(2, 1).with_masked_band("B1", vec![2.0, 2.0], vec![true, false]);
        let engine = engine_with(vec![a, b]);
        let img = engine
            .evaluate_image(ImageCollection::load("test/collection").mosaic().expr())
            .unwrap();
        assert_eq!(img.band("B1").unwrap().values, vec![2.0, 1.0]);
    }

    #[test]
    fn reduce_region_respects_geometry_and_masks() {
        let img = ImageData::new(2, 2).with_masked_band(
            "B1",
            vec![1.0, 2.0, 3.0, 4.0],
            vec![true, true, true, false],
        );
        let engine = engine_with(vec![img]);
        let image = ImageCollection::load("test/collection").first();

        let all = image.reduce_region(
            Reducer::Sum,
            &Geometry::everything(),
            &ReduceRegionOpts::default(),
        );
        let Value::Dict(d) = engine.evaluate(all.expr()).unwrap() else {
            panic!("expected a dictionary")
        };
        assert_eq!(d["B1"], Value::Float(6.0));

        // left column only: pixels (0,0)=1 and (0,1)=3
        let left = image.reduce_region(
            Reducer::Sum,
            &Geometry::rectangle(0.0, 0.0, 1.0, 2.0),
            &ReduceRegionOpts::with_scale(10.0),
        );
        let Value::Dict(d) = engine.evaluate(left.expr()).unwrap() else {
            panic!("expected a dictionary")
        };
        assert_eq!(d["B1"], Value::Float(4.0));
    }

    #[test]
    fn date_range_list_bucket_counts() {
        let engine = MemoryEngine::new();
        let step = 1000i64;

        // span of exactly one step: one bucket
        let expr = Expr::call(
            Op::DateRangeList,
            vec![Expr::literal(0i64), Expr::literal(step), Expr::literal(step)],
        );
        let Value::List(buckets) = engine.evaluate(&expr).unwrap() else {
            panic!("expected a list")
        };
        assert_eq!(buckets.len(), 1);
        // final bucket is closed
        assert_eq!(buckets[0], Value::List(vec![Value::Int(0), Value::Int(step + 1)]));

        // double span: two buckets
        let expr = Expr::call(
            Op::DateRangeList,
            vec![
                Expr::literal(0i64),
                Expr::literal(2 * step),
                Expr::literal(step),
            ],
        );
        let Value::List(buckets) = engine.evaluate(&expr).unwrap() else {
            panic!("expected a list")
        };
        assert_eq!(buckets.len(), 2);

        // zero span still yields one bucket
        let expr = Expr::call(
            Op::DateRangeList,
            vec![Expr::literal(5i64), Expr::literal(5i64), Expr::literal(step)],
        );
        let Value::List(buckets) = engine.evaluate(&expr).unwrap() else {
            panic!("expected a list")
        };
        assert_eq!(buckets.len(), 1);
    }

    #[test]
    fn list_ops() {
        let engine = MemoryEngine::new();

        let seq = List::sequence(0i64, 3i64);
        assert_eq!(
            engine.evaluate(seq.expr()).unwrap(),
            Value::List(vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3)])
        );

        let nested = List::repeat(List::repeat(7i64, 2i64), 2i64);
        assert_eq!(
            engine.evaluate(nested.flatten().expr()).unwrap(),
            Value::List(vec![Value::Int(7); 4])
        );

        let dup = List::of(vec![
            Expr::literal(3i64),
            Expr::literal(1i64),
            Expr::literal(3.0f64),
        ]);
        assert_eq!(
            engine.evaluate(dup.distinct().expr()).unwrap(),
            Value::List(vec![Value::Int(3), Value::Int(1)])
        );
    }

    #[test]
    fn string_keys_filter_on_item() {
        let engine = MemoryEngine::new();
        let keys = List::strings(&["site_a_B1", "site_a_B2", "site_b_B1"]);
        let filtered = keys.filter(&Filter::string_starts_with("item", "site_a"));
        assert_eq!(
            engine.evaluate(filtered.expr()).unwrap(),
            Value::List(vec![Value::Str("site_a_B1".into()), Value::Str("site_a_B2".into())])
        );
    }

    #[test]
    fn collection_filter_and_sort_by_property() {
        let images = vec![img1(1.0, 300), img1(2.0, 100), img1(3.0, 200)];
        let engine = engine_with(images);
        let collection = ImageCollection::load("test/collection");

        let sorted = collection.sort(TIME_START);
        let data = engine.evaluate_collection(sorted.expr()).unwrap();
        let times: Vec<i64> = data
            .images()
            .iter()
            .map(|i| i.property(TIME_START).unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(times, vec![100, 200, 300]);

        let windowed = collection.filter_date(100i64, 300i64);
        let data = engine.evaluate_collection(windowed.expr()).unwrap();
        assert_eq!(data.images().len(), 2);

        let gt = collection.filter(&Filter::gt(TIME_START, 150i64));
        let data = engine.evaluate_collection(gt.expr()).unwrap();
        assert_eq!(data.images().len(), 2);
    }

    #[test]
    fn to_bands_prefixes_with_index() {
        let images = vec![img1(1.0, 0), img1(2.0, 1)];
        let engine = engine_with(images);
        let img = engine
            .evaluate_image(ImageCollection::load("test/collection").to_bands().expr())
            .unwrap();
        assert_eq!(img.band_names(), vec!["0_B1", "1_B1"]);
    }

    #[test]
    fn iterate_threads_the_accumulator() {
        let images = vec![img1(1.0, 0), img1(2.0, 1), img1(3.0, 2)];
        let engine = engine_with(images);
        let total = ImageCollection::load("test/collection")
            .iterate(|image, acc| acc.add(&image), Image::constant(0.0));
        let img = engine.evaluate_image(total.expr()).unwrap();
        assert_eq!(img.band("constant").unwrap().values, vec![6.0]);
    }

    #[test]
    fn quality_mosaic_picks_argmax() {
        let a = ImageData::new(1, 1)
            .with_band("B1", vec![10.0])
            .with_band("q", vec![1.0]);
        let b = ImageData::new(1, 1)
            .with_band("B1", vec![20.0])
            .with_band("q", vec![5.0]);
        let engine = engine_with(vec![a, b]);
        let img = engine
            .evaluate_image(
                ImageCollection::load("test/collection")
                    .quality_mosaic("q")
                    .expr(),
            )
            .unwrap();
        assert_eq!(img.band("B1").unwrap().values, vec![20.0]);
    }
}
