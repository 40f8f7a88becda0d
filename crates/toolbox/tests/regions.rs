//! Stack/batch/unstack exports against the in-memory engine.

use std::collections::BTreeMap;

use eetools_core::engine::{ImageData, MemoryEngine};
use eetools_core::prelude::*;
use eetools_core::TIME_START;
use eetools_toolbox::{ImageCollectionExt, KeyedRegionOpts};

const DAY: i64 = 86_400_000;

fn dict(value: Value) -> BTreeMap<String, Value> {
    match value {
        Value::Dict(d) => d,
        other => panic!("expected a dictionary, got {other:?}"),
    }
}

fn nested(engine: &MemoryEngine, d: &Dictionary) -> BTreeMap<String, BTreeMap<String, Value>> {
    dict(engine.evaluate(d.expr()).unwrap())
        .into_iter()
        .map(|(k, v)| (k, dict(v)))
        .collect()
}

/// One-pixel single-band images with a timestamp each.
fn series(engine: &mut MemoryEngine, name: &str, band: &str, values: &[f64], times: &[i64]) {
    let images = values
        .iter()
        .zip(times)
        .map(|(v, t)| {
            ImageData::new(1, 1)
                .with_band(band, vec![*v])
                .with_property(TIME_START, *t)
        })
        .collect();
    engine.insert_collection(name, images);
}

fn site(name: &str) -> Value {
    Value::Dict(BTreeMap::from([(
        "name".to_string(),
        Value::Str(name.to_string()),
    )]))
}

#[test]
fn dates_by_bands_keys_values_by_formatted_date() {
    let mut engine = MemoryEngine::new();
    series(&mut engine, "series", "B1", &[3.0, 5.0], &[0, DAY]);
    let ic = ImageCollection::load("series");
    let table = ic.dates_by_bands(
        &Geometry::everything(),
        Reducer::Mean,
        &ReduceRegionOpts::default(),
        TIME_START,
        None,
        None,
    );
    let got = nested(&engine, &table);
    assert_eq!(got.len(), 1);
    let b1 = &got["B1"];
    assert_eq!(b1["1970-01-01T00-00-00"], Value::Float(3.0));
    assert_eq!(b1["1970-01-02T00-00-00"], Value::Float(5.0));
}

#[test]
fn dates_by_regions_keys_values_by_feature_label() {
    let mut engine = MemoryEngine::new();
    engine.insert_collection(
        "wide",
        vec![
            ImageData::new(2, 1)
                .with_band("B1", vec![1.0, 2.0])
                .with_property(TIME_START, 0i64),
            ImageData::new(2, 1)
                .with_band("B1", vec![3.0, 4.0])
                .with_property(TIME_START, DAY),
        ],
    );
    let regions = FeatureCollection::of(vec![
        Feature::new(&Geometry::rectangle(0.0, 0.0, 1.0, 1.0), site("site_a")),
        Feature::new(&Geometry::rectangle(1.0, 0.0, 2.0, 1.0), site("site_b")),
    ]);
    let ic = ImageCollection::load("wide");
    let table = ic.dates_by_regions("B1", &regions, "name", Reducer::First, 1.0, TIME_START);
    let got = nested(&engine, &table);
    assert_eq!(got["site_a"]["1970-01-01T00-00-00"], Value::Float(1.0));
    assert_eq!(got["site_a"]["1970-01-02T00-00-00"], Value::Float(3.0));
    assert_eq!(got["site_b"]["1970-01-01T00-00-00"], Value::Float(2.0));
    assert_eq!(got["site_b"]["1970-01-02T00-00-00"], Value::Float(4.0));
}

#[test]
fn doy_by_bands_merges_shared_days_and_drops_empty_ones() {
    let mut engine = MemoryEngine::new();
    // two images on day 4, one on day 10, every other day empty
    series(
        &mut engine,
        "series",
        "B1",
        &[2.0, 4.0, 6.0],
        &[4 * DAY, 4 * DAY + 1000, 10 * DAY],
    );
    let ic = ImageCollection::load("series");
    let table = ic.doy_by_bands(
        &Geometry::everything(),
        Reducer::Mean,
        Reducer::Mean,
        &ReduceRegionOpts::default(),
        TIME_START,
        None,
        None,
    );
    let got = nested(&engine, &table);
    let b1 = &got["B1"];
    assert_eq!(b1.len(), 2);
    assert_eq!(b1["4"], Value::Float(3.0));
    assert_eq!(b1["10"], Value::Float(6.0));
}

#[test]
fn doy_by_regions_reduces_each_feature() {
    let mut engine = MemoryEngine::new();
    engine.insert_collection(
        "wide",
        vec![
            ImageData::new(2, 1)
                .with_band("B1", vec![1.0, 2.0])
                .with_property(TIME_START, 4 * DAY),
            ImageData::new(2, 1)
                .with_band("B1", vec![3.0, 4.0])
                .with_property(TIME_START, 10 * DAY),
        ],
    );
    let regions = FeatureCollection::of(vec![
        Feature::new(&Geometry::rectangle(0.0, 0.0, 1.0, 1.0), site("site_a")),
        Feature::new(&Geometry::rectangle(1.0, 0.0, 2.0, 1.0), site("site_b")),
    ]);
    let ic = ImageCollection::load("wide");
    let table = ic.doy_by_regions(
        "B1",
        &regions,
        "name",
        Reducer::Mean,
        Reducer::First,
        1.0,
        TIME_START,
    );
    let got = nested(&engine, &table);
    assert_eq!(got["site_a"]["4"], Value::Float(1.0));
    assert_eq!(got["site_a"]["10"], Value::Float(3.0));
    assert_eq!(got["site_b"]["4"], Value::Float(2.0));
    assert_eq!(got["site_b"]["10"], Value::Float(4.0));
}

#[test]
fn doy_by_years_splits_the_same_day_across_years() {
    let mut engine = MemoryEngine::new();
    // day 4 of 1970 and day 4 of 1971
    series(
        &mut engine,
        "series",
        "B1",
        &[7.0, 9.0],
        &[4 * DAY, 369 * DAY],
    );
    let ic = ImageCollection::load("series");
    let table = ic.doy_by_years(
        "B1",
        &Geometry::everything(),
        Reducer::Mean,
        &ReduceRegionOpts::default(),
        TIME_START,
    );
    let got = nested(&engine, &table);
    assert_eq!(got.len(), 2);
    assert_eq!(got["1970"]["4"], Value::Float(7.0));
    assert_eq!(got["1971"]["4"], Value::Float(9.0));
}

#[test]
fn keyed_reduce_region_unstacks_ids_and_bands_with_underscores() {
    let mut engine = MemoryEngine::new();
    engine.insert_collection(
        "sites",
        vec![
            ImageData::new(1, 1)
                .with_band("Red_Edge2", vec![1.0])
                .with_property("site", "Site_A"),
            ImageData::new(1, 1)
                .with_band("Red_Edge2", vec![2.0])
                .with_property("site", "Site_A"),
            ImageData::new(1, 1)
                .with_band("Red_Edge2", vec![3.0])
                .with_property("site", "site_b"),
        ],
    );
    let ic = ImageCollection::load("sites");
    let opts = KeyedRegionOpts {
        id_property: "site".to_string(),
        ..KeyedRegionOpts::default()
    };
    let table = ImageCollectionExt::reduce_region(&ic, Reducer::Mean, &Geometry::everything(), &opts);
    let got = nested(&engine, &table);
    assert_eq!(got.len(), 2);
    // duplicates collapse through the pre-reduction (First keeps 1.0), and
    // ids and bands with underscores, digits and mixed case round-trip
    assert_eq!(got["Site_A"]["Red_Edge2"], Value::Float(1.0));
    assert_eq!(got["site_b"]["Red_Edge2"], Value::Float(3.0));
}

#[test]
fn keyed_reduce_region_formats_numeric_ids() {
    let mut engine = MemoryEngine::new();
    engine.insert_collection(
        "ranked",
        vec![
            ImageData::new(1, 1)
                .with_band("B1", vec![5.0])
                .with_property("rank", 1i64),
            ImageData::new(1, 1)
                .with_band("B1", vec![8.0])
                .with_property("rank", 2i64),
        ],
    );
    let ic = ImageCollection::load("ranked");
    let opts = KeyedRegionOpts {
        id_property: "rank".to_string(),
        id_type: IdType::Number,
        ..KeyedRegionOpts::default()
    };
    let table = ImageCollectionExt::reduce_region(&ic, Reducer::Mean, &Geometry::everything(), &opts);
    let got = nested(&engine, &table);
    assert_eq!(got["1"]["B1"], Value::Float(5.0));
    assert_eq!(got["2"]["B1"], Value::Float(8.0));
}
