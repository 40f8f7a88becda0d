//! Temporal reshaping pipeline against the in-memory engine.

use eetools_core::engine::{ImageData, MemoryEngine};
use eetools_core::prelude::*;
use eetools_core::{TIME_END, TIME_START};
use eetools_toolbox::ImageCollectionExt;

const DAY: i64 = 86_400_000;

/// One-pixel single-band images with a timestamp each.
fn series(values: &[f64], times: &[i64]) -> MemoryEngine {
    let images = values
        .iter()
        .zip(times)
        .map(|(v, t)| {
            ImageData::new(1, 1)
                .with_band("B1", vec![*v])
                .with_property(TIME_START, *t)
        })
        .collect();
    let mut engine = MemoryEngine::new();
    engine.insert_collection("series", images);
    engine
}

fn sizes(engine: &MemoryEngine, groups: &List) -> Vec<Value> {
    let counts = groups.map(|group: ImageCollection| group.size());
    match engine.evaluate(counts.expr()).unwrap() {
        Value::List(items) => items,
        other => panic!("expected a list, got {other:?}"),
    }
}

#[test]
fn group_interval_buckets_cover_the_span() {
    let engine = series(&[1.0; 6], &[0, DAY, 2 * DAY, 3 * DAY, 4 * DAY, 5 * DAY]);
    let ic = ImageCollection::load("series");
    let groups = ic.group_interval(TimeUnit::Day, 1);
    // the final bucket is closed, so the last two images share it
    assert_eq!(
        sizes(&engine, &groups),
        vec![
            Value::Int(1),
            Value::Int(1),
            Value::Int(1),
            Value::Int(1),
            Value::Int(2)
        ]
    );
}

#[test]
fn group_interval_bucket_count_scales_with_span() {
    let one = series(&[1.0, 1.0], &[0, DAY]);
    let groups = ImageCollection::load("series").group_interval(TimeUnit::Day, 1);
    assert_eq!(sizes(&one, &groups), vec![Value::Int(2)]);

    let two = series(&[1.0, 1.0], &[0, 2 * DAY]);
    assert_eq!(sizes(&two, &groups), vec![Value::Int(1), Value::Int(1)]);
}

#[test]
fn group_interval_single_image_yields_one_bucket() {
    let engine = series(&[1.0], &[3 * DAY]);
    let groups = ImageCollection::load("series").group_interval(TimeUnit::Day, 1);
    assert_eq!(sizes(&engine, &groups), vec![Value::Int(1)]);
}

#[test]
fn reduce_interval_composites_carry_bucket_times() {
    let engine = series(
        &[1.0, 5.0, 6.0, 4.0, 7.0, 10.0],
        &[0, DAY, 2 * DAY, 3 * DAY, 4 * DAY, 5 * DAY],
    );
    let ic = ImageCollection::load("series");
    let daily = ic.reduce_interval(Reducer::Mean, TimeUnit::Day, 1);
    let data = engine.evaluate_collection(daily.expr()).unwrap();
    assert_eq!(data.images().len(), 5);

    let first = &data.images()[0];
    assert_eq!(first.band_names(), vec!["B1"]);
    assert_eq!(first.band("B1").unwrap().values[0], 1.0);
    assert_eq!(first.property(TIME_START), Some(&Value::Int(0)));
    assert_eq!(first.property(TIME_END), Some(&Value::Int(0)));

    // the closed final bucket averages the last two images
    let last = &data.images()[4];
    assert_eq!(last.band("B1").unwrap().values[0], 8.5);
    assert_eq!(last.property(TIME_START), Some(&Value::Int(4 * DAY)));
    assert_eq!(last.property(TIME_END), Some(&Value::Int(5 * DAY)));
}

#[test]
fn outliers_flags_values_outside_sigma() {
    let engine = series(
        &[1.0, 5.0, 6.0, 4.0, 7.0, 10.0],
        &[0, DAY, 2 * DAY, 3 * DAY, 4 * DAY, 5 * DAY],
    );
    let ic = ImageCollection::load("series");
    // mean 5.5, population stddev ~2.754, so only 1 and 10 fall outside
    let flagged = ic.outliers(None, 1.0, false);
    let expected = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
    for (i, want) in expected.iter().enumerate() {
        let img = engine.evaluate_image(flagged.iloc(i as i64).expr()).unwrap();
        assert_eq!(img.band("B1").unwrap().values[0], [1.0, 5.0, 6.0, 4.0, 7.0, 10.0][i]);
        assert_eq!(img.band("B1_outlier").unwrap().values[0], *want, "image {i}");
    }
}

#[test]
fn outliers_drop_masks_instead_of_flagging() {
    let engine = series(
        &[1.0, 5.0, 6.0, 4.0, 7.0, 10.0],
        &[0, DAY, 2 * DAY, 3 * DAY, 4 * DAY, 5 * DAY],
    );
    let ic = ImageCollection::load("series");
    let cleaned = ic.outliers(None, 1.0, true);

    let low = engine.evaluate_image(cleaned.iloc(0).expr()).unwrap();
    assert_eq!(low.band_names(), vec!["B1"]);
    assert!(!low.band("B1").unwrap().mask[0]);

    let kept = engine.evaluate_image(cleaned.iloc(1).expr()).unwrap();
    assert!(kept.band("B1").unwrap().mask[0]);
    assert_eq!(kept.band("B1").unwrap().values[0], 5.0);
}

#[test]
fn integral_is_the_trapezoid_sum() {
    let engine = series(&[2.0, 4.0], &[0, 1000]);
    let ic = ImageCollection::load("series");
    let area = ic.integral("B1", TIME_START, Some(TimeUnit::Second));
    let img = engine.evaluate_image(area.expr()).unwrap();
    // (2 + 4) / 2 over one second
    assert_eq!(img.band("integral").unwrap().values[0], 3.0);
}

#[test]
fn integral_defaults_to_the_full_span() {
    let engine = series(&[2.0, 4.0], &[0, 1000]);
    let ic = ImageCollection::load("series");
    let area = ic.integral("B1", TIME_START, None);
    let img = engine.evaluate_image(area.expr()).unwrap();
    // normalizing by the span itself leaves the mean of the endpoints
    assert_eq!(img.band("integral").unwrap().values[0], 3.0);
}

#[test]
fn medoid_picks_the_least_deviant_image() {
    let engine = series(&[0.0, 1.0, 10.0], &[0, DAY, 2 * DAY]);
    let ic = ImageCollection::load("series");
    let img = engine.evaluate_image(ic.medoid().expr()).unwrap();
    assert_eq!(img.band_names(), vec!["B1"]);
    assert_eq!(img.band("B1").unwrap().values[0], 1.0);
}

#[test]
fn closest_date_fills_masked_images_from_the_past() {
    let mut engine = MemoryEngine::new();
    engine.insert_collection(
        "gappy",
        vec![
            ImageData::new(1, 1)
                .with_band("B1", vec![5.0])
                .with_property(TIME_START, 100i64),
            ImageData::new(1, 1)
                .with_masked_band("B1", vec![0.0], vec![false])
                .with_property(TIME_START, 200i64),
        ],
    );
    let filled = ImageCollection::load("gappy").closest_date();
    let data = engine.evaluate_collection(filled.expr()).unwrap();
    assert_eq!(data.images().len(), 2);

    let second = &data.images()[1];
    assert_eq!(second.property(TIME_START), Some(&Value::Int(200)));
    let band = second.band("B1").unwrap();
    assert!(band.mask[0]);
    assert_eq!(band.values[0], 5.0);
}

#[test]
fn valid_pixel_counts_unmasked_images() {
    let mut engine = MemoryEngine::new();
    engine.insert_collection(
        "patchy",
        vec![
            ImageData::new(1, 1).with_band("B1", vec![1.0]),
            ImageData::new(1, 1).with_band("B1", vec![2.0]),
            ImageData::new(1, 1).with_masked_band("B1", vec![0.0], vec![false]),
        ],
    );
    let ic = ImageCollection::load("patchy");
    let counts = ic.valid_pixel(None);
    let img = engine.evaluate_image(counts.expr()).unwrap();
    assert_eq!(img.band_names(), vec!["valid", "pct_valid"]);
    assert_eq!(img.band("valid").unwrap().values[0], 2.0);
    assert!((img.band("pct_valid").unwrap().values[0] - 200.0 / 3.0).abs() < 1e-9);
}

#[test]
fn collection_mask_is_the_union_of_image_masks() {
    let mut engine = MemoryEngine::new();
    engine.insert_collection(
        "partial",
        vec![
            ImageData::new(2, 1).with_masked_band("B1", vec![1.0, 1.0], vec![true, false]),
            ImageData::new(2, 1).with_masked_band("B1", vec![1.0, 1.0], vec![false, false]),
        ],
    );
    let mask = ImageCollection::load("partial").collection_mask();
    let img = engine.evaluate_image(mask.expr()).unwrap();
    assert_eq!(img.band("B1").unwrap().values, vec![1.0, 0.0]);
}

#[test]
fn append_extends_the_collection() {
    let engine = series(&[1.0, 2.0], &[0, DAY]);
    let ic = ImageCollection::load("series").append(&Image::constant(9.0));
    assert_eq!(engine.evaluate(ic.size().expr()).unwrap(), Value::Int(3));
    let tail = engine.evaluate_image(ic.iloc(-1).expr()).unwrap();
    assert_eq!(tail.band("constant").unwrap().values[0], 9.0);
}

#[test]
fn contains_band_filters_strip_their_marker() {
    let mut engine = MemoryEngine::new();
    engine.insert_collection(
        "mixed",
        vec![
            ImageData::new(1, 1)
                .with_band("B1", vec![1.0])
                .with_band("B2", vec![2.0]),
            ImageData::new(1, 1).with_band("B1", vec![3.0]),
            ImageData::new(1, 1).with_band("B2", vec![4.0]),
        ],
    );
    let ic = ImageCollection::load("mixed");

    let both = ic.contains_all_bands(&["B1", "B2"]);
    assert_eq!(engine.evaluate(both.size().expr()).unwrap(), Value::Int(1));
    let data = engine.evaluate_collection(both.expr()).unwrap();
    assert_eq!(data.images()[0].band_names(), vec!["B1", "B2"]);
    // the marker property used for filtering must not survive
    assert_eq!(
        engine.evaluate(both.first().property_names().expr()).unwrap(),
        Value::List(vec![Value::Str("system:index".into())])
    );

    let either = ic.contains_any_bands(&["B1", "B2"]);
    assert_eq!(engine.evaluate(either.size().expr()).unwrap(), Value::Int(3));
}

#[test]
fn aggregate_properties_collects_columns() {
    let mut engine = MemoryEngine::new();
    engine.insert_collection(
        "cloudy",
        vec![
            ImageData::new(1, 1)
                .with_band("B1", vec![1.0])
                .with_property("cloud", 10i64),
            ImageData::new(1, 1)
                .with_band("B1", vec![2.0])
                .with_property("cloud", 20i64),
        ],
    );
    let ic = ImageCollection::load("cloudy");
    let table = ic.aggregate_properties(Some(&List::strings(&["cloud"])));
    let Value::Dict(d) = engine.evaluate(table.expr()).unwrap() else {
        panic!("expected a dictionary")
    };
    assert_eq!(
        d["cloud"],
        Value::List(vec![Value::Int(10), Value::Int(20)])
    );
}
