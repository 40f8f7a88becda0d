//! The image-collection reshaping pipeline.
//!
//! Everything here builds on the primitive collection surface: temporal
//! bucketing, outlier flagging, trapezoidal integrals, medoid composites,
//! and the stack/batch/unstack family that turns a collection into nested
//! dictionaries with one remote reduction call.
//!
//! Several operations tag images with temporary metadata properties to
//! smuggle grouping keys through server-side filters. Those property names
//! are uuid-derived per call and stripped from (or never observable in) the
//! returned values.

use eetools_core::{
    BandFilter, Dictionary, Expr, Feature, FeatureCollection, Filter, Geometry, Handle, IdType,
    Image, ImageCollection, List, Number, Op, ReduceRegionOpts, Reducer, Str, TimeUnit,
    DATE_PATTERN, TIME_END, TIME_START,
};
use uuid::Uuid;

/// A process-unique metadata property name for transient tagging.
fn temp_property() -> String {
    format!("eetools_{}", Uuid::new_v4().simple())
}

/// Options of the keyed collection-wide region reduction.
///
/// `id_property` groups the collection; each group is pre-reduced with
/// `property_reducer` into one image, identifiers are rendered to strings
/// per `id_type`, and the whole stack goes through a single `reduceRegion`
/// call under synthetic `<id>_<band>` names.
#[derive(Debug, Clone)]
pub struct KeyedRegionOpts {
    pub id_property: String,
    pub id_type: IdType,
    pub property_reducer: Reducer,
    /// Pattern for `IdType::Date` identifiers (epoch millis).
    pub date_pattern: String,
    /// Pattern for `IdType::Number` identifiers.
    pub number_pattern: String,
    pub region: ReduceRegionOpts,
}

impl Default for KeyedRegionOpts {
    fn default() -> Self {
        KeyedRegionOpts {
            id_property: "system:index".to_string(),
            id_type: IdType::Str,
            property_reducer: Reducer::First,
            date_pattern: DATE_PATTERN.to_string(),
            number_pattern: "%s".to_string(),
            region: ReduceRegionOpts::default(),
        }
    }
}

/// Reshaping operations over [`ImageCollection`].
pub trait ImageCollectionExt {
    /// The collection with `image` appended at the end.
    fn append(&self, image: &Image) -> ImageCollection;

    /// Image at `index`; negative indices count from the end.
    fn iloc(&self, index: i64) -> Image;

    /// 0/1 image marking pixels valid in at least one image of the stack.
    fn collection_mask(&self) -> Image;

    /// Valid-observation counts for `band` (default: the first band): a
    /// `valid` count band plus a `pct_valid` percentage band.
    fn valid_pixel(&self, band: Option<&str>) -> Image;

    /// Keep images whose band-name set satisfies `mode` over `names`.
    fn contains_band_names(&self, names: &[&str], mode: BandFilter) -> ImageCollection;

    fn contains_all_bands(&self, names: &[&str]) -> ImageCollection {
        self.contains_band_names(names, BandFilter::All)
    }

    fn contains_any_bands(&self, names: &[&str]) -> ImageCollection {
        self.contains_band_names(names, BandFilter::Any)
    }

    /// Per-property value lists across the collection, keyed by property
    /// name (default: the first image's property names).
    fn aggregate_properties(&self, properties: Option<&List>) -> Dictionary;

    /// Split the time span into `ceil(span / (unit * duration))` buckets
    /// (at least one), each a sub-collection filtered with half-open date
    /// bounds; the final bucket is closed so the newest image is kept.
    /// Empty buckets are preserved.
    fn group_interval(&self, unit: TimeUnit, duration: i64) -> List;

    /// One reduced image per time bucket, band names restored and the
    /// bucket's first/last image times tagged as the composite's
    /// start/end. A bucket with no images is a deferred
    /// engine error; pre-filter the collection when gaps are possible.
    fn reduce_interval(&self, reducer: Reducer, unit: TimeUnit, duration: i64) -> ImageCollection;

    /// Flag pixels outside `mean ± sigma * stddev` (population statistics)
    /// per band. Without `drop`, boolean `<band>_outlier` bands are
    /// appended; with `drop`, outlier pixels are masked out of the
    /// statistics bands and the original band set is kept.
    fn outliers(&self, bands: Option<&List>, sigma: f64, drop: bool) -> ImageCollection;

    /// Trapezoidal integral of `band` over `time_property`, in `unit`
    /// steps; `None` normalizes over the whole time span.
    fn integral(&self, band: &str, time_property: &str, unit: Option<TimeUnit>) -> Image;

    /// One composite per distinct timestamp: each holds the newest
    /// unmasked value at or before that time.
    fn closest_date(&self) -> ImageCollection;

    /// The medoid composite: per pixel, the values of the image whose
    /// min-max-normalized bands have the smallest summed Euclidean
    /// distance to every other image. Original band names are kept.
    fn medoid(&self) -> Image;

    /// `{band: {date: value}}` over `region`; dates come from
    /// `date_property` formatted with the band-name-safe default pattern.
    fn dates_by_bands(
        &self,
        region: &Geometry,
        reducer: Reducer,
        opts: &ReduceRegionOpts,
        date_property: &str,
        bands: Option<&List>,
        labels: Option<&List>,
    ) -> Dictionary;

    /// `{region: {date: value}}` for one band over a feature collection;
    /// regions are keyed by their `label` property.
    fn dates_by_regions(
        &self,
        band: &str,
        regions: &FeatureCollection,
        label: &str,
        reducer: Reducer,
        scale: f64,
        date_property: &str,
    ) -> Dictionary;

    /// `{band: {doy: value}}`: images sharing a day-of-year are merged
    /// with `time_reducer` (empty days are dropped before reduction),
    /// then each composite is reduced over `region`.
    fn doy_by_bands(
        &self,
        region: &Geometry,
        time_reducer: Reducer,
        region_reducer: Reducer,
        opts: &ReduceRegionOpts,
        date_property: &str,
        bands: Option<&List>,
        labels: Option<&List>,
    ) -> Dictionary;

    /// `{region: {doy: value}}` for one band.
    fn doy_by_regions(
        &self,
        band: &str,
        regions: &FeatureCollection,
        label: &str,
        time_reducer: Reducer,
        region_reducer: Reducer,
        scale: f64,
        date_property: &str,
    ) -> Dictionary;

    /// `{year: {doy: value}}` for one band over `region`.
    fn doy_by_years(
        &self,
        band: &str,
        region: &Geometry,
        reducer: Reducer,
        opts: &ReduceRegionOpts,
        date_property: &str,
    ) -> Dictionary;

    /// Keyed collection-wide reduction: `{id: {band: value}}` in one
    /// remote `reduceRegion` call via `<id>_<band>` band stacking.
    fn reduce_region(
        &self,
        reducer: Reducer,
        geometry: &Geometry,
        opts: &KeyedRegionOpts,
    ) -> Dictionary;
}

impl ImageCollectionExt for ImageCollection {
    fn append(&self, image: &Image) -> ImageCollection {
        self.merge(&ImageCollection::from_images(vec![image.clone()]))
    }

    fn iloc(&self, index: i64) -> Image {
        Image::from_expr(self.to_list().get(index))
    }

    fn collection_mask(&self) -> Image {
        let masks = self.map(|i| i.mask());
        masks.sum().gt(0.0)
    }

    fn valid_pixel(&self, band: Option<&str>) -> Image {
        let band_list = match band {
            Some(b) => List::strings(&[b]),
            None => List::of(vec![self.first().band_names().get(0)]),
        };
        let masks = self.map(|i| i.select(&band_list).mask().eq(1.0));
        let valid = masks.sum().rename_names(&["valid"]).clip(&self.geometry());
        let pct = valid
            .divide(self.size())
            .multiply(100.0)
            .rename_names(&["pct_valid"]);
        valid.add_bands(&pct, false)
    }

    fn contains_band_names(&self, names: &[&str], mode: BandFilter) -> ImageCollection {
        let marker = temp_property();
        let tagged = self.map(|i| {
            let bands = i.band_names();
            i.set(&marker, bands)
        });
        let parts: Vec<Filter> = names
            .iter()
            .map(|n| Filter::list_contains(&marker, *n))
            .collect();
        let filter = match mode {
            BandFilter::All => Filter::and(parts),
            BandFilter::Any => Filter::or(parts),
        };
        // algebra strips metadata, so multiply-by-one plus an explicit
        // property copy drops the marker and nothing else
        tagged.filter(&filter).map(|i| {
            i.multiply(1.0)
                .copy_properties(&i, &List::strings(&[&marker]))
        })
    }

    fn aggregate_properties(&self, properties: Option<&List>) -> Dictionary {
        let keys = properties
            .cloned()
            .unwrap_or_else(|| self.first().property_names());
        let values = keys.map(|p: Str| self.aggregate_array(p));
        Dictionary::from_lists(&keys, &values)
    }

    fn group_interval(&self, unit: TimeUnit, duration: i64) -> List {
        let sorted = self.sort(TIME_START);
        let times = sorted.aggregate_array(TIME_START);
        let step = unit.millis() * duration;
        let ranges = List::from_expr(Expr::call(
            Op::DateRangeList,
            vec![times.get(0), times.get(-1), Expr::literal(step)],
        ));
        ranges.map(|range: List| sorted.filter_date(range.get(0), range.get(1)))
    }

    fn reduce_interval(&self, reducer: Reducer, unit: TimeUnit, duration: i64) -> ImageCollection {
        let band_names = self.first().band_names();
        let buckets = self.group_interval(unit, duration);
        let reduced = buckets.map(|bucket: ImageCollection| {
            let times = bucket.aggregate_array(TIME_START);
            bucket
                .reduce(reducer)
                .rename(&band_names)
                .set(TIME_START, times.get(0))
                .set(TIME_END, times.get(-1))
        });
        ImageCollection::from_list(&reduced).copy_properties(self, &List::strings(&[]))
    }

    fn outliers(&self, bands: Option<&List>, sigma: f64, drop: bool) -> ImageCollection {
        let stat_bands = bands.cloned().unwrap_or_else(|| self.first().band_names());
        let subset = self.select(&stat_bands);
        let mean = subset.mean();
        let spread = subset.reduce(Reducer::StdDev).rename(&stat_bands).multiply(sigma);
        let low = mean.subtract(&spread);
        let high = mean.add(&spread);
        let outlier_names = stat_bands.map(|b: Str| b.cat("_outlier"));
        self.map(|img| {
            let stats = img.select(&stat_bands);
            let flagged = stats.gt(&high).or(stats.lt(&low)).rename(&outlier_names);
            if drop {
                let kept = stats.update_mask(&flagged.not());
                img.add_bands(&kept, true)
            } else {
                img.add_bands(&flagged, false)
            }
        })
    }

    fn integral(&self, band: &str, time_property: &str, unit: Option<TimeUnit>) -> Image {
        let step = match unit {
            Some(u) => Number::from(u.millis()),
            None => self
                .aggregate_max(time_property)
                .subtract(self.aggregate_min(time_property)),
        };
        let zero = Image::constant(0.0).copy_properties(&self.first(), &List::strings(&[]));
        let seed = zero.rename_names(&["integral"]).set("last", &zero);
        self.iterate(
            |image, acc| {
                let last = Image::from_expr(acc.property("last"));
                let now = Number::from_expr(image.property(time_property));
                let before = Number::from_expr(last.property(time_property));
                let weight = now.subtract(before).divide(&step);
                let current = image.select_names(&[band]);
                let trapezoid = last.add(&current).multiply(weight).divide(2.0);
                acc.add(trapezoid).set("last", current)
            },
            seed,
        )
    }

    fn closest_date(&self) -> ImageCollection {
        let times = self.aggregate_array(TIME_START).sort();
        let filled = times.map(|t: Number| {
            self.filter(&Filter::lte(TIME_START, t.clone()))
                .mosaic()
                .set(TIME_START, t)
        });
        ImageCollection::from_list(&filled)
    }

    fn medoid(&self) -> Image {
        let quality = temp_property();
        let band_names = self.first().band_names();
        let minmax = self.reduce(Reducer::MinMax);
        let normalize = |img: Image| -> Image {
            let scaled = band_names.map(|b: Str| {
                let lo = minmax.select(&List::of(vec![b.cat("_min").into_expr()]));
                let hi = minmax.select(&List::of(vec![b.cat("_max").into_expr()]));
                img.select(&List::of(vec![b.into_expr()]))
                    .subtract(&lo)
                    .divide(hi.subtract(&lo))
            });
            ImageCollection::from_list(&scaled)
                .to_bands()
                .rename(&band_names)
        };
        let normalized = self.map(|img| normalize(img));
        // negated sum of distances, so the per-pixel argmax composite
        // selects the smallest distance
        let scored = self.map(|img| {
            let me = normalize(img.clone());
            let distances = normalized.map(|other| {
                me.subtract(&other).pow(2.0).reduce(Reducer::Sum).sqrt()
            });
            let total = distances
                .reduce(Reducer::Sum)
                .multiply(-1.0)
                .rename_names(&[quality.as_str()]);
            img.add_bands(&total, false)
        });
        scored.quality_mosaic(quality.as_str()).select(&band_names)
    }

    fn dates_by_bands(
        &self,
        region: &Geometry,
        reducer: Reducer,
        opts: &ReduceRegionOpts,
        date_property: &str,
        bands: Option<&List>,
        labels: Option<&List>,
    ) -> Dictionary {
        let bands = bands.cloned().unwrap_or_else(|| self.first().band_names());
        let labels = labels.cloned().unwrap_or_else(|| bands.clone());
        let relabeled = self.select(&bands).map(|i| i.rename(&labels));
        let date_list = self
            .aggregate_array(date_property)
            .map(|d: Number| d.format_date(DATE_PATTERN));
        let values = labels.map(|label: Str| {
            relabeled
                .select(&List::of(vec![label.into_expr()]))
                .to_bands()
                .rename(&date_list)
                .reduce_region(reducer, region, opts)
        });
        Dictionary::from_lists(&labels, &values)
    }

    fn dates_by_regions(
        &self,
        band: &str,
        regions: &FeatureCollection,
        label: &str,
        reducer: Reducer,
        scale: f64,
        date_property: &str,
    ) -> Dictionary {
        let date_list = self
            .aggregate_array(date_property)
            .map(|d: Number| d.format_date(DATE_PATTERN));
        let stacked = self.select_names(&[band]).to_bands().rename(&date_list);
        let reduced = stacked.reduce_regions(regions, reducer, scale);
        let values = reduced
            .to_list()
            .map(|f: Feature| f.to_dictionary(&date_list));
        Dictionary::from_lists(&regions.aggregate_array(label), &values)
    }

    fn doy_by_bands(
        &self,
        region: &Geometry,
        time_reducer: Reducer,
        region_reducer: Reducer,
        opts: &ReduceRegionOpts,
        date_property: &str,
        bands: Option<&List>,
        labels: Option<&List>,
    ) -> Dictionary {
        let bands = bands.cloned().unwrap_or_else(|| self.first().band_names());
        let labels = labels.cloned().unwrap_or_else(|| bands.clone());
        let relabeled = self.select(&bands).map(|i| i.rename(&labels));
        let (series, doy_list) = doy_composites(&relabeled, time_reducer, &labels, date_property);
        let values = labels.map(|label: Str| {
            series
                .select(&List::of(vec![label.into_expr()]))
                .to_bands()
                .rename(&doy_list)
                .reduce_region(region_reducer, region, opts)
        });
        Dictionary::from_lists(&labels, &values)
    }

    fn doy_by_regions(
        &self,
        band: &str,
        regions: &FeatureCollection,
        label: &str,
        time_reducer: Reducer,
        region_reducer: Reducer,
        scale: f64,
        date_property: &str,
    ) -> Dictionary {
        let labels = List::strings(&[band]);
        let subset = self.select_names(&[band]);
        let (series, doy_list) = doy_composites(&subset, time_reducer, &labels, date_property);
        let stacked = series.to_bands().rename(&doy_list);
        let reduced = stacked.reduce_regions(regions, region_reducer, scale);
        let values = reduced
            .to_list()
            .map(|f: Feature| f.to_dictionary(&doy_list));
        Dictionary::from_lists(&regions.aggregate_array(label), &values)
    }

    fn doy_by_years(
        &self,
        band: &str,
        region: &Geometry,
        reducer: Reducer,
        opts: &ReduceRegionOpts,
        date_property: &str,
    ) -> Dictionary {
        let doy_prop = temp_property();
        let year_prop = temp_property();
        let tagged = self.select_names(&[band]).map(|i| {
            let date = Number::from_expr(i.property(date_property));
            i.set(&doy_prop, date.date_relative("day", "year"))
                .set(&year_prop, date.date_get("year"))
        });
        let years = tagged.aggregate_array(year_prop.as_str()).distinct().sort();
        let year_keys = years.map(|y: Number| y.to_int().format("%s"));
        let values = years.map(|year: Number| {
            let one_year = tagged.filter(&Filter::eq(&year_prop, year));
            let doys = one_year
                .aggregate_array(doy_prop.as_str())
                .map(|d: Number| d.to_int().format("%s"));
            one_year
                .to_bands()
                .rename(&doys)
                .reduce_region(reducer, region, opts)
        });
        Dictionary::from_lists(&year_keys, &values)
    }

    fn reduce_region(
        &self,
        reducer: Reducer,
        geometry: &Geometry,
        opts: &KeyedRegionOpts,
    ) -> Dictionary {
        let bounded = self.filter_bounds(geometry);
        let ids = bounded
            .aggregate_array(opts.id_property.as_str())
            .distinct();
        let band_names = bounded.first().band_names();
        // one image per identifier, duplicates pre-reduced
        let composites = ids.map(|id: Number| {
            bounded
                .filter(&Filter::eq(&opts.id_property, id))
                .reduce(opts.property_reducer)
                .rename(&band_names)
        });
        let keys = match opts.id_type {
            IdType::Str => ids.clone(),
            IdType::Number => ids.map(|id: Number| id.format(&opts.number_pattern)),
            IdType::Date => ids.map(|id: Number| id.format_date(&opts.date_pattern)),
        };
        let synthetic = keys
            .map(|key: Str| band_names.map(|b: Str| key.cat("_").cat(b)))
            .flatten();
        let reduced = ImageCollection::from_list(&composites)
            .to_bands()
            .rename(&synthetic)
            .reduce_region(reducer, geometry, &opts.region);
        // unstack server-side: the id is stripped as a prefix, never by
        // splitting at the separator, so ids and bands may contain
        // underscores themselves
        let values = keys.map(|key: Str| {
            let mine = reduced
                .keys()
                .filter(&Filter::string_starts_with("item", key.clone()));
            let stripped = mine.map(|name: Str| name.replace(key.clone(), "").slice(1));
            Dictionary::from_lists(&stripped, &reduced.select(&mine).values())
        });
        Dictionary::from_lists(&keys, &values)
    }
}

/// Merge images sharing a day-of-year into one composite per occupied day.
///
/// Returns the composite collection (each image tagged with its day) and
/// the matching list of day numbers rendered as strings. Days with no
/// images are dropped before the reduction runs.
fn doy_composites(
    collection: &ImageCollection,
    reducer: Reducer,
    labels: &List,
    date_property: &str,
) -> (ImageCollection, List) {
    let doy_prop = temp_property();
    let size_prop = temp_property();
    let tagged = collection.map(|i| {
        let doy = Number::from_expr(i.property(date_property)).date_relative("day", "year");
        i.set(&doy_prop, doy)
    });
    let buckets = List::sequence(0i64, 366i64).map(|day: Number| {
        let same_day = tagged.filter(&Filter::eq(&doy_prop, day.clone()));
        same_day
            .set(&size_prop, same_day.size())
            .set(&doy_prop, day)
    });
    let occupied = buckets.filter(&Filter::gt(&size_prop, 0i64));
    let composites = occupied.map(|bucket: ImageCollection| {
        let doy = bucket.property(&doy_prop);
        bucket.reduce(reducer).rename(labels).set(&doy_prop, doy)
    });
    let series = ImageCollection::from_list(&composites);
    let doy_list = series
        .aggregate_array(doy_prop.as_str())
        .map(|d: Number| d.to_int().format("%s"));
    (series, doy_list)
}
