//! End-to-end fetch scenarios against an in-memory catalog

use std::sync::Mutex;

use chrono::NaiveDate;
use serde_json::json;

use sarfetch::catalog::{
    BandQuery, CatalogClient, CatalogError, CollectionFilter, ImageProperties, PixelTable,
};
use sarfetch::{
    FetchError, FetchParams, Fetcher, OrbitDirection, PointParams, Polarization, Region,
};

/// One synthetic ground pixel with its acquisitions (epoch-ms, VV, VH)
struct ScenePixel {
    lat: f64,
    lon: f64,
    acquisitions: Vec<(i64, f64, f64)>,
}

/// In-memory catalog over a fixed synthetic scene.
///
/// Multi-day extractions play the role of the initial probe and can be
/// configured to fail with a catalog message; one-day extractions filter the
/// scene by geometry and date. An empty result set reproduces the service's
/// "No bands in collection." failure, like the real catalog does for days
/// without an acquisition.
struct MockCatalog {
    pixels: Vec<ScenePixel>,
    probe_message: Option<String>,
    fail_days: Vec<NaiveDate>,
    skewed_header_days: Vec<NaiveDate>,
    calls: Mutex<Vec<BandQuery>>,
}

impl MockCatalog {
    fn new(pixels: Vec<ScenePixel>) -> Self {
        Self {
            pixels,
            probe_message: None,
            fail_days: Vec::new(),
            skewed_header_days: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn recorded_calls(&self) -> Vec<BandQuery> {
        self.calls.lock().unwrap().clone()
    }
}

fn date_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis()
}

fn covers(region: &Region, lat: f64, lon: f64) -> bool {
    match region {
        Region::Point(coords) => coords[0] == lon && coords[1] == lat,
        Region::Polygon(_) => {
            let (tl, br) = region.rect_corners().unwrap();
            let (lon_min, lon_max) = (tl[0].min(br[0]), tl[0].max(br[0]));
            let (lat_min, lat_max) = (tl[1].min(br[1]), tl[1].max(br[1]));
            lon >= lon_min && lon <= lon_max && lat >= lat_min && lat <= lat_max
        }
    }
}

impl CatalogClient for MockCatalog {
    fn get_region(&self, query: &BandQuery) -> Result<PixelTable, CatalogError> {
        self.calls.lock().unwrap().push(query.clone());
        let filter = &query.filter;

        let span_days = (filter.end_date - filter.start_date).num_days();
        if span_days > 1 {
            if let Some(message) = &self.probe_message {
                return Err(CatalogError::Query(message.clone()));
            }
        }
        if self.fail_days.contains(&filter.start_date) {
            return Err(CatalogError::Query("Computation timed out.".to_string()));
        }

        let (start_ms, end_ms) = (date_ms(filter.start_date), date_ms(filter.end_date));
        let band = query.band.to_string();

        let mut rows = Vec::new();
        for pixel in &self.pixels {
            if !covers(&filter.geometry, pixel.lat, pixel.lon) {
                continue;
            }
            for &(epoch_ms, vv, vh) in &pixel.acquisitions {
                if epoch_ms < start_ms || epoch_ms >= end_ms {
                    continue;
                }
                let value = match query.band {
                    Polarization::VV => vv,
                    Polarization::VH => vh,
                };
                rows.push(vec![
                    json!("S1A_IW_GRDH_1SDV"),
                    json!(pixel.lon),
                    json!(pixel.lat),
                    json!(epoch_ms),
                    json!(value),
                ]);
            }
        }

        if rows.is_empty() {
            return Err(CatalogError::Query(
                "ImageCollection.getRegion: No bands in collection.".to_string(),
            ));
        }

        let mut header: Vec<String> = vec!["id", "longitude", "latitude", "time"]
            .into_iter()
            .map(String::from)
            .collect();
        if self.skewed_header_days.contains(&filter.start_date) {
            header.push("angle".to_string());
            for row in &mut rows {
                row.push(json!(38.9));
            }
        }
        header.push(band);

        Ok(PixelTable { header, rows })
    }

    fn relative_orbit_numbers(&self, _filter: &CollectionFilter) -> Result<Vec<u32>, CatalogError> {
        Ok(vec![71])
    }

    fn image_properties(
        &self,
        _filter: &CollectionFilter,
    ) -> Result<Vec<ImageProperties>, CatalogError> {
        Ok(Vec::new())
    }
}

const DAY1: &str = "2020-10-24";
const DAY2: &str = "2020-10-25";

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn noon_ms(s: &str) -> i64 {
    date_ms(day(s)) + 12 * 3600 * 1000
}

/// 2x2 pixel scene inside the unit square, one acquisition on each of two days
fn small_scene() -> Vec<ScenePixel> {
    let mut pixels = Vec::new();
    for &lat in &[0.75, 0.25] {
        for &lon in &[0.25, 0.75] {
            pixels.push(ScenePixel {
                lat,
                lon,
                acquisitions: vec![
                    (noon_ms(DAY1), 10.0 + lat, -17.0 + lon),
                    (noon_ms(DAY2), 12.0 + lat, -15.0 + lon),
                ],
            });
        }
    }
    pixels
}

fn unit_square_params() -> FetchParams {
    FetchParams::rectangle([0.0, 1.0], [1.0, 0.0], day(DAY1), day("2020-10-26"))
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_small_area_fetch() {
    init_logging();
    let mock = MockCatalog::new(small_scene());
    let fetcher = Fetcher::new(&mock);

    let result = fetcher.fetch(&unit_square_params()).unwrap();

    assert_eq!(result.stack.dim(), (2, 2, 2, 2));
    assert_eq!(result.timestamps, vec![day(DAY1), day(DAY2)]);
    assert_eq!(result.coordinates.dim(), (2, 2, 2));

    // North-west cell on day 1: the (0.75, 0.25) pixel.
    assert_eq!(result.coordinates[[0, 0, 0]], 0.75);
    assert_eq!(result.coordinates[[0, 0, 1]], 0.25);
    assert_eq!(result.stack[[0, 0, 0, 0]], 10.75);
    assert_eq!(result.stack[[0, 0, 1, 0]], -16.75);

    assert_eq!(result.metadata.tile_count, 1);
    assert_eq!(result.metadata.interval_count, 2);

    // No tiling happened: every extraction used the original rectangle.
    let full_region = Region::rectangle([0.0, 1.0], [1.0, 0.0]);
    assert!(mock
        .recorded_calls()
        .iter()
        .all(|call| call.filter.geometry == full_region));
}

#[test]
fn test_oversized_area_is_tiled_2x2() {
    init_logging();
    let mut mock = MockCatalog::new(small_scene());
    // Probe reports three times the ceiling -> ceil(sqrt(3)) = 2 -> 2x2 grid.
    mock.probe_message = Some(
        "ImageCollection.getRegion: Too many values: 3145728 points x 1 bands x 14 images"
            .to_string(),
    );
    let fetcher = Fetcher::new(&mock);

    let result = fetcher.fetch(&unit_square_params()).unwrap();

    // One pixel per quadrant, so the merged grid is still 2x2.
    assert_eq!(result.stack.dim(), (2, 2, 2, 2));
    assert_eq!(result.metadata.tile_count, 4);

    // Exactly 4 tile extractions per band per interval, over distinct tiles.
    let calls = mock.recorded_calls();
    let day1_vv: Vec<_> = calls
        .iter()
        .filter(|c| {
            c.band == Polarization::VV
                && c.filter.start_date == day(DAY1)
                && c.filter.end_date == day(DAY2)
        })
        .collect();
    assert_eq!(day1_vv.len(), 4);
    for (i, call) in day1_vv.iter().enumerate() {
        for other in &day1_vv[i + 1..] {
            assert_ne!(call.filter.geometry, other.filter.geometry);
        }
    }
}

#[test]
fn test_failed_interval_contributes_zero_rows() {
    let mut mock = MockCatalog::new(small_scene());
    mock.fail_days = vec![day(DAY2)];
    let fetcher = Fetcher::new(&mock);

    let result = fetcher.fetch(&unit_square_params()).unwrap();

    // Day 2 dropped out; the fetch still succeeds with a shorter time axis.
    assert_eq!(result.timestamps, vec![day(DAY1)]);
    assert_eq!(result.stack.dim(), (2, 2, 2, 1));
}

#[test]
fn test_header_drift_within_a_fetch_is_fatal() {
    let mut mock = MockCatalog::new(small_scene());
    mock.skewed_header_days = vec![day(DAY2)];
    let fetcher = Fetcher::new(&mock);

    let result = fetcher.fetch(&unit_square_params());
    assert!(matches!(result, Err(FetchError::HeaderMismatch(_))));
}

#[test]
fn test_incorrect_orbit_aborts_before_fanout() {
    let mut mock = MockCatalog::new(small_scene());
    mock.probe_message =
        Some("ImageCollection.getRegion: No bands in collection.".to_string());
    let fetcher = Fetcher::new(&mock);

    let mut params = unit_square_params();
    params.orbit_direction = OrbitDirection::Descending;

    let result = fetcher.fetch(&params);
    assert!(matches!(
        result,
        Err(FetchError::IncorrectOrbit(OrbitDirection::Descending))
    ));
    // Only the probe went out.
    assert_eq!(mock.recorded_calls().len(), 1);
}

#[test]
fn test_conflicting_inputs_fail_before_any_remote_call() {
    let mock = MockCatalog::new(small_scene());
    let fetcher = Fetcher::new(&mock);

    let mut params = unit_square_params();
    params.coords = Some(vec![[0.0, 1.0], [1.0, 0.0]]);

    let result = fetcher.fetch(&params);
    assert!(matches!(result, Err(FetchError::InvalidInput(_))));
    assert!(mock.recorded_calls().is_empty());
}

#[test]
fn test_point_fetch_shape() {
    let mock = MockCatalog::new(vec![ScenePixel {
        lat: 0.5,
        lon: 0.5,
        acquisitions: vec![
            (noon_ms(DAY1), 10.0, -17.0),
            (noon_ms(DAY2), 12.0, -15.0),
        ],
    }]);
    let fetcher = Fetcher::new(&mock);

    let params = PointParams::new(day(DAY1), day("2020-10-26"));
    let result = fetcher.fetch_point([0.5, 0.5], &params).unwrap();

    assert_eq!(result.stack.dim(), (1, 1, 2, 2));
    assert_eq!(result.timestamps, vec![day(DAY1), day(DAY2)]);
    assert_eq!(result.coordinates[[0, 0, 0]], 0.5);
    assert_eq!(result.coordinates[[0, 0, 1]], 0.5);
    assert_eq!(result.stack[[0, 0, 0, 1]], 12.0);
}

#[test]
fn test_point_fetch_with_no_acquisitions() {
    let mock = MockCatalog::new(Vec::new());
    let fetcher = Fetcher::new(&mock);

    let params = PointParams::new(day(DAY1), day("2020-10-26"));
    let result = fetcher.fetch_point([7.36, 46.23], &params).unwrap();

    // Empty time axis, but still a 1x1 grid at the requested point.
    assert_eq!(result.stack.dim(), (1, 1, 2, 0));
    assert!(result.timestamps.is_empty());
    assert_eq!(result.coordinates[[0, 0, 0]], 46.23);
    assert_eq!(result.coordinates[[0, 0, 1]], 7.36);
}

#[test]
fn test_point_fetch_rejects_reversed_dates() {
    let mock = MockCatalog::new(Vec::new());
    let fetcher = Fetcher::new(&mock);

    let params = PointParams::new(day("2020-10-26"), day(DAY1));
    let result = fetcher.fetch_point([0.5, 0.5], &params);
    assert!(matches!(result, Err(FetchError::InvalidInput(_))));
    assert!(mock.recorded_calls().is_empty());
}

#[test]
fn test_parallel_fanout_matches_serial_result() {
    let serial_mock = MockCatalog::new(small_scene());
    let parallel_mock = MockCatalog::new(small_scene());

    let mut serial_params = unit_square_params();
    serial_params.fanout = 1;
    let mut parallel_params = unit_square_params();
    parallel_params.fanout = 4;

    let serial = Fetcher::new(&serial_mock).fetch(&serial_params).unwrap();
    let parallel = Fetcher::new(&parallel_mock).fetch(&parallel_params).unwrap();

    assert_eq!(serial.timestamps, parallel.timestamps);
    assert_eq!(serial.coordinates, parallel.coordinates);
    ndarray::Zip::from(&serial.stack)
        .and(&parallel.stack)
        .for_each(|a, b| {
            assert_eq!(a.is_nan(), b.is_nan());
            if !a.is_nan() {
                assert_eq!(a, b);
            }
        });
}
