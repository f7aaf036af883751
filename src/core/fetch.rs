//! Fetch orchestration
//!
//! Drives one fetch call end to end: validate input, probe the region size,
//! tile if the catalog reports over-capacity, fan the per-(tile, interval)
//! queries out over a bounded worker pool, fold the results into the
//! coordinate map and assemble the dense stack.
//!
//! Workers are side-effect free: each returns its joined table by value and a
//! single-threaded collector performs every shared-state update, so no locks
//! guard the aggregation. Per-task query failures (including "no image on
//! this day") are logged and contribute zero rows; only input validation,
//! probing and orbit selection can abort a fetch.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::{Array3, Array4};
use rayon::prelude::*;
use serde::Serialize;

use crate::catalog::{
    self, BandQuery, CatalogClient, CatalogError, CollectionFilter, ImageProperties, PixelTable,
    MAX_CATALOG_PIXELS, NO_BANDS_MESSAGE, TOO_MANY_VALUES_PREFIX,
};
use crate::types::{
    DateInterval, FetchError, FetchResult, OrbitDirection, OrbitSelector, Polarization, Region,
};

use super::aggregate::{aggregate_table, CoordinateMap, CoordinateSeries};
use super::assemble::{assemble, AssembledImage};
use super::tiling::tile_region;

/// Default extraction scale in meters
pub const DEFAULT_SCALE: u32 = 20;

/// Default worker fan-out (no parallelism)
pub const DEFAULT_FANOUT: usize = 1;

/// Parameters of an area fetch.
///
/// The region is given either as `top_left` + `bottom_right` corners or as a
/// `coords` ring; supplying both (or neither) is rejected before any remote
/// call.
#[derive(Debug, Clone)]
pub struct FetchParams {
    pub top_left: Option<[f64; 2]>,
    pub bottom_right: Option<[f64; 2]>,
    pub coords: Option<Vec<[f64; 2]>>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub orbit_direction: OrbitDirection,
    pub orbit_selector: OrbitSelector,
    pub scale: u32,
    pub fanout: usize,
}

impl FetchParams {
    /// Area fetch over the rectangle spanned by two (lon, lat) corners
    pub fn rectangle(
        top_left: [f64; 2],
        bottom_right: [f64; 2],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            top_left: Some(top_left),
            bottom_right: Some(bottom_right),
            coords: None,
            start_date,
            end_date,
            orbit_direction: OrbitDirection::Ascending,
            orbit_selector: OrbitSelector::Any,
            scale: DEFAULT_SCALE,
            fanout: DEFAULT_FANOUT,
        }
    }

    /// Area fetch over an explicit coordinate ring (2-corner or closed form)
    pub fn ring(coords: Vec<[f64; 2]>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            top_left: None,
            bottom_right: None,
            coords: Some(coords),
            start_date,
            end_date,
            orbit_direction: OrbitDirection::Ascending,
            orbit_selector: OrbitSelector::Any,
            scale: DEFAULT_SCALE,
            fanout: DEFAULT_FANOUT,
        }
    }

    /// Fail-fast input validation; runs before any remote call
    fn validate(&self) -> FetchResult<()> {
        if self.coords.is_some() && (self.top_left.is_some() || self.bottom_right.is_some()) {
            return Err(FetchError::InvalidInput(
                "coords must be None when top_left and bottom_right are given".to_string(),
            ));
        }
        if self.top_left.is_some() != self.bottom_right.is_some() {
            return Err(FetchError::InvalidInput(
                "top_left and bottom_right must be given together".to_string(),
            ));
        }
        if self.coords.is_none() && self.top_left.is_none() {
            return Err(FetchError::InvalidInput(
                "no region given: provide either corners or coords".to_string(),
            ));
        }
        if let Some(coords) = &self.coords {
            if coords.len() < 2 {
                return Err(FetchError::InvalidInput(
                    "coords must hold at least two vertices".to_string(),
                ));
            }
        }
        validate_span(self.start_date, self.end_date)?;
        if self.scale < 10 {
            log::warn!("Scale {} is below the 10 m native resolution", self.scale);
        }
        Ok(())
    }

    fn region(&self) -> Region {
        match (&self.top_left, &self.bottom_right, &self.coords) {
            (Some(tl), Some(br), _) => Region::rectangle(*tl, *br),
            (_, _, Some(coords)) => Region::Polygon(coords.clone()),
            // validate() guarantees one of the arms above matched
            _ => unreachable!("validated params always carry a region"),
        }
    }
}

/// Parameters of a point fetch
#[derive(Debug, Clone)]
pub struct PointParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub orbit_direction: OrbitDirection,
    pub orbit_selector: OrbitSelector,
    pub scale: u32,
    pub fanout: usize,
}

impl PointParams {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            orbit_direction: OrbitDirection::Ascending,
            orbit_selector: OrbitSelector::Any,
            scale: DEFAULT_SCALE,
            fanout: DEFAULT_FANOUT,
        }
    }
}

/// Descriptive metadata accompanying a fetch result
#[derive(Debug, Clone, Serialize)]
pub struct FetchMetadata {
    /// Axis meaning of `stack`: `(latitude, longitude, band, time)`
    pub stack_axes: [&'static str; 4],
    /// Axis meaning of the last `coordinates` dimension
    pub coordinate_axes: [&'static str; 2],
    pub orbit_direction: OrbitDirection,
    /// Relative orbit the fetch was restricted to, if any
    pub relative_orbit: Option<u32>,
    pub scale: u32,
    pub tile_count: usize,
    pub interval_count: usize,
    /// Catalog properties of every image that contributed to the span
    pub images: Vec<ImageProperties>,
}

/// Complete result of an area or point fetch
#[derive(Debug, Clone)]
pub struct FetchOutput {
    /// `(height, width, 2, timestamps)` intensity stack; band 0 = VV, 1 = VH
    pub stack: Array4<f64>,
    /// `(height, width, 2)` per-cell (latitude, longitude)
    pub coordinates: Array3<f64>,
    /// Unique acquisition days, ascending
    pub timestamps: Vec<NaiveDate>,
    pub metadata: FetchMetadata,
}

fn validate_span(start: NaiveDate, end: NaiveDate) -> FetchResult<()> {
    if start >= end {
        return Err(FetchError::InvalidInput(format!(
            "start_date {} must precede end_date {}",
            start, end
        )));
    }
    Ok(())
}

/// SAR time-series fetcher over an injected catalog client
pub struct Fetcher<C: CatalogClient> {
    client: C,
    max_pixels: u64,
}

impl<C: CatalogClient> Fetcher<C> {
    /// Fetcher with the catalog's standard pixel ceiling
    pub fn new(client: C) -> Self {
        Self::with_pixel_ceiling(client, MAX_CATALOG_PIXELS)
    }

    /// Fetcher with an explicit per-query pixel ceiling
    pub fn with_pixel_ceiling(client: C, max_pixels: u64) -> Self {
        Self { client, max_pixels }
    }

    /// Fetch the SAR time series over an area.
    ///
    /// Probes the region against the catalog pixel ceiling, tiles it when
    /// necessary, fetches every (tile, day) pair with `fanout` workers and
    /// assembles the results into a dense `(height, width, 2, time)` stack.
    pub fn fetch(&self, params: &FetchParams) -> FetchResult<FetchOutput> {
        params.validate()?;
        let region = params.region();
        let span = DateInterval::new(params.start_date, params.end_date);
        let intervals = DateInterval::partition(params.start_date, params.end_date, 1);

        let tiles = match self.probe_pixel_count(&region, &span, params.orbit_direction, params.scale)? {
            Some(pixel_count) => tile_region(pixel_count, &region, self.max_pixels)?,
            None => vec![region.clone()],
        };

        let relative_orbit =
            self.select_orbit(&region, &span, params.orbit_direction, params.orbit_selector)?;
        if let Some(number) = relative_orbit {
            log::info!("Selected relative orbit: {}", number);
        }

        log::info!(
            "Region sliced in {} subregions and {} time intervals",
            tiles.len(),
            intervals.len()
        );

        let map = self.fetch_tiles(
            &tiles,
            &intervals,
            params.orbit_direction,
            relative_orbit,
            params.scale,
            params.fanout,
        )?;

        let series: Vec<CoordinateSeries> = map.into_values().collect();
        let image = assemble(&series);
        log::info!(
            "Assembled stack of shape {:?} over {} acquisition days",
            image.stack.dim(),
            image.timestamps.len()
        );

        let images =
            self.gather_image_properties(&region, &span, params.orbit_direction, relative_orbit);

        Ok(build_output(
            image,
            images,
            params.orbit_direction,
            relative_orbit,
            params.scale,
            tiles.len(),
            intervals.len(),
        ))
    }

    /// Fetch the SAR time series at a single (lon, lat) point.
    ///
    /// No probing or tiling: a point extraction never exceeds the pixel
    /// ceiling. The stack shape is always `(1, 1, 2, T)`, with `T = 0` when
    /// the span holds no acquisition.
    pub fn fetch_point(&self, coords: [f64; 2], params: &PointParams) -> FetchResult<FetchOutput> {
        validate_span(params.start_date, params.end_date)?;
        if !coords.iter().all(|c| c.is_finite()) {
            return Err(FetchError::InvalidInput(format!(
                "point coordinates must be finite, got {:?}",
                coords
            )));
        }

        let region = Region::Point(coords);
        let span = DateInterval::new(params.start_date, params.end_date);
        let intervals = DateInterval::partition(params.start_date, params.end_date, 1);

        let relative_orbit =
            self.select_orbit(&region, &span, params.orbit_direction, params.orbit_selector)?;
        if let Some(number) = relative_orbit {
            log::info!("Selected relative orbit: {}", number);
        }

        let map = self.fetch_tiles(
            std::slice::from_ref(&region),
            &intervals,
            params.orbit_direction,
            relative_orbit,
            params.scale,
            params.fanout,
        )?;

        let mut series: Vec<CoordinateSeries> = map.into_values().collect();
        let image = if series.is_empty() {
            // No acquisition in the span: a 1x1 grid at the requested point
            // with an empty time axis.
            let mut coordinates = Array3::zeros((1, 1, 2));
            coordinates[[0, 0, 0]] = coords[1];
            coordinates[[0, 0, 1]] = coords[0];
            AssembledImage {
                stack: Array4::from_elem((1, 1, 2, 0), f64::NAN),
                coordinates,
                timestamps: Vec::new(),
            }
        } else {
            if series.len() > 1 {
                // Coarse scales can return several pixels around the point;
                // keep the one nearest to the requested coordinate.
                log::debug!(
                    "Point query returned {} pixels, keeping the nearest",
                    series.len()
                );
                let dist2 = |s: &CoordinateSeries| {
                    (s.lat - coords[1]).powi(2) + (s.lon - coords[0]).powi(2)
                };
                series.sort_by(|a, b| dist2(a).total_cmp(&dist2(b)));
                series.truncate(1);
            }
            assemble(&series)
        };

        let images =
            self.gather_image_properties(&region, &span, params.orbit_direction, relative_orbit);

        Ok(build_output(
            image,
            images,
            params.orbit_direction,
            relative_orbit,
            params.scale,
            1,
            intervals.len(),
        ))
    }

    /// Trial extraction over the full span to learn whether the region fits
    /// in one query.
    ///
    /// `Ok(None)` means the region is small enough; `Ok(Some(n))` is the
    /// pixel count reported by the catalog's over-capacity error and feeds
    /// the tiler.
    fn probe_pixel_count(
        &self,
        region: &Region,
        span: &DateInterval,
        orbit_direction: OrbitDirection,
        scale: u32,
    ) -> FetchResult<Option<u64>> {
        let query = BandQuery {
            filter: CollectionFilter {
                start_date: span.start,
                end_date: span.end,
                geometry: region.clone(),
                orbit_direction,
                relative_orbit: None,
            },
            band: Polarization::VV,
            scale,
        };

        match self.client.get_region(&query) {
            Ok(_) => Ok(None),
            Err(CatalogError::Query(message)) => {
                if message.contains(NO_BANDS_MESSAGE) {
                    Err(FetchError::IncorrectOrbit(orbit_direction))
                } else if message.contains(TOO_MANY_VALUES_PREFIX) {
                    let count = catalog::parse_pixel_count(&message)
                        .ok_or_else(|| FetchError::PixelCountParse(message.clone()))?;
                    log::debug!("Probe reported over-capacity: {} pixels", count);
                    Ok(Some(count))
                } else {
                    Err(FetchError::PixelCountParse(message))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the orbit selector to a concrete relative orbit number.
    ///
    /// `MostImages`/`FewestImages` histogram the repeat ground tracks over
    /// the full span; ties go to the smallest orbit number.
    fn select_orbit(
        &self,
        region: &Region,
        span: &DateInterval,
        orbit_direction: OrbitDirection,
        selector: OrbitSelector,
    ) -> FetchResult<Option<u32>> {
        let pick_fewest = match selector {
            OrbitSelector::Any => return Ok(None),
            OrbitSelector::Fixed(number) => return Ok(Some(number)),
            OrbitSelector::MostImages => false,
            OrbitSelector::FewestImages => true,
        };

        let filter = CollectionFilter {
            start_date: span.start,
            end_date: span.end,
            geometry: region.clone(),
            orbit_direction,
            relative_orbit: None,
        };
        let numbers = self.client.relative_orbit_numbers(&filter)?;
        if numbers.is_empty() {
            return Err(FetchError::IncorrectOrbit(orbit_direction));
        }

        let mut histogram: BTreeMap<u32, usize> = BTreeMap::new();
        for number in numbers {
            *histogram.entry(number).or_insert(0) += 1;
        }

        let mut chosen: Option<(u32, usize)> = None;
        for (&number, &count) in &histogram {
            let better = match chosen {
                None => true,
                Some((_, best)) => {
                    if pick_fewest {
                        count < best
                    } else {
                        count > best
                    }
                }
            };
            if better {
                chosen = Some((number, count));
            }
        }
        // numbers was non-empty, so the histogram has at least one entry
        Ok(chosen.map(|(number, _)| number))
    }

    /// Fan the per-(tile, interval) queries out and fold the results.
    ///
    /// Tiles are processed sequentially; within a tile the intervals run on a
    /// pool of `fanout` workers that return their tables by value. The first
    /// non-empty header seen in the fetch is canonical; a differing later
    /// header aborts instead of misaligning silently.
    fn fetch_tiles(
        &self,
        tiles: &[Region],
        intervals: &[DateInterval],
        orbit_direction: OrbitDirection,
        relative_orbit: Option<u32>,
        scale: u32,
        fanout: usize,
    ) -> FetchResult<CoordinateMap> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(fanout.max(1))
            .build()
            .map_err(|e| FetchError::InvalidInput(format!("cannot build worker pool: {}", e)))?;

        let mut map = CoordinateMap::new();
        let mut canonical_header: Option<Vec<String>> = None;

        for (n, tile) in tiles.iter().enumerate() {
            log::debug!("Fetching subregion {}/{}", n + 1, tiles.len());

            let tables: Vec<Option<PixelTable>> = pool.install(|| {
                intervals
                    .par_iter()
                    .map(|interval| {
                        match catalog::query_region(
                            &self.client,
                            interval,
                            tile,
                            orbit_direction,
                            relative_orbit,
                            scale,
                        ) {
                            Ok(table) => Some(table),
                            Err(e) => {
                                log::warn!(
                                    "No data for subregion {} interval {}: {}",
                                    n,
                                    interval,
                                    e
                                );
                                None
                            }
                        }
                    })
                    .collect()
            });

            for table in tables.into_iter().flatten() {
                if table.is_empty() {
                    continue;
                }
                match &canonical_header {
                    None => canonical_header = Some(table.header.clone()),
                    Some(header) if *header != table.header => {
                        return Err(FetchError::HeaderMismatch(format!(
                            "expected {:?}, got {:?}",
                            header, table.header
                        )));
                    }
                    _ => {}
                }
                aggregate_table(&table, &mut map)?;
            }
        }

        Ok(map)
    }

    /// Per-image catalog properties over the span; auxiliary, so failures
    /// degrade to an empty list instead of aborting the fetch
    fn gather_image_properties(
        &self,
        region: &Region,
        span: &DateInterval,
        orbit_direction: OrbitDirection,
        relative_orbit: Option<u32>,
    ) -> Vec<ImageProperties> {
        let filter = CollectionFilter {
            start_date: span.start,
            end_date: span.end,
            geometry: region.clone(),
            orbit_direction,
            relative_orbit,
        };
        match self.client.image_properties(&filter) {
            Ok(images) => images,
            Err(e) => {
                log::warn!("Could not gather image properties: {}", e);
                Vec::new()
            }
        }
    }
}

fn build_output(
    image: AssembledImage,
    images: Vec<ImageProperties>,
    orbit_direction: OrbitDirection,
    relative_orbit: Option<u32>,
    scale: u32,
    tile_count: usize,
    interval_count: usize,
) -> FetchOutput {
    FetchOutput {
        stack: image.stack,
        coordinates: image.coordinates,
        timestamps: image.timestamps,
        metadata: FetchMetadata {
            stack_axes: ["latitude", "longitude", "polarization", "time"],
            coordinate_axes: ["latitude", "longitude"],
            orbit_direction,
            relative_orbit,
            scale,
            tile_count,
            interval_count,
            images,
        },
    }
}
