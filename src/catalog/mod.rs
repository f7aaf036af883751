//! Remote catalog boundary
//!
//! The fetch pipeline never talks to the imagery catalog directly; it goes
//! through the [`CatalogClient`] trait so an already-authenticated client can
//! be injected (and replaced by an in-memory fake in tests).

pub mod http;
pub mod query;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{OrbitDirection, Polarization, Region};

pub use http::HttpCatalogClient;
pub use query::{join_dual_pol, query_region};

/// Dual-polarization Sentinel-1 GRD collection
pub const SENTINEL1_COLLECTION_ID: &str = "COPERNICUS/S1_GRD";

/// Interferometric wide-swath instrument mode
pub const INSTRUMENT_MODE_IW: &str = "IW";

/// Nominal resolution filter, meters
pub const RESOLUTION_METERS: u32 = 10;

/// Maximum point count the catalog allows per extraction query
pub const MAX_CATALOG_PIXELS: u64 = 1_048_576;

/// Message the catalog returns when the filtered collection is empty
pub const NO_BANDS_MESSAGE: &str = "No bands in collection.";

/// Leading text of the over-capacity error, followed by the point count
pub const TOO_MANY_VALUES_PREFIX: &str = "Too many values: ";

/// Collection filter applied to every catalog call.
///
/// Dual polarization (VV and VH present), IW mode and 10 m resolution are
/// implied; only the date range, geometry, pass direction and the optional
/// relative orbit number vary per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionFilter {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub geometry: Region,
    pub orbit_direction: OrbitDirection,
    pub relative_orbit: Option<u32>,
}

/// One single-band extraction request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandQuery {
    pub filter: CollectionFilter,
    pub band: Polarization,
    pub scale: u32,
}

/// Tabular extraction result: a header row and per-pixel value rows.
///
/// For a raw band extraction the header is
/// `["id", "longitude", "latitude", "time", "<band>"]` with `time` in
/// epoch milliseconds; cell types are heterogeneous (the id is a string,
/// band values may be null), hence JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl PixelTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a named column, if present
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

/// Per-image catalog properties, gathered alongside pixel data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageProperties {
    #[serde(rename = "system:id")]
    pub id: String,
    /// Acquisition start, epoch milliseconds
    #[serde(rename = "system:time_start")]
    pub time_start: i64,
    #[serde(rename = "relativeOrbitNumber_start")]
    pub relative_orbit: u32,
    #[serde(rename = "orbitNumber_start")]
    pub orbit_number: u64,
    #[serde(rename = "sliceNumber", default)]
    pub slice_number: Option<u32>,
    #[serde(rename = "cycleNumber", default)]
    pub cycle_number: Option<u32>,
}

/// Error types at the catalog boundary
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Failure reported by the service itself; the message payload is the
    /// only structure the service gives us, so callers pattern-match it
    #[error("{0}")]
    Query(String),

    /// Transport-level failure (connection, timeout, malformed response)
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Remote catalog capabilities the fetch pipeline depends on.
///
/// `Sync` is required so one client can serve concurrent fetch workers.
pub trait CatalogClient: Sync {
    /// Extract per-pixel values of one band over the filtered collection
    fn get_region(&self, query: &BandQuery) -> Result<PixelTable, CatalogError>;

    /// Relative orbit numbers of every image matching the filter, one entry
    /// per image (used to histogram repeat ground tracks)
    fn relative_orbit_numbers(&self, filter: &CollectionFilter) -> Result<Vec<u32>, CatalogError>;

    /// Catalog properties of every image matching the filter
    fn image_properties(
        &self,
        filter: &CollectionFilter,
    ) -> Result<Vec<ImageProperties>, CatalogError>;
}

impl<C: CatalogClient + ?Sized> CatalogClient for &C {
    fn get_region(&self, query: &BandQuery) -> Result<PixelTable, CatalogError> {
        (**self).get_region(query)
    }

    fn relative_orbit_numbers(&self, filter: &CollectionFilter) -> Result<Vec<u32>, CatalogError> {
        (**self).relative_orbit_numbers(filter)
    }

    fn image_properties(
        &self,
        filter: &CollectionFilter,
    ) -> Result<Vec<ImageProperties>, CatalogError> {
        (**self).image_properties(filter)
    }
}

/// Extract the point count from an over-capacity catalog error message.
///
/// The catalog reports the size of a too-large request only inside its error
/// text, e.g. `"Too many values: 4194304 points ..."`; that count is what the
/// tiler needs.
pub fn parse_pixel_count(message: &str) -> Option<u64> {
    message
        .split(TOO_MANY_VALUES_PREFIX)
        .nth(1)?
        .split(" points")
        .next()?
        .trim()
        .parse()
        .ok()
}
