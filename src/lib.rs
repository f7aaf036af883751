//! sarfetch: A Fast, Parallel Sentinel-1 SAR Time-Series Fetcher
//!
//! This library fetches Sentinel-1 time-series imagery for a geographic
//! region from a remote satellite-imagery catalog and assembles the
//! irregular, paginated query results into a dense
//! `(height, width, polarization, time)` stack.
//!
//! The catalog limits the point count of a single extraction, so large
//! regions are probed, tiled into a grid of sub-regions under the ceiling,
//! fetched per tile and per day (optionally in parallel) and merged back
//! into one raster with deterministic pixel ordering and duplicate-date
//! averaging.
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use sarfetch::{FetchParams, Fetcher, HttpCatalogClient};
//!
//! # fn main() -> Result<(), sarfetch::FetchError> {
//! let client = HttpCatalogClient::new("https://catalog.example.com", "token")?;
//! let fetcher = Fetcher::new(client);
//!
//! let params = FetchParams::rectangle(
//!     [-104.77, 41.81],
//!     [-104.65, 41.72],
//!     NaiveDate::from_ymd_opt(2020, 10, 24).unwrap(),
//!     NaiveDate::from_ymd_opt(2020, 11, 2).unwrap(),
//! );
//! let result = fetcher.fetch(&params)?;
//! println!("stack shape: {:?}", result.stack.dim());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod core;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    DateInterval, FetchError, FetchResult, OrbitDirection, OrbitSelector, Polarization, Region,
};

pub use catalog::{CatalogClient, CatalogError, CollectionFilter, HttpCatalogClient, PixelTable};

pub use core::{
    assemble, tile_region, CoordinateSeries, FetchMetadata, FetchOutput, FetchParams, Fetcher,
    PointParams,
};
