//! Core fetch pipeline modules

pub mod aggregate;
pub mod assemble;
pub mod fetch;
pub mod tiling;

// Re-export main types
pub use aggregate::{
    aggregate_samples, aggregate_table, coordinate_key, CoordinateMap, CoordinateSeries, RawSample,
};
pub use assemble::{assemble, epoch_day, AssembledImage};
pub use fetch::{
    FetchMetadata, FetchOutput, FetchParams, Fetcher, PointParams, DEFAULT_FANOUT, DEFAULT_SCALE,
};
pub use tiling::tile_region;
