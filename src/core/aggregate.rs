//! Per-coordinate aggregation of query rows
//!
//! Joined query results arrive as sparse, unordered rows from many (tile,
//! interval) tasks. This stage folds them into one map from coordinate to its
//! measurement series. Keys are the decimal strings of the coordinates as the
//! service produced them, which sidesteps float identity questions. Same-day
//! repeats are kept as separate entries; averaging is the assembler's job.

use std::collections::HashMap;

use crate::catalog::PixelTable;
use crate::types::{FetchError, FetchResult};

/// One decoded row of a joined dual-pol table
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Acquisition time, epoch seconds
    pub epoch_seconds: i64,
    pub vv: f64,
    pub vh: f64,
}

/// Time series of measurements at one pixel coordinate.
///
/// The three vectors are index-aligned and append-only: the i-th epoch is
/// the acquisition time of the i-th VV/VH pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateSeries {
    pub lat: f64,
    pub lon: f64,
    pub vv: Vec<f64>,
    pub vh: Vec<f64>,
    pub epochs: Vec<i64>,
}

impl CoordinateSeries {
    fn seeded(sample: &RawSample) -> Self {
        Self {
            lat: sample.latitude,
            lon: sample.longitude,
            vv: vec![sample.vv],
            vh: vec![sample.vh],
            epochs: vec![sample.epoch_seconds],
        }
    }

    fn push(&mut self, sample: &RawSample) {
        self.vv.push(sample.vv);
        self.vh.push(sample.vh);
        self.epochs.push(sample.epoch_seconds);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

/// Shared aggregation target across tiles and intervals
pub type CoordinateMap = HashMap<String, CoordinateSeries>;

/// Map key for one coordinate: `"<lat>:<lon>"`
pub fn coordinate_key(lat: f64, lon: f64) -> String {
    format!("{}:{}", lat, lon)
}

/// Decode the rows of a joined table into samples.
///
/// Band cells may be null (no measurement for that pixel) and decode to NaN;
/// rows without a usable coordinate or time are dropped with a warning. A
/// table lacking any of the required columns is a layout error.
pub fn decode_samples(table: &PixelTable) -> FetchResult<Vec<RawSample>> {
    let column = |name: &str| {
        table.column(name).ok_or_else(|| {
            FetchError::HeaderMismatch(format!(
                "required column '{}' missing from header {:?}",
                name, table.header
            ))
        })
    };
    let lat_col = column("latitude")?;
    let lon_col = column("longitude")?;
    let time_col = column("time")?;
    let vv_col = column("VV")?;
    let vh_col = column("VH")?;

    let cell = |row: &[serde_json::Value], col: usize| row.get(col).and_then(|v| v.as_f64());

    let mut samples = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let (lat, lon, time_ms) = match (cell(row, lat_col), cell(row, lon_col), cell(row, time_col))
        {
            (Some(lat), Some(lon), Some(time)) => (lat, lon, time as i64),
            _ => {
                log::warn!("Dropping row without coordinate or time: {:?}", row);
                continue;
            }
        };

        samples.push(RawSample {
            latitude: lat,
            longitude: lon,
            epoch_seconds: time_ms.div_euclid(1000),
            vv: cell(row, vv_col).unwrap_or(f64::NAN),
            vh: cell(row, vh_col).unwrap_or(f64::NAN),
        });
    }
    Ok(samples)
}

/// Fold decoded samples into the shared coordinate map.
///
/// Creates a series on the first sample for a coordinate and appends
/// afterwards, so folding disjoint batches in any grouping yields the same
/// map.
pub fn aggregate_samples(samples: &[RawSample], map: &mut CoordinateMap) {
    for sample in samples {
        let key = coordinate_key(sample.latitude, sample.longitude);
        match map.get_mut(&key) {
            Some(series) => series.push(sample),
            None => {
                map.insert(key, CoordinateSeries::seeded(sample));
            }
        }
    }
}

/// Decode and fold one joined table in a single step
pub fn aggregate_table(table: &PixelTable, map: &mut CoordinateMap) -> FetchResult<()> {
    let samples = decode_samples(table)?;
    aggregate_samples(&samples, map);
    Ok(())
}
