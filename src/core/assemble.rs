//! Dense image assembly from per-coordinate series
//!
//! Turns the aggregated, arrival-order-free coordinate series into a regular
//! `(height, width, band, time)` stack plus its coordinate grid. The canonical
//! ordering is re-derived here: latitudes descending (north at the top),
//! longitudes ascending, acquisition days ascending. Duplicate acquisitions
//! on the same day are averaged; unobserved cells and days stay NaN.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use ndarray::{Array3, Array4};

use super::aggregate::CoordinateSeries;

/// Band order along the stack's third axis
pub const BAND_ORDER: [crate::types::Polarization; 2] =
    [crate::types::Polarization::VV, crate::types::Polarization::VH];

/// Assembled fetch result: stack, coordinate grid and time axis
#[derive(Debug, Clone)]
pub struct AssembledImage {
    /// `(height, width, 2, timestamps)`; band 0 = VV, band 1 = VH
    pub stack: Array4<f64>,
    /// `(height, width, 2)`; `[.., 0]` latitude, `[.., 1]` longitude
    pub coordinates: Array3<f64>,
    /// Unique acquisition days, ascending
    pub timestamps: Vec<NaiveDate>,
}

/// UTC calendar day of an epoch-seconds acquisition time
pub fn epoch_day(epoch_seconds: i64) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp(epoch_seconds, 0).map(|dt| dt.date_naive())
}

/// Assemble the coordinate series into a dense stack.
///
/// The result is independent of the order of `series`: the spatial axes come
/// from the sorted unique coordinates and the time axis from the sorted
/// unique days, and each cell is filled by coordinate lookup. Empty input
/// yields a `(0, 0, 2, 0)` stack.
pub fn assemble(series: &[CoordinateSeries]) -> AssembledImage {
    // Spatial axes: unique latitudes north-to-south, longitudes west-to-east.
    let mut unique_lats: Vec<f64> = series.iter().map(|s| s.lat).collect();
    unique_lats.sort_by(|a, b| b.total_cmp(a));
    unique_lats.dedup();

    let mut unique_lons: Vec<f64> = series.iter().map(|s| s.lon).collect();
    unique_lons.sort_by(f64::total_cmp);
    unique_lons.dedup();

    // Bit-pattern keys: the coordinates are compared exactly as received.
    let lat_index: HashMap<u64, usize> = unique_lats
        .iter()
        .enumerate()
        .map(|(i, lat)| (lat.to_bits(), i))
        .collect();
    let lon_index: HashMap<u64, usize> = unique_lons
        .iter()
        .enumerate()
        .map(|(j, lon)| (lon.to_bits(), j))
        .collect();

    // Time axis: unique UTC days across every series, ascending.
    let days: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.epochs.iter().filter_map(|&e| epoch_day(e)))
        .collect();
    let timestamps: Vec<NaiveDate> = days.into_iter().collect();
    let day_index: HashMap<NaiveDate, usize> = timestamps
        .iter()
        .enumerate()
        .map(|(t, &day)| (day, t))
        .collect();

    let (height, width) = (unique_lats.len(), unique_lons.len());
    log::debug!(
        "Assembling image of shape ({}, {}) over {} acquisition days",
        height,
        width,
        timestamps.len()
    );

    let mut coordinates = Array3::zeros((height, width, 2));
    for (i, &lat) in unique_lats.iter().enumerate() {
        for (j, &lon) in unique_lons.iter().enumerate() {
            coordinates[[i, j, 0]] = lat;
            coordinates[[i, j, 1]] = lon;
        }
    }

    let mut stack = Array4::from_elem((height, width, 2, timestamps.len()), f64::NAN);

    for s in series {
        let (row, col) = (lat_index[&s.lat.to_bits()], lon_index[&s.lon.to_bits()]);

        // NaN-mean per day and band: sum/count over non-NaN samples.
        let mut sums = vec![[0.0_f64; 2]; timestamps.len()];
        let mut counts = vec![[0_u32; 2]; timestamps.len()];
        for (k, &epoch) in s.epochs.iter().enumerate() {
            let t = match epoch_day(epoch).and_then(|day| day_index.get(&day)) {
                Some(&t) => t,
                None => continue,
            };
            for (band, &value) in [s.vv[k], s.vh[k]].iter().enumerate() {
                if !value.is_nan() {
                    sums[t][band] += value;
                    counts[t][band] += 1;
                }
            }
        }

        for t in 0..timestamps.len() {
            for band in 0..2 {
                if counts[t][band] > 0 {
                    stack[[row, col, band, t]] = sums[t][band] / counts[t][band] as f64;
                }
            }
        }
    }

    AssembledImage {
        stack,
        coordinates,
        timestamps,
    }
}
