use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogError;

/// Polarization bands available in the dual-pol GRD collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
        }
    }
}

/// Satellite pass direction; determines which acquisitions exist over a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrbitDirection {
    Ascending,
    Descending,
}

impl std::fmt::Display for OrbitDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitDirection::Ascending => write!(f, "ASCENDING"),
            OrbitDirection::Descending => write!(f, "DESCENDING"),
        }
    }
}

/// Relative-orbit-number restriction for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitSelector {
    /// No relative-orbit filter
    Any,
    /// Restrict to one specific repeat ground track
    Fixed(u32),
    /// Pick the relative orbit with the most images over the span
    MostImages,
    /// Pick the relative orbit with the fewest (but at least one) images
    FewestImages,
}

/// Query geometry: a closed (lon, lat) ring, or a single point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Region {
    Polygon(Vec<[f64; 2]>),
    Point([f64; 2]),
}

impl Region {
    /// Build the canonical 5-vertex closed rectangle ring from two corners.
    ///
    /// Vertex order is `[top_left, top_right, bottom_right, bottom_left, top_left]`,
    /// with corners given as (lon, lat).
    pub fn rectangle(top_left: [f64; 2], bottom_right: [f64; 2]) -> Self {
        Region::Polygon(vec![
            top_left,
            [bottom_right[0], top_left[1]],
            bottom_right,
            [top_left[0], bottom_right[1]],
            top_left,
        ])
    }

    /// Extract the (top_left, bottom_right) corners of a rectangular region.
    ///
    /// Accepts the 2-corner form or the 5-vertex closed-rectangle ring
    /// produced by [`Region::rectangle`]. Anything else is rejected: the
    /// tiler only knows how to split axis-aligned rectangles.
    pub fn rect_corners(&self) -> FetchResult<([f64; 2], [f64; 2])> {
        let ring = match self {
            Region::Polygon(ring) => ring,
            Region::Point(_) => {
                return Err(FetchError::InvalidGeometry(
                    "cannot tile a point geometry".to_string(),
                ))
            }
        };

        match ring.len() {
            2 => Ok((ring[0], ring[1])),
            5 => {
                let closed = ring[4] == ring[0];
                let axis_aligned = ring[1] == [ring[2][0], ring[0][1]]
                    && ring[3] == [ring[0][0], ring[2][1]];
                if closed && axis_aligned {
                    Ok((ring[0], ring[2]))
                } else {
                    Err(FetchError::InvalidGeometry(
                        "polygon is not a closed axis-aligned rectangle".to_string(),
                    ))
                }
            }
            n => Err(FetchError::InvalidGeometry(format!(
                "expected 2 corners or a 5-vertex closed ring, got {} vertices",
                n
            ))),
        }
    }

    /// GeoJSON representation used by the catalog wire format
    pub fn to_geojson(&self) -> serde_json::Value {
        match self {
            Region::Polygon(ring) => serde_json::json!({
                "type": "Polygon",
                "coordinates": [ring],
            }),
            Region::Point(coords) => serde_json::json!({
                "type": "Point",
                "coordinates": coords,
            }),
        }
    }
}

/// Half-open `[start, end)` calendar-date interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Partition `[start, end)` into contiguous intervals of `step_days` days.
    ///
    /// Intervals are non-overlapping and cover the span exactly; the last
    /// interval is clamped to `end` when the span is not a multiple of the step.
    pub fn partition(start: NaiveDate, end: NaiveDate, step_days: i64) -> Vec<DateInterval> {
        let step = chrono::Duration::days(step_days);
        let mut intervals = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let next = (cursor + step).min(end);
            intervals.push(DateInterval::new(cursor, next));
            cursor = next;
        }
        intervals
    }

    /// Number of days spanned by this interval
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl std::fmt::Display for DateInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Error types for the fetch pipeline
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error(
        "Incorrect orbit '{0}': no bands found in collection for this location and time span, \
         see https://sentinel.esa.int/web/sentinel/missions/sentinel-1/observation-scenario"
    )]
    IncorrectOrbit(OrbitDirection),

    #[error("Could not parse a pixel count from catalog error: {0}")]
    PixelCountParse(String),

    #[error("Inconsistent result header across queries: {0}")]
    HeaderMismatch(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;
