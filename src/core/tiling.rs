//! Region tiling against the catalog pixel ceiling
//!
//! A query whose extraction would exceed the catalog's point limit has to be
//! split. The split is a regular `g x g` grid over the region's bounding
//! rectangle, with `g = ceil(sqrt(pixel_count / max_pixels))`, so that each
//! tile stays under the ceiling.

use crate::types::{FetchResult, Region};

/// Split `region` into catalog-sized tiles.
///
/// Returns the region untouched (normalized to its closed rectangle ring)
/// when `pixel_count` is already below the ceiling; otherwise a row-major
/// `g x g` grid of rectangles. Tile edges are computed from the original
/// corners (`x0 + i * width / g`), so adjacent tiles share bitwise-identical
/// boundaries and the grid reconstructs the bounding rectangle exactly.
pub fn tile_region(pixel_count: u64, region: &Region, max_pixels: u64) -> FetchResult<Vec<Region>> {
    let (top_left, bottom_right) = region.rect_corners()?;

    if pixel_count < max_pixels {
        return Ok(vec![Region::rectangle(top_left, bottom_right)]);
    }

    let grid_length = (pixel_count as f64 / max_pixels as f64).sqrt().ceil() as usize;
    log::debug!(
        "Tiling region into {}x{} grid ({} pixels, ceiling {})",
        grid_length,
        grid_length,
        pixel_count,
        max_pixels
    );

    let [x0, y0] = top_left;
    let width = bottom_right[0] - top_left[0];
    let height = bottom_right[1] - top_left[1];
    let g = grid_length as f64;

    // Each edge is computed once and shared by the tiles on both of its
    // sides, and the outer edges are pinned to the original corners, so the
    // grid meets and covers the extent without any rounding seam.
    let edge = |origin: f64, extent: f64, far: f64, k: usize| {
        if k == grid_length {
            far
        } else {
            origin + k as f64 * extent / g
        }
    };
    let lon_edges: Vec<f64> = (0..=grid_length)
        .map(|k| edge(x0, width, bottom_right[0], k))
        .collect();
    let lat_edges: Vec<f64> = (0..=grid_length)
        .map(|k| edge(y0, height, bottom_right[1], k))
        .collect();

    let mut tiles = Vec::with_capacity(grid_length * grid_length);
    for row in 0..grid_length {
        for col in 0..grid_length {
            tiles.push(Region::rectangle(
                [lon_edges[col], lat_edges[row]],
                [lon_edges[col + 1], lat_edges[row + 1]],
            ));
        }
    }

    Ok(tiles)
}
