//! Query adapter: dual-polarization extraction and row join
//!
//! The catalog extracts one band per call, each with its own leading pixel-id
//! column. The adapter issues the VV and VH extractions for the same filter
//! and joins them row-by-row into a single table whose header is the VV
//! header without `id` plus `"VH"`.

use crate::types::{DateInterval, OrbitDirection, Polarization, Region};

use super::{BandQuery, CatalogClient, CatalogError, CollectionFilter, PixelTable};

/// Fetch both polarizations for one (geometry, interval) pair and join them.
pub fn query_region<C: CatalogClient>(
    client: &C,
    interval: &DateInterval,
    region: &Region,
    orbit_direction: OrbitDirection,
    relative_orbit: Option<u32>,
    scale: u32,
) -> Result<PixelTable, CatalogError> {
    let filter = CollectionFilter {
        start_date: interval.start,
        end_date: interval.end,
        geometry: region.clone(),
        orbit_direction,
        relative_orbit,
    };

    let vv = client.get_region(&BandQuery {
        filter: filter.clone(),
        band: Polarization::VV,
        scale,
    })?;
    let vh = client.get_region(&BandQuery {
        filter,
        band: Polarization::VH,
        scale,
    })?;

    join_dual_pol(vv, vh)
}

/// Join same-filter VV and VH tables on row index.
///
/// Both extractions cover the identical pixel set in the identical order, so
/// the i-th VV row and the i-th VH row describe the same pixel; anything else
/// is reported as an error rather than silently misaligned.
pub fn join_dual_pol(vv: PixelTable, vh: PixelTable) -> Result<PixelTable, CatalogError> {
    if vv.rows.len() != vh.rows.len() {
        return Err(CatalogError::Query(format!(
            "VV/VH row count mismatch: {} vs {}",
            vv.rows.len(),
            vh.rows.len()
        )));
    }

    let vh_col = vh.column("VH").ok_or_else(|| {
        CatalogError::Query(format!("no VH column in extraction header {:?}", vh.header))
    })?;
    if vv.column("VV").is_none() {
        return Err(CatalogError::Query(format!(
            "no VV column in extraction header {:?}",
            vv.header
        )));
    }

    // Drop each band's own pixel-id leading column before joining.
    let header: Vec<String> = vv
        .header
        .iter()
        .skip(1)
        .cloned()
        .chain(std::iter::once("VH".to_string()))
        .collect();

    let rows = vv
        .rows
        .into_iter()
        .zip(vh.rows)
        .map(|(vv_row, vh_row)| {
            let mut row: Vec<serde_json::Value> = vv_row.into_iter().skip(1).collect();
            row.push(
                vh_row
                    .get(vh_col)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null),
            );
            row
        })
        .collect();

    Ok(PixelTable { header, rows })
}
