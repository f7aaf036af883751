//! HTTP implementation of the catalog boundary
//!
//! Talks JSON to a catalog query endpoint. Authentication happens before this
//! client exists: it is constructed from a base URL and an already-issued
//! bearer token, so there is no process-wide session state.

use serde::Deserialize;

use super::{
    BandQuery, CatalogClient, CatalogError, CollectionFilter, ImageProperties, PixelTable,
    INSTRUMENT_MODE_IW, RESOLUTION_METERS, SENTINEL1_COLLECTION_ID,
};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Error envelope returned by the service on a failed query
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    values: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    images: Vec<ImageProperties>,
}

/// Catalog client over a JSON REST endpoint
pub struct HttpCatalogClient {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl HttpCatalogClient {
    /// Create a client for the given endpoint and bearer token
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, CatalogError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| CatalogError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// Fixed filter semantics shared by every request: dual-pol IW at 10 m,
    /// plus the per-request date range, geometry, pass and orbit number.
    fn filter_body(filter: &CollectionFilter) -> serde_json::Value {
        serde_json::json!({
            "collection": SENTINEL1_COLLECTION_ID,
            "dateRange": {
                "start": filter.start_date.format("%Y-%m-%d").to_string(),
                "end": filter.end_date.format("%Y-%m-%d").to_string(),
            },
            "geometry": filter.geometry.to_geojson(),
            "requiredBands": ["VV", "VH"],
            "instrumentMode": INSTRUMENT_MODE_IW,
            "orbitDirection": filter.orbit_direction.to_string(),
            "resolutionMeters": RESOLUTION_METERS,
            "relativeOrbitNumber": filter.relative_orbit,
        })
    }

    fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .map_err(|e| CatalogError::Transport(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            // Service failures carry a structured message; everything else is
            // a transport problem.
            return match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => Err(CatalogError::Query(envelope.error.message)),
                Err(_) => Err(CatalogError::Transport(format!(
                    "Request to {} failed with status {}: {}",
                    url, status, text
                ))),
            };
        }

        response
            .json()
            .map_err(|e| CatalogError::Transport(format!("Malformed response from {}: {}", url, e)))
    }
}

impl CatalogClient for HttpCatalogClient {
    fn get_region(&self, query: &BandQuery) -> Result<PixelTable, CatalogError> {
        let mut body = Self::filter_body(&query.filter);
        body["band"] = serde_json::json!(query.band.to_string());
        body["scale"] = serde_json::json!(query.scale);
        self.post("/v1/pixels:extract", &body)
    }

    fn relative_orbit_numbers(&self, filter: &CollectionFilter) -> Result<Vec<u32>, CatalogError> {
        let mut body = Self::filter_body(filter);
        body["property"] = serde_json::json!("relativeOrbitNumber_start");
        let response: AggregateResponse = self.post("/v1/images:aggregate", &body)?;
        Ok(response.values)
    }

    fn image_properties(
        &self,
        filter: &CollectionFilter,
    ) -> Result<Vec<ImageProperties>, CatalogError> {
        let body = Self::filter_body(filter);
        let response: ListResponse = self.post("/v1/images:list", &body)?;
        Ok(response.images)
    }
}
