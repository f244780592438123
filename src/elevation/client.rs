//! Open-Elevation compatible HTTP client

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::ElevationProvider;
use crate::config::ElevationConfig;
use crate::{GeoKitError, Result};

#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: Option<f64>,
}

/// Client for `GET {base_url}/api/v1/lookup?locations=lat,lon|...`
pub struct OpenElevationClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl OpenElevationClient {
    pub fn new(config: &ElevationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("geokit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeoKitError::Network(format!("failed to create HTTP client: {e}")))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Request URL for a batch of `(lat, lon)` positions
    #[must_use]
    pub fn lookup_url(&self, locations: &[(f64, f64)]) -> String {
        let joined = locations
            .iter()
            .map(|(lat, lon)| format!("{lat},{lon}"))
            .collect::<Vec<_>>()
            .join("|");
        format!(
            "{}/api/v1/lookup?locations={}",
            self.base_url,
            urlencoding::encode(&joined)
        )
    }
}

/// Elevations of a lookup response body, padded with `None` to `expected`
pub(crate) fn parse_lookup_response(body: &str, expected: usize) -> Result<Vec<Option<f64>>> {
    let response: LookupResponse = serde_json::from_str(body)
        .map_err(|e| GeoKitError::api(format!("invalid elevation response: {e}")))?;

    if response.results.is_empty() && expected > 0 {
        return Err(GeoKitError::api("elevation response contained no results"));
    }
    if response.results.len() != expected {
        warn!(
            "Elevation service returned {} results for {} locations",
            response.results.len(),
            expected
        );
    }

    let mut elevations: Vec<Option<f64>> = response
        .results
        .into_iter()
        .take(expected)
        .map(|r| r.elevation)
        .collect();
    elevations.resize(expected, None);
    Ok(elevations)
}

#[async_trait]
impl ElevationProvider for OpenElevationClient {
    #[instrument(skip(self, locations), fields(count = locations.len()))]
    async fn lookup(&self, locations: &[(f64, f64)]) -> Result<Vec<Option<f64>>> {
        if locations.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.lookup_url(locations);
        debug!("Elevation request URL: {}", url);
        let start_time = Instant::now();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeoKitError::Network(format!("elevation request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoKitError::api(format!(
                "elevation service returned HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeoKitError::Network(format!("failed to read elevation response: {e}")))?;

        let elapsed = start_time.elapsed();
        debug!("Elevation lookup took {:.3}s", elapsed.as_secs_f64());
        if elapsed.as_secs() > 5 {
            warn!("Slow elevation response detected: {:.3}s", elapsed.as_secs_f64());
        }

        parse_lookup_response(&body, locations.len())
    }
}
