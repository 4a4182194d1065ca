//! Distance provider implementations and selection.
//!
//! - **[`GoogleRoutesProvider`]**: driving distance from the Google Routes
//!   API (`directions/v2:computeRoutes`, first route, `distanceMeters`).
//! - **[`HaversineProvider`]**: straight-line distance, no network. Useful
//!   offline and in tests.
//!
//! Use [`create_provider`] to build the one named by `[distance].provider`.
//!
//! # Retry Strategy
//!
//! Retries are off by default (`max_retries = 0`). When enabled:
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors and timeouts → retry
//! - backoff: 250ms, 500ms, 1s, 2s, 4s (capped)

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use truckstop_core::distance::{DistanceProvider, HaversineProvider};
use truckstop_core::error::ProviderError;
use truckstop_core::geo::{Kilometers, Point};

use crate::config::DistanceConfig;

/// Environment variable holding the Google Maps Platform key.
pub const API_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";

const FIELD_MASK: &str = "routes.distanceMeters,routes.duration";

/// Build the provider selected in config.
pub fn create_provider(config: &DistanceConfig) -> Result<Arc<dyn DistanceProvider>> {
    match config.provider.as_str() {
        "google" => Ok(Arc::new(GoogleRoutesProvider::from_env(config)?)),
        "haversine" => Ok(Arc::new(HaversineProvider)),
        other => anyhow::bail!("Unknown distance provider: {}", other),
    }
}

/// Driving distance via the Google Routes API.
pub struct GoogleRoutesProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl GoogleRoutesProvider {
    /// Build a provider with an explicit key. A missing key is reported by
    /// every lookup rather than here, so the server can still start and
    /// serve text search.
    pub fn new(config: &DistanceConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_retries: config.max_retries,
        })
    }

    /// Build a provider reading the key from `GOOGLE_MAPS_API_KEY`.
    pub fn from_env(config: &DistanceConfig) -> Result<Self> {
        let key = std::env::var(API_KEY_ENV).ok();
        if key.is_none() {
            warn!("{} not set; nearby lookups will fail", API_KEY_ENV);
        }
        Self::new(config, key)
    }

    async fn compute_route(
        &self,
        api_key: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<Kilometers, String> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(250 << (attempt - 1).min(4));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header("X-Goog-Api-Key", api_key)
                .header("X-Goog-FieldMask", FIELD_MASK)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.map_err(|e| e.to_string())?;

                    if status.is_success() {
                        return parse_routes_response(&text);
                    }

                    let message = upstream_message(&text).unwrap_or_else(|| status.to_string());
                    if status.as_u16() == 429 || status.is_server_error() {
                        debug!(attempt, %status, "routes request failed, may retry");
                        last_err = Some(message);
                        continue;
                    }
                    return Err(message);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "routes request failed, may retry");
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "Unexpected error".to_string()))
    }
}

#[async_trait]
impl DistanceProvider for GoogleRoutesProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn distance(
        &self,
        origin: Point,
        destination: Point,
    ) -> std::result::Result<Kilometers, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| routes_error("No Google API key found"))?;

        let body = route_request(origin, destination);
        self.compute_route(api_key, &body)
            .await
            .map_err(routes_error)
    }
}

fn routes_error(detail: impl std::fmt::Display) -> ProviderError {
    ProviderError::new(format!("Google Routes API failed: {}", detail))
}

fn lat_lng(p: Point) -> serde_json::Value {
    serde_json::json!({
        "location": {
            "latLng": { "latitude": p.latitude(), "longitude": p.longitude() }
        }
    })
}

/// Request body for a driving route between two points.
pub fn route_request(origin: Point, destination: Point) -> serde_json::Value {
    serde_json::json!({
        "origin": lat_lng(origin),
        "destination": lat_lng(destination),
        "travelMode": "DRIVE",
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutesResponse {
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Route {
    #[serde(default)]
    distance_meters: Option<f64>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Distance of the first route in a `computeRoutes` response.
fn parse_routes_response(text: &str) -> std::result::Result<Kilometers, String> {
    let parsed: RoutesResponse =
        serde_json::from_str(text).map_err(|e| format!("invalid response: {}", e))?;
    let route = parsed
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| "No routes found".to_string())?;
    // The API omits distanceMeters for a zero-length route.
    Ok(Kilometers::from_meters(route.distance_meters.unwrap_or(0.0)))
}

/// `error.message` from a Google API error body, if present.
fn upstream_message(text: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(text)
        .ok()
        .map(|e| e.error.message)
}
