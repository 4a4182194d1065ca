//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` and `[server]` is optional and falls back to
//! the defaults below. Secrets are never read from the file: the Google
//! Routes key comes from `GOOGLE_MAPS_API_KEY` and the open-data app token
//! from `SF_GOV_APP_TOKEN`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use truckstop_core::geo::Kilometers;
use truckstop_core::models::DEFAULT_STATUS;
use truckstop_core::nearby::{FailurePolicy, NearbySettings};
use truckstop_core::text_search::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub nearby: NearbyConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub distance: DistanceConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed browser origin. Absent means any origin.
    #[serde(default)]
    pub cors_origin: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct NearbyConfig {
    #[serde(default = "default_radius_km")]
    pub default_radius_km: f64,
    #[serde(default = "default_max_radius_km")]
    pub max_radius_km: f64,
    #[serde(default = "default_nearby_limit")]
    pub default_limit: usize,
    #[serde(default = "default_nearby_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_status")]
    pub default_status: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self {
            default_radius_km: default_radius_km(),
            max_radius_km: default_max_radius_km(),
            default_limit: default_nearby_limit(),
            max_limit: default_nearby_max_limit(),
            default_status: default_status(),
            max_concurrency: default_max_concurrency(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl NearbyConfig {
    pub fn settings(&self) -> NearbySettings {
        NearbySettings {
            default_radius: Kilometers(self.default_radius_km),
            max_radius: Kilometers(self.max_radius_km),
            default_limit: self.default_limit,
            max_limit: self.max_limit,
            default_status: self.default_status.clone(),
            max_concurrency: self.max_concurrency,
            failure_policy: self.failure_policy,
        }
    }
}

fn default_radius_km() -> f64 {
    5.0
}
fn default_max_radius_km() -> f64 {
    50.0
}
fn default_nearby_limit() -> usize {
    5
}
fn default_nearby_max_limit() -> usize {
    50
}
fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}
fn default_max_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: i64,
    #[serde(default = "default_search_max_limit")]
    pub max_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_search_max_limit(),
        }
    }
}

fn default_search_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}
fn default_search_max_limit() -> i64 {
    MAX_PAGE_LIMIT
}

#[derive(Debug, Deserialize, Clone)]
pub struct DistanceConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_routes_url")]
    pub url: String,
    #[serde(default = "default_distance_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_routes_url(),
            timeout_secs: default_distance_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_provider() -> String {
    "google".to_string()
}
fn default_routes_url() -> String {
    "https://routes.googleapis.com/directions/v2:computeRoutes".to_string()
}
fn default_distance_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_import_url")]
    pub url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_import_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            url: default_import_url(),
            batch_size: default_batch_size(),
            timeout_secs: default_import_timeout_secs(),
        }
    }
}

fn default_import_url() -> String {
    "https://data.sfgov.org/resource/rqzj-sfat.json".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_import_timeout_secs() -> u64 {
    60
}

impl Config {
    /// A config with every optional section at its default.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            server: ServerConfig {
                bind: "127.0.0.1:3333".to_string(),
                cors_origin: None,
                request_timeout_secs: default_request_timeout_secs(),
            },
            nearby: NearbyConfig::default(),
            search: SearchConfig::default(),
            distance: DistanceConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let nearby = &config.nearby;
    if nearby.max_concurrency == 0 {
        anyhow::bail!("nearby.max_concurrency must be >= 1");
    }
    if nearby.max_limit == 0 {
        anyhow::bail!("nearby.max_limit must be >= 1");
    }
    if nearby.default_limit == 0 || nearby.default_limit > nearby.max_limit {
        anyhow::bail!("nearby.default_limit must be in [1, nearby.max_limit]");
    }
    if !nearby.max_radius_km.is_finite() || nearby.max_radius_km <= 0.0 {
        anyhow::bail!("nearby.max_radius_km must be > 0");
    }
    if !(nearby.default_radius_km > 0.0 && nearby.default_radius_km <= nearby.max_radius_km) {
        anyhow::bail!("nearby.default_radius_km must be in (0, nearby.max_radius_km]");
    }
    if nearby.default_status.trim().is_empty() {
        anyhow::bail!("nearby.default_status must not be empty");
    }

    if config.search.max_limit < 1 {
        anyhow::bail!("search.max_limit must be >= 1");
    }
    if config.search.default_limit < 1 || config.search.default_limit > config.search.max_limit {
        anyhow::bail!("search.default_limit must be in [1, search.max_limit]");
    }

    if config.import.batch_size == 0 {
        anyhow::bail!("import.batch_size must be >= 1");
    }

    match config.distance.provider.as_str() {
        "google" | "haversine" => {}
        other => anyhow::bail!(
            "Unknown distance provider: '{}'. Must be google or haversine.",
            other
        ),
    }

    Ok(())
}
