//! San Francisco open-data importer.
//!
//! Fetches the Mobile Food Facility Permit dataset (or reads a local copy),
//! normalizes each record into a [`FoodTruck`], and upserts it by
//! `object_id`. Records without usable coordinates are skipped, since
//! nearby search cannot place them.
//!
//! ```text
//! fetch / --file → transform → skip (no coords) → upsert in batches → stats
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::future::join_all;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};

use truckstop_core::models::FoodTruck;
use truckstop_core::store::{Store, UpsertOutcome};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;
use crate::stats;

pub const APP_TOKEN_ENV: &str = "SF_GOV_APP_TOKEN";
pub const API_URL_ENV: &str = "SF_GOV_API_URL";

/// One record as published by the portal. Every value is a string.
#[derive(Debug, Default, Deserialize)]
pub struct RawRecord {
    pub objectid: Option<String>,
    pub applicant: Option<String>,
    pub facilitytype: Option<String>,
    pub cnn: Option<String>,
    pub locationdescription: Option<String>,
    pub address: Option<String>,
    pub blocklot: Option<String>,
    pub block: Option<String>,
    pub lot: Option<String>,
    pub permit: Option<String>,
    pub status: Option<String>,
    pub fooditems: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub schedule: Option<String>,
    pub approved: Option<String>,
    pub received: Option<String>,
    pub priorpermit: Option<String>,
    pub expirationdate: Option<String>,
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub total: usize,
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ImportStats {
    pub fn print(&self) {
        println!();
        println!("Import statistics:");
        println!("  Total records fetched:    {}", self.total);
        println!("  New records imported:     {}", self.imported);
        println!("  Existing records updated: {}", self.updated);
        println!("  Records skipped:          {}", self.skipped);
        println!("  Errors:                   {}", self.errors);
    }
}

/// Run `truckstop import`.
pub async fn run_import(config: &Config, dry_run: bool, file: Option<&Path>) -> Result<ImportStats> {
    let records = match file {
        Some(path) => read_records(path)?,
        None => fetch_records(config).await?,
    };

    if dry_run {
        println!("Dry run: no data will be written to the database");
    }

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool.clone());
    let counts = import_records(&store, records, config.import.batch_size, dry_run).await;
    counts.print();

    if !dry_run {
        stats::print_analysis(&pool).await?;
    }

    pool.close().await;
    Ok(counts)
}

/// Read a JSON array export from disk.
pub fn read_records(path: &Path) -> Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Import file is not valid JSON: {}", path.display()))?;
    into_array(value)
}

/// Fetch the dataset from the open-data portal.
pub async fn fetch_records(config: &Config) -> Result<Vec<serde_json::Value>> {
    let url = std::env::var(API_URL_ENV).unwrap_or_else(|_| config.import.url.clone());
    let token = std::env::var(APP_TOKEN_ENV).ok();
    if token.is_none() {
        warn!("{} not set; requests may be throttled", APP_TOKEN_ENV);
    }

    info!(%url, "fetching dataset");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.import.timeout_secs))
        .build()?;

    let mut request = client.get(&url).header(ACCEPT, "application/json");
    if let Some(token) = &token {
        request = request.header("X-App-Token", token);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("HTTP {}", status);
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.contains("application/json") {
        bail!("Expected JSON response, got: {}", content_type);
    }

    let value: serde_json::Value = response.json().await?;
    let records = into_array(value)?;
    info!(count = records.len(), "fetched dataset");
    Ok(records)
}

fn into_array(value: serde_json::Value) -> Result<Vec<serde_json::Value>> {
    match value {
        serde_json::Value::Array(items) => Ok(items),
        _ => bail!("Expected array response from SF Gov API"),
    }
}

/// Transform and upsert every record. Failures are counted, never fatal.
#[instrument(skip_all, fields(records = records.len(), dry_run = dry_run))]
pub async fn import_records(
    store: &dyn Store,
    records: Vec<serde_json::Value>,
    batch_size: usize,
    dry_run: bool,
) -> ImportStats {
    let mut stats = ImportStats {
        total: records.len(),
        ..Default::default()
    };

    let mut valid = Vec::new();
    for value in records {
        let raw: RawRecord = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "unreadable record");
                stats.errors += 1;
                continue;
            }
        };
        match transform_record(&raw) {
            Ok(truck) if has_valid_coordinates(&truck) => valid.push(truck),
            Ok(_) => stats.skipped += 1,
            Err(e) => {
                warn!(object_id = ?raw.objectid, error = %e, "failed to transform record");
                stats.errors += 1;
            }
        }
    }

    info!(
        valid = valid.len(),
        skipped = stats.skipped,
        "transformed records"
    );

    if dry_run {
        return stats;
    }

    let batch_size = batch_size.max(1);
    let batches = valid.len().div_ceil(batch_size);
    for (i, batch) in valid.chunks(batch_size).enumerate() {
        info!("processing batch {}/{}", i + 1, batches);
        let outcomes = join_all(batch.iter().map(|truck| store.upsert_truck(truck))).await;
        for (truck, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(UpsertOutcome::Inserted) => stats.imported += 1,
                Ok(UpsertOutcome::Updated) => stats.updated += 1,
                Err(e) => {
                    warn!(object_id = %truck.object_id, error = %e, "failed to import record");
                    stats.errors += 1;
                }
            }
        }
    }

    stats
}

fn has_valid_coordinates(truck: &FoodTruck) -> bool {
    match (truck.latitude, truck.longitude) {
        (Some(lat), Some(lon)) => lat.abs() <= 90.0 && lon.abs() <= 180.0,
        _ => false,
    }
}

/// Normalize a raw record. `objectid`, `applicant` and `status` are required.
pub fn transform_record(raw: &RawRecord) -> Result<FoodTruck> {
    let object_id = clean(&raw.objectid).context("record has no objectid")?;
    let applicant = clean(&raw.applicant).context("record has no applicant")?;
    let status = clean(&raw.status).context("record has no status")?;

    let mut truck = FoodTruck::new(object_id, applicant, status);
    truck.facility_type = clean(&raw.facilitytype);
    truck.cnn = clean(&raw.cnn);
    truck.location_description = clean(&raw.locationdescription);
    truck.address = clean(&raw.address);
    truck.block_lot = clean(&raw.blocklot);
    truck.block = clean(&raw.block);
    truck.lot = clean(&raw.lot);
    truck.permit = clean(&raw.permit);
    truck.food_items = clean(&raw.fooditems);
    truck.x = parse_coordinate(raw.x.as_deref());
    truck.y = parse_coordinate(raw.y.as_deref());
    truck.latitude = parse_coordinate(raw.latitude.as_deref());
    truck.longitude = parse_coordinate(raw.longitude.as_deref());
    truck.schedule = clean(&raw.schedule);
    truck.approved = parse_date(raw.approved.as_deref());
    truck.received = clean(&raw.received);
    truck.prior_permit = clean(&raw.priorpermit);
    truck.expiration_date = parse_date(raw.expirationdate.as_deref());
    Ok(truck)
}

/// Trimmed value, `None` when absent or blank.
fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The portal writes `0` for unknown coordinates.
pub fn parse_coordinate(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    if value.is_empty() || value == "0" || value == "0.0" {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Accepts `YYYYMMDD` and ISO-8601 with or without offset or fraction.
/// Offset-less values are taken as UTC.
pub fn parse_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
