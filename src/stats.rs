//! Dataset analysis.
//!
//! Summarizes what the importer left in the database: permit status and
//! facility type distributions plus coordinate coverage. Used by
//! `truckstop stats` and at the end of every import.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Aggregates over the `food_trucks` table.
#[derive(Debug, Default, PartialEq)]
pub struct DatasetStats {
    /// `(status, count)`, most common first.
    pub by_status: Vec<(String, i64)>,
    /// `(facility type, count)`, most common first. `None` is unrecorded.
    pub by_facility: Vec<(Option<String>, i64)>,
    pub total: i64,
    pub with_coordinates: i64,
}

impl DatasetStats {
    pub fn missing_coordinates(&self) -> i64 {
        self.total - self.with_coordinates
    }
}

/// Run `truckstop stats`.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    println!("truckstop: Dataset Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());

    print_analysis(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Query and print the analysis for an open pool.
pub async fn print_analysis(pool: &SqlitePool) -> Result<()> {
    let stats = collect(pool).await?;

    println!();
    println!("  Status distribution:");
    for (status, count) in &stats.by_status {
        println!("    {:<24} {:>6}", status, count);
    }

    println!();
    println!("  Facility type distribution:");
    for (facility, count) in &stats.by_facility {
        println!(
            "    {:<24} {:>6}",
            facility.as_deref().unwrap_or("Unknown"),
            count
        );
    }

    println!();
    println!("  Coordinate quality:");
    println!("    Total records:           {}", stats.total);
    println!("    With valid coordinates:  {}", stats.with_coordinates);
    println!("    Missing coordinates:     {}", stats.missing_coordinates());
    println!();

    Ok(())
}

pub async fn collect(pool: &SqlitePool) -> Result<DatasetStats> {
    let status_rows = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM food_trucks GROUP BY status ORDER BY n DESC, status ASC",
    )
    .fetch_all(pool)
    .await?;

    let facility_rows = sqlx::query(
        "SELECT facility_type, COUNT(*) AS n FROM food_trucks \
         GROUP BY facility_type ORDER BY n DESC, facility_type ASC",
    )
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM food_trucks")
        .fetch_one(pool)
        .await?;

    let with_coordinates: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM food_trucks WHERE latitude IS NOT NULL AND longitude IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;

    Ok(DatasetStats {
        by_status: status_rows
            .iter()
            .map(|r| (r.get("status"), r.get("n")))
            .collect(),
        by_facility: facility_rows
            .iter()
            .map(|r| (r.get("facility_type"), r.get("n")))
            .collect(),
        total,
        with_coordinates,
    })
}
