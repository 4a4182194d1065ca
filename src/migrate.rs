//! Database schema migrations (idempotent).

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema in the configured database.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create tables and indexes on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Timestamps are unix seconds; `approved`/`expiration_date` likewise.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS food_trucks (
            id TEXT PRIMARY KEY,
            object_id TEXT NOT NULL UNIQUE,
            applicant TEXT NOT NULL,
            facility_type TEXT,
            cnn TEXT,
            location_description TEXT,
            address TEXT,
            block_lot TEXT,
            block TEXT,
            lot TEXT,
            permit TEXT,
            status TEXT NOT NULL,
            food_items TEXT,
            x REAL,
            y REAL,
            latitude REAL,
            longitude REAL,
            schedule TEXT,
            approved INTEGER,
            received TEXT,
            prior_permit TEXT,
            expiration_date INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_food_trucks_status ON food_trucks(status COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_food_trucks_applicant ON food_trucks(applicant)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_food_trucks_address ON food_trucks(address)")
        .execute(pool)
        .await?;

    Ok(())
}
