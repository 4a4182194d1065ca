//! CLI search commands.
//!
//! `truckstop search`, `search-address` and `nearby` run the same core
//! searches as the HTTP API against the local database and print a table.

use anyhow::{bail, Result};
use std::sync::Arc;

use truckstop_core::models::FoodTruck;
use truckstop_core::nearby::{NearbyQuery, NearbySearch};
use truckstop_core::store::{SearchField, Store};
use truckstop_core::text_search::{self, Pagination};
use truckstop_core::distance::{DistanceProvider, HaversineProvider};
use truckstop_core::geo::{haversine, Point};
use truckstop_core::Kilometers;

use crate::config::Config;
use crate::db;
use crate::distance::create_provider;
use crate::sqlite_store::SqliteStore;

/// Page options shared by the text search commands.
#[derive(Debug, Clone, Default)]
pub struct PageArgs {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn run_text_search(
    config: &Config,
    field: SearchField,
    term: &str,
    args: PageArgs,
) -> Result<()> {
    let pagination = Pagination::resolve(
        args.limit,
        args.offset,
        config.search.default_limit,
        config.search.max_limit,
    )?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let page = text_search::search_by_field(
        &store,
        field,
        term,
        args.status.as_deref(),
        pagination,
    )
    .await;
    pool.close().await;
    let page = page?;

    if page.data.is_empty() {
        println!("No results.");
        return Ok(());
    }

    print_table(&page.data, None);
    println!();
    let (first, last) = shown_range(page.pagination.offset, page.data.len());
    println!(
        "Showing {}-{} of {}{}",
        first,
        last,
        page.total,
        if page.pagination.has_more {
            " (more available, use --offset)"
        } else {
            ""
        }
    );
    Ok(())
}

pub async fn run_nearby(config: &Config, query: NearbyQuery) -> Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let provider = create_provider(&config.distance)?;
    let search = NearbySearch::new(store, provider.clone(), config.nearby.settings());

    let origin = search.resolve(&query)?.origin;

    let result = search
        .find_nearby_until(query, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    pool.close().await;
    let trucks = result?;

    if trucks.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let distances = displayed_distances(provider.name(), origin, &trucks);
    print_table(&trucks, distances.as_deref());
    println!();
    println!("{} result(s), ranked by {} distance", trucks.len(), provider.name());
    Ok(())
}

/// Distances to print next to each row. Only a haversine ranking can be
/// re-derived locally; for any other provider the column is left out.
fn displayed_distances(
    provider: &str,
    origin: Point,
    trucks: &[FoodTruck],
) -> Option<Vec<Option<Kilometers>>> {
    if provider != HaversineProvider.name() {
        return None;
    }
    Some(
        trucks
            .iter()
            .map(|t| t.location().map(|p| haversine(origin, p)))
            .collect(),
    )
}

/// `truckstop get <id>`: print one record in full.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let truck = store.get_truck(id).await;
    pool.close().await;

    let Some(truck) = truck? else {
        bail!("food truck not found: {}", id);
    };

    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    println!("--- Food Truck ---");
    println!("id:            {}", truck.id);
    println!("object_id:     {}", truck.object_id);
    println!("applicant:     {}", truck.applicant);
    println!("status:        {}", truck.status);
    println!("facility_type: {}", opt(&truck.facility_type));
    println!("address:       {}", opt(&truck.address));
    println!("location:      {}", opt(&truck.location_description));
    if let Some(p) = truck.location() {
        println!("coordinates:   {}", p);
    }
    println!("permit:        {}", opt(&truck.permit));
    if let Some(approved) = truck.approved {
        println!("approved:      {}", approved.format("%Y-%m-%d"));
    }
    if let Some(expires) = truck.expiration_date {
        println!("expires:       {}", expires.format("%Y-%m-%d"));
    }
    if let Some(items) = &truck.food_items {
        println!();
        println!("{}", items);
    }
    Ok(())
}

fn print_table(trucks: &[FoodTruck], distances: Option<&[Option<Kilometers>]>) {
    for (i, truck) in trucks.iter().enumerate() {
        let address = truck
            .address
            .as_deref()
            .or(truck.location_description.as_deref())
            .unwrap_or("-");
        let distance = distances
            .and_then(|d| d.get(i).copied().flatten())
            .map(|km| format!("  ({} straight-line)", km))
            .unwrap_or_default();

        println!("{}. {} [{}]{}", i + 1, truck.applicant, truck.status, distance);
        println!("    id:      {}", truck.id);
        println!("    address: {}", address);
        if let Some(items) = &truck.food_items {
            println!("    food:    {}", truncate(items, 100));
        }
    }
}

/// 1-based first and last row numbers of a non-empty page.
fn shown_range(offset: i64, rows: usize) -> (i64, i64) {
    let rows = i64::try_from(rows).unwrap_or(i64::MAX);
    (offset.saturating_add(1), offset.saturating_add(rows))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
