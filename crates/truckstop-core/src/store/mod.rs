//! Storage abstraction for truckstop.
//!
//! The [`Store`] trait defines the record operations needed by nearby
//! ranking, text search, and the importer, so backends (SQLite, in-memory)
//! are interchangeable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::FoodTruck;

/// Which text column(s) a substring search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    /// The applicant (business) name.
    Name,
    /// The street address or the free-text location description.
    Address,
}

impl SearchField {
    /// Query parameter name; also used in validation messages.
    pub fn param(self) -> &'static str {
        match self {
            SearchField::Name => "name",
            SearchField::Address => "address",
        }
    }
}

/// One page of substring matches plus the unpaginated match count.
#[derive(Debug, Clone, Default)]
pub struct FieldMatches {
    pub data: Vec<FoodTruck>,
    pub total: i64,
}

/// Result of an upsert keyed on `object_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Abstract record store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_by_status`](Store::list_by_status) | All records with a status, case-insensitive exact match |
/// | [`search_by_field`](Store::search_by_field) | Case-insensitive substring search with limit/offset |
/// | [`get_truck`](Store::get_truck) | Fetch a single record by id |
/// | [`upsert_truck`](Store::upsert_truck) | Insert or update a record by `object_id` |
#[async_trait]
pub trait Store: Send + Sync {
    /// Every record whose status equals `status`, ignoring case.
    ///
    /// The returned order is stable between calls on unchanged data.
    async fn list_by_status(&self, status: &str) -> Result<Vec<FoodTruck>>;

    /// Substring search over `field`, optionally restricted to a status.
    ///
    /// Results are ordered by the field ascending, then `created_at`
    /// descending. `total` counts all matches, ignoring `limit`/`offset`.
    async fn search_by_field(
        &self,
        field: SearchField,
        term: &str,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<FieldMatches>;

    /// Retrieve a single record by id.
    async fn get_truck(&self, id: &str) -> Result<Option<FoodTruck>>;

    /// Insert or update a record, matching on `object_id`.
    ///
    /// On update the stored `id` and `created_at` are kept.
    async fn upsert_truck(&self, truck: &FoodTruck) -> Result<UpsertOutcome>;
}
