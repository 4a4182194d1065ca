//! In-memory [`Store`] implementation for testing and embedding.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`; insertion order is
//! the retrieval order for [`Store::list_by_status`].

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::FoodTruck;

use super::{FieldMatches, SearchField, Store, UpsertOutcome};

/// In-memory store for tests and small fixtures.
pub struct InMemoryStore {
    trucks: RwLock<Vec<FoodTruck>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            trucks: RwLock::new(Vec::new()),
        }
    }

    pub fn with_trucks(trucks: Vec<FoodTruck>) -> Self {
        Self {
            trucks: RwLock::new(trucks),
        }
    }

    pub fn len(&self) -> usize {
        self.trucks.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_ignore_case(haystack: Option<&str>, needle_lower: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(needle_lower))
        .unwrap_or(false)
}

fn matches_field(truck: &FoodTruck, field: SearchField, needle_lower: &str) -> bool {
    match field {
        SearchField::Name => contains_ignore_case(Some(&truck.applicant), needle_lower),
        SearchField::Address => {
            contains_ignore_case(truck.address.as_deref(), needle_lower)
                || contains_ignore_case(truck.location_description.as_deref(), needle_lower)
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_by_status(&self, status: &str) -> Result<Vec<FoodTruck>> {
        let trucks = self
            .trucks
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(trucks
            .iter()
            .filter(|t| t.status.eq_ignore_ascii_case(status))
            .cloned()
            .collect())
    }

    async fn search_by_field(
        &self,
        field: SearchField,
        term: &str,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<FieldMatches> {
        let needle = term.to_lowercase();
        let trucks = self
            .trucks
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;

        let mut matches: Vec<&FoodTruck> = trucks
            .iter()
            .filter(|t| matches_field(t, field, &needle))
            .filter(|t| status.map_or(true, |s| t.status.eq_ignore_ascii_case(s)))
            .collect();

        matches.sort_by(|a, b| {
            let primary = match field {
                SearchField::Name => a.applicant.cmp(&b.applicant),
                SearchField::Address => a.address.cmp(&b.address),
            };
            primary.then(b.created_at.cmp(&a.created_at))
        });

        let total = matches.len() as i64;
        let data = matches
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok(FieldMatches { data, total })
    }

    async fn get_truck(&self, id: &str) -> Result<Option<FoodTruck>> {
        let trucks = self
            .trucks
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(trucks.iter().find(|t| t.id == id).cloned())
    }

    async fn upsert_truck(&self, truck: &FoodTruck) -> Result<UpsertOutcome> {
        let mut trucks = self
            .trucks
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;

        if let Some(existing) = trucks.iter_mut().find(|t| t.object_id == truck.object_id) {
            let id = existing.id.clone();
            let created_at = existing.created_at;
            *existing = truck.clone();
            existing.id = id;
            existing.created_at = created_at;
            existing.updated_at = chrono::Utc::now();
            return Ok(UpsertOutcome::Updated);
        }

        trucks.push(truck.clone());
        Ok(UpsertOutcome::Inserted)
    }
}
