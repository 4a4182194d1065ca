//! Paginated name and address search.
//!
//! Thin layer over [`Store::search_by_field`]: validates the term and
//! pagination, normalizes the optional status filter, and wraps the store
//! result in the `{ data, total, pagination }` envelope.

use serde::Serialize;

use crate::error::{NearbyError, Result};
use crate::models::FoodTruck;
use crate::store::{SearchField, Store};

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Requested page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Fill in defaults and check bounds: `1 <= limit <= max_limit`,
    /// `offset >= 0`.
    pub fn resolve(
        limit: Option<i64>,
        offset: Option<i64>,
        default_limit: i64,
        max_limit: i64,
    ) -> Result<Self> {
        let limit = limit.unwrap_or(default_limit);
        if limit < 1 || limit > max_limit {
            return Err(NearbyError::invalid(format!(
                "limit must be between 1 and {}",
                max_limit
            )));
        }
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(NearbyError::invalid("offset must not be negative"));
        }
        Ok(Self { limit, offset })
    }
}

/// Pagination block of a [`SearchPage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub pagination: PageInfo,
}

/// Run a case-insensitive substring search over `field`.
///
/// An empty (or whitespace-only) term is rejected before the store is
/// touched. A blank status is treated as no status filter.
pub async fn search_by_field(
    store: &dyn Store,
    field: SearchField,
    term: &str,
    status: Option<&str>,
    pagination: Pagination,
) -> Result<SearchPage<FoodTruck>> {
    let term = term.trim();
    if term.is_empty() {
        return Err(NearbyError::invalid(format!(
            "{} parameter is required",
            capitalize(field.param())
        )));
    }
    let status = status.map(str::trim).filter(|s| !s.is_empty());

    let matches = store
        .search_by_field(field, term, status, pagination.limit, pagination.offset)
        .await
        .map_err(NearbyError::upstream)?;

    Ok(SearchPage {
        data: matches.data,
        total: matches.total,
        pagination: PageInfo {
            limit: pagination.limit,
            offset: pagination.offset,
            has_more: pagination.offset.saturating_add(pagination.limit) < matches.total,
        },
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
