//! SQLite-backed [`Store`] implementation.
//!
//! Status filters use `COLLATE NOCASE` equality; substring filters compare
//! `lower()`ed columns with `instr`, so `%` and `_` in user input are plain
//! characters.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use truckstop_core::models::FoodTruck;
use truckstop_core::store::{FieldMatches, SearchField, Store, UpsertOutcome};

const COLUMNS: &str = "id, object_id, applicant, facility_type, cnn, location_description, \
    address, block_lot, block, lot, permit, status, food_items, x, y, latitude, longitude, \
    schedule, approved, received, prior_permit, expiration_date, created_at, updated_at";

/// SQLite implementation of the [`Store`] trait over the `food_trucks` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn row_to_truck(row: &SqliteRow) -> Result<FoodTruck> {
    let approved: Option<i64> = row.try_get("approved")?;
    let expiration_date: Option<i64> = row.try_get("expiration_date")?;
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at: i64 = row.try_get("updated_at")?;

    Ok(FoodTruck {
        id: row.try_get("id")?,
        object_id: row.try_get("object_id")?,
        applicant: row.try_get("applicant")?,
        facility_type: row.try_get("facility_type")?,
        cnn: row.try_get("cnn")?,
        location_description: row.try_get("location_description")?,
        address: row.try_get("address")?,
        block_lot: row.try_get("block_lot")?,
        block: row.try_get("block")?,
        lot: row.try_get("lot")?,
        permit: row.try_get("permit")?,
        status: row.try_get("status")?,
        food_items: row.try_get("food_items")?,
        x: row.try_get("x")?,
        y: row.try_get("y")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        schedule: row.try_get("schedule")?,
        approved: approved.map(from_ts),
        received: row.try_get("received")?,
        prior_permit: row.try_get("prior_permit")?,
        expiration_date: expiration_date.map(from_ts),
        created_at: from_ts(created_at),
        updated_at: from_ts(updated_at),
    })
}

/// `WHERE` clause for a substring search; placeholders are the term (once
/// per searched column) followed by the optional status.
fn field_filter(field: SearchField, with_status: bool) -> String {
    let mut clause = match field {
        SearchField::Name => "instr(lower(applicant), lower(?)) > 0".to_string(),
        SearchField::Address => "(instr(lower(COALESCE(address, '')), lower(?)) > 0 \
             OR instr(lower(COALESCE(location_description, '')), lower(?)) > 0)"
            .to_string(),
    };
    if with_status {
        clause.push_str(" AND status = ? COLLATE NOCASE");
    }
    clause
}

fn term_binds(field: SearchField) -> usize {
    match field {
        SearchField::Name => 1,
        SearchField::Address => 2,
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_by_status(&self, status: &str) -> Result<Vec<FoodTruck>> {
        let sql = format!(
            "SELECT {} FROM food_trucks WHERE status = ? COLLATE NOCASE ORDER BY rowid ASC",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_truck).collect()
    }

    async fn search_by_field(
        &self,
        field: SearchField,
        term: &str,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<FieldMatches> {
        let filter = field_filter(field, status.is_some());
        let order = match field {
            SearchField::Name => "applicant ASC, created_at DESC",
            SearchField::Address => "address ASC, created_at DESC",
        };

        let data_sql = format!(
            "SELECT {} FROM food_trucks WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            COLUMNS, filter, order
        );
        let count_sql = format!("SELECT COUNT(*) FROM food_trucks WHERE {}", filter);

        let mut data_query = sqlx::query(&data_sql);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for _ in 0..term_binds(field) {
            data_query = data_query.bind(term);
            count_query = count_query.bind(term);
        }
        if let Some(status) = status {
            data_query = data_query.bind(status);
            count_query = count_query.bind(status);
        }
        data_query = data_query.bind(limit).bind(offset);

        let (rows, total) = tokio::try_join!(
            data_query.fetch_all(&self.pool),
            count_query.fetch_one(&self.pool),
        )?;

        let data = rows.iter().map(row_to_truck).collect::<Result<Vec<_>>>()?;
        Ok(FieldMatches { data, total })
    }

    async fn get_truck(&self, id: &str) -> Result<Option<FoodTruck>> {
        let sql = format!("SELECT {} FROM food_trucks WHERE id = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_truck).transpose()
    }

    async fn upsert_truck(&self, truck: &FoodTruck) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp();

        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM food_trucks WHERE object_id = ?")
                .bind(&truck.object_id)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = if existing.is_some() {
            sqlx::query(
                r#"
                UPDATE food_trucks SET
                    applicant = ?, facility_type = ?, cnn = ?, location_description = ?,
                    address = ?, block_lot = ?, block = ?, lot = ?, permit = ?, status = ?,
                    food_items = ?, x = ?, y = ?, latitude = ?, longitude = ?, schedule = ?,
                    approved = ?, received = ?, prior_permit = ?, expiration_date = ?,
                    updated_at = ?
                WHERE object_id = ?
                "#,
            )
            .bind(&truck.applicant)
            .bind(&truck.facility_type)
            .bind(&truck.cnn)
            .bind(&truck.location_description)
            .bind(&truck.address)
            .bind(&truck.block_lot)
            .bind(&truck.block)
            .bind(&truck.lot)
            .bind(&truck.permit)
            .bind(&truck.status)
            .bind(&truck.food_items)
            .bind(truck.x)
            .bind(truck.y)
            .bind(truck.latitude)
            .bind(truck.longitude)
            .bind(&truck.schedule)
            .bind(truck.approved.map(|d| d.timestamp()))
            .bind(&truck.received)
            .bind(&truck.prior_permit)
            .bind(truck.expiration_date.map(|d| d.timestamp()))
            .bind(now)
            .bind(&truck.object_id)
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Updated
        } else {
            let sql = format!(
                "INSERT INTO food_trucks ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                COLUMNS
            );
            sqlx::query(&sql)
                .bind(&truck.id)
                .bind(&truck.object_id)
                .bind(&truck.applicant)
                .bind(&truck.facility_type)
                .bind(&truck.cnn)
                .bind(&truck.location_description)
                .bind(&truck.address)
                .bind(&truck.block_lot)
                .bind(&truck.block)
                .bind(&truck.lot)
                .bind(&truck.permit)
                .bind(&truck.status)
                .bind(&truck.food_items)
                .bind(truck.x)
                .bind(truck.y)
                .bind(truck.latitude)
                .bind(truck.longitude)
                .bind(&truck.schedule)
                .bind(truck.approved.map(|d| d.timestamp()))
                .bind(&truck.received)
                .bind(&truck.prior_permit)
                .bind(truck.expiration_date.map(|d| d.timestamp()))
                .bind(truck.created_at.timestamp())
                .bind(truck.updated_at.timestamp())
                .execute(&mut *tx)
                .await?;
            UpsertOutcome::Inserted
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use tempfile::TempDir;

    async fn fresh_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("trucks.sqlite"))
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn sample(object_id: &str, applicant: &str, status: &str, address: &str) -> FoodTruck {
        FoodTruck::new(object_id, applicant, status)
            .with_address(address)
            .with_location(37.7749, -122.4194)
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let (_tmp, store) = fresh_store().await;
        let mut truck = sample("obj-1", "Tacos El Primo", "APPROVED", "123 Mission St");
        truck.food_items = Some("Tacos: Burritos".to_string());
        truck.approved = DateTime::from_timestamp(1_564_617_600, 0);

        assert_eq!(
            store.upsert_truck(&truck).await.unwrap(),
            UpsertOutcome::Inserted
        );
        let stored = store.get_truck(&truck.id).await.unwrap().unwrap();
        assert_eq!(stored.applicant, "Tacos El Primo");
        assert_eq!(stored.food_items.as_deref(), Some("Tacos: Burritos"));
        assert_eq!(stored.latitude, Some(37.7749));
        assert_eq!(stored.approved, truck.approved);

        let mut changed = truck.clone();
        changed.id = "ignored".to_string();
        changed.status = "EXPIRED".to_string();
        assert_eq!(
            store.upsert_truck(&changed).await.unwrap(),
            UpsertOutcome::Updated
        );
        let stored = store.get_truck(&truck.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "EXPIRED");
        assert!(store.get_truck("ignored").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_status_ignores_case() {
        let (_tmp, store) = fresh_store().await;
        store
            .upsert_truck(&sample("1", "A", "APPROVED", "1 A St"))
            .await
            .unwrap();
        store
            .upsert_truck(&sample("2", "B", "approved", "2 B St"))
            .await
            .unwrap();
        store
            .upsert_truck(&sample("3", "C", "REQUESTED", "3 C St"))
            .await
            .unwrap();

        let approved = store.list_by_status("Approved").await.unwrap();
        let ids: Vec<&str> = approved.iter().map(|t| t.object_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_search_by_field_filters_orders_and_counts() {
        let (_tmp, store) = fresh_store().await;
        store
            .upsert_truck(&sample("1", "Tacos El Primo", "APPROVED", "123 Mission St"))
            .await
            .unwrap();
        store
            .upsert_truck(&sample("2", "Burger Palace", "APPROVED", "456 Market St"))
            .await
            .unwrap();
        let mut described = sample("3", "Taco Loco", "EXPIRED", "9 Valencia St");
        described.location_description = Some("MISSION ST: 16TH ST to 17TH ST".to_string());
        store.upsert_truck(&described).await.unwrap();

        let names = store
            .search_by_field(SearchField::Name, "taco", None, 10, 0)
            .await
            .unwrap();
        assert_eq!(names.total, 2);
        assert_eq!(names.data[0].applicant, "Taco Loco");

        let approved = store
            .search_by_field(SearchField::Name, "TACO", Some("approved"), 10, 0)
            .await
            .unwrap();
        assert_eq!(approved.total, 1);
        assert_eq!(approved.data[0].object_id, "1");

        let mission = store
            .search_by_field(SearchField::Address, "mission", None, 1, 0)
            .await
            .unwrap();
        assert_eq!(mission.total, 2);
        assert_eq!(mission.data.len(), 1);
        assert_eq!(mission.data[0].object_id, "1");
    }

    #[tokio::test]
    async fn test_like_wildcards_are_literal() {
        let (_tmp, store) = fresh_store().await;
        store
            .upsert_truck(&sample("1", "Tacos", "APPROVED", "1 Main St"))
            .await
            .unwrap();
        let res = store
            .search_by_field(SearchField::Name, "%", None, 10, 0)
            .await
            .unwrap();
        assert_eq!(res.total, 0);
    }
}
