//! Radius-bounded "nearby" search.
//!
//! [`NearbySearch`] turns a query point and the candidate records for a
//! status into the `limit` nearest reachable records. It owns no state
//! between invocations; the record store and distance provider are handed
//! in at construction.
//!
//! # Algorithm
//!
//! 1. Validate and resolve the query (defaults, bounds). Nothing external
//!    is called when validation fails.
//! 2. Fetch every record with the requested status from the [`Store`].
//! 3. Drop records without a usable location.
//! 4. Look up a distance for each remaining record, at most
//!    `max_concurrency` lookups in flight.
//! 5. Apply the [`FailurePolicy`] to failed lookups.
//! 6. Keep records with `distance <= radius`.
//! 7. Sort by distance ascending, ties by retrieval order.
//! 8. Truncate to `limit` and drop the distance.

use std::future::Future;
use std::sync::Arc;

use futures::future::{self, Either};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::distance::DistanceProvider;
use crate::error::{NearbyError, ProviderError, Result};
use crate::geo::{Kilometers, Point};
use crate::models::{FoodTruck, DEFAULT_STATUS};
use crate::store::Store;

/// What to do when a single distance lookup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Treat the candidate as out of range and carry on.
    #[default]
    Isolate,
    /// Fail the whole search with the first provider error.
    Abort,
}

/// Defaults and bounds applied to every [`NearbyQuery`].
#[derive(Debug, Clone)]
pub struct NearbySettings {
    pub default_radius: Kilometers,
    pub max_radius: Kilometers,
    pub default_limit: usize,
    pub max_limit: usize,
    pub default_status: String,
    /// Distance lookups allowed in flight at once.
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for NearbySettings {
    fn default() -> Self {
        Self {
            default_radius: Kilometers(5.0),
            max_radius: Kilometers(50.0),
            default_limit: 5,
            max_limit: 50,
            default_status: DEFAULT_STATUS.to_string(),
            max_concurrency: 8,
            failure_policy: FailurePolicy::Isolate,
        }
    }
}

/// Caller input for one nearby search. `None` fields take the configured
/// defaults.
#[derive(Debug, Clone)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: Option<Kilometers>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

impl NearbyQuery {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius: None,
            status: None,
            limit: None,
        }
    }

    pub fn radius(mut self, radius: Kilometers) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A validated query with every default filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub origin: Point,
    pub radius: Kilometers,
    pub status: String,
    pub limit: usize,
}

/// A candidate with its looked-up distance and retrieval position.
struct ScoredCandidate {
    truck: FoodTruck,
    distance: Kilometers,
    position: usize,
}

/// Nearby search over a [`Store`] using a [`DistanceProvider`].
#[derive(Clone)]
pub struct NearbySearch {
    store: Arc<dyn Store>,
    distance: Arc<dyn DistanceProvider>,
    settings: NearbySettings,
}

impl NearbySearch {
    pub fn new(
        store: Arc<dyn Store>,
        distance: Arc<dyn DistanceProvider>,
        settings: NearbySettings,
    ) -> Self {
        Self {
            store,
            distance,
            settings,
        }
    }

    pub fn settings(&self) -> &NearbySettings {
        &self.settings
    }

    /// Validate `query` and fill in defaults.
    pub fn resolve(&self, query: &NearbyQuery) -> Result<ResolvedQuery> {
        let origin = Point::new(query.latitude, query.longitude)?;

        let radius = query.radius.unwrap_or(self.settings.default_radius);
        if !radius.0.is_finite() || radius.0 <= 0.0 {
            return Err(NearbyError::invalid("Radius must be a positive number"));
        }
        if radius.0 > self.settings.max_radius.0 {
            return Err(NearbyError::invalid(format!(
                "Radius must not exceed {}",
                self.settings.max_radius
            )));
        }

        let limit = query.limit.unwrap_or(self.settings.default_limit);
        if limit == 0 || limit > self.settings.max_limit {
            return Err(NearbyError::invalid(format!(
                "Limit must be between 1 and {}",
                self.settings.max_limit
            )));
        }

        let status = query
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.settings.default_status)
            .to_string();

        Ok(ResolvedQuery {
            origin,
            radius,
            status,
            limit,
        })
    }

    /// Find the nearest records within the query radius.
    pub async fn find_nearby(&self, query: NearbyQuery) -> Result<Vec<FoodTruck>> {
        self.find_nearby_until(query, future::pending()).await
    }

    /// Like [`find_nearby`](Self::find_nearby), but gives up with
    /// [`NearbyError::Cancelled`] as soon as `cancel` completes. Pending
    /// distance lookups are dropped; no partial result is returned.
    pub async fn find_nearby_until<F>(&self, query: NearbyQuery, cancel: F) -> Result<Vec<FoodTruck>>
    where
        F: Future<Output = ()> + Send,
    {
        let resolved = self.resolve(&query)?;

        let search = self.rank(resolved);
        futures::pin_mut!(search);
        futures::pin_mut!(cancel);

        match future::select(search, cancel).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => {
                warn!("nearby search cancelled before all lookups settled");
                Err(NearbyError::Cancelled)
            }
        }
    }

    #[instrument(
        name = "find_nearby",
        skip_all,
        fields(origin = %query.origin, radius = %query.radius, status = %query.status, limit = query.limit)
    )]
    async fn rank(&self, query: ResolvedQuery) -> Result<Vec<FoodTruck>> {
        let candidates = self
            .store
            .list_by_status(&query.status)
            .await
            .map_err(NearbyError::upstream)?;
        let fetched = candidates.len();

        let located: Vec<(usize, FoodTruck, Point)> = candidates
            .into_iter()
            .enumerate()
            .filter_map(|(position, truck)| truck.location().map(|p| (position, truck, p)))
            .collect();
        debug!(fetched, located = located.len(), "candidates loaded");

        let origin = query.origin;
        let provider = self.distance.as_ref();
        let mut lookups = stream::iter(located)
            .map(|(position, truck, point)| async move {
                let outcome = provider.distance(origin, point).await;
                (position, truck, outcome)
            })
            .buffer_unordered(self.settings.max_concurrency.max(1));

        let mut scored = Vec::new();
        let mut failed = 0usize;
        while let Some((position, truck, outcome)) = lookups.next().await {
            let outcome = outcome.and_then(|d| {
                if d.is_valid() {
                    Ok(d)
                } else {
                    Err(ProviderError::new(format!("invalid distance: {}", d.0)))
                }
            });
            match outcome {
                Ok(distance) => scored.push(ScoredCandidate {
                    truck,
                    distance,
                    position,
                }),
                Err(err) => match self.settings.failure_policy {
                    FailurePolicy::Isolate => {
                        failed += 1;
                        warn!(
                            truck = %truck.id,
                            provider = provider.name(),
                            error = %err,
                            "distance lookup failed, skipping candidate"
                        );
                    }
                    FailurePolicy::Abort => return Err(NearbyError::Provider(err)),
                },
            }
        }

        let results = rank_within(scored, query.radius, query.limit);
        debug!(failed, returned = results.len(), "nearby search complete");
        Ok(results)
    }
}

/// Filter by radius, order by distance then retrieval position, truncate.
fn rank_within(
    mut scored: Vec<ScoredCandidate>,
    radius: Kilometers,
    limit: usize,
) -> Vec<FoodTruck> {
    scored.retain(|c| c.distance.0 <= radius.0);
    scored.sort_by(|a, b| {
        a.distance
            .0
            .total_cmp(&b.distance.0)
            .then(a.position.cmp(&b.position))
    });
    scored.truncate(limit);
    scored.into_iter().map(|c| c.truck).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::{FieldMatches, SearchField, UpsertOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const SF_LAT: f64 = 37.7749;
    const SF_LON: f64 = -122.4194;

    /// Store wrapper that counts calls and can be switched to fail.
    struct CountingStore {
        inner: InMemoryStore,
        calls: AtomicUsize,
        last_status: Mutex<Option<String>>,
        fail: bool,
    }

    impl CountingStore {
        fn new(trucks: Vec<FoodTruck>) -> Self {
            Self {
                inner: InMemoryStore::with_trucks(trucks),
                calls: AtomicUsize::new(0),
                last_status: Mutex::new(None),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Store for CountingStore {
        async fn list_by_status(&self, status: &str) -> anyhow::Result<Vec<FoodTruck>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_status.lock().unwrap() = Some(status.to_string());
            if self.fail {
                anyhow::bail!("connection refused");
            }
            self.inner.list_by_status(status).await
        }

        async fn search_by_field(
            &self,
            field: SearchField,
            term: &str,
            status: Option<&str>,
            limit: i64,
            offset: i64,
        ) -> anyhow::Result<FieldMatches> {
            self.inner
                .search_by_field(field, term, status, limit, offset)
                .await
        }

        async fn get_truck(&self, id: &str) -> anyhow::Result<Option<FoodTruck>> {
            self.inner.get_truck(id).await
        }

        async fn upsert_truck(&self, truck: &FoodTruck) -> anyhow::Result<UpsertOutcome> {
            self.inner.upsert_truck(truck).await
        }
    }

    /// Provider answering from a table keyed by destination latitude.
    struct ScriptedProvider {
        answers: Vec<(f64, std::result::Result<Kilometers, ProviderError>)>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(answers: Vec<(f64, std::result::Result<Kilometers, ProviderError>)>) -> Self {
            Self {
                answers,
                delay: None,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DistanceProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn distance(
            &self,
            _origin: Point,
            destination: Point,
        ) -> std::result::Result<Kilometers, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.answers
                .iter()
                .find(|(lat, _)| *lat == destination.latitude())
                .map(|(_, answer)| answer.clone())
                .unwrap_or_else(|| Err(ProviderError::new("No routes found")))
        }
    }

    fn truck(object_id: &str, lat: f64) -> FoodTruck {
        FoodTruck::new(object_id, format!("Truck {}", object_id), "APPROVED")
            .with_location(lat, SF_LON)
    }

    fn ok(lat: f64, km: f64) -> (f64, std::result::Result<Kilometers, ProviderError>) {
        (lat, Ok(Kilometers(km)))
    }

    fn search(
        store: Arc<CountingStore>,
        provider: Arc<ScriptedProvider>,
        settings: NearbySettings,
    ) -> NearbySearch {
        NearbySearch::new(store, provider, settings)
    }

    fn ids(trucks: &[FoodTruck]) -> Vec<&str> {
        trucks.iter().map(|t| t.object_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_excludes_candidates_outside_radius() {
        let store = Arc::new(CountingStore::new(vec![truck("near", 37.78), truck("far", 37.85)]));
        let provider = Arc::new(ScriptedProvider::new(vec![ok(37.78, 1.2), ok(37.85, 8.0)]));
        let nearby = search(store, provider, NearbySettings::default());

        let query = NearbyQuery::new(SF_LAT, SF_LON)
            .radius(Kilometers(5.0))
            .status("APPROVED")
            .limit(5);
        let results = nearby.find_nearby(query).await.unwrap();
        assert_eq!(ids(&results), vec!["near"]);
    }

    #[tokio::test]
    async fn test_orders_by_distance_with_stable_ties() {
        let store = Arc::new(CountingStore::new(vec![
            truck("a", 37.1),
            truck("b", 37.2),
            truck("c", 37.3),
            truck("d", 37.4),
        ]));
        let provider = Arc::new(ScriptedProvider::new(vec![
            ok(37.1, 3.0),
            ok(37.2, 1.0),
            ok(37.3, 3.0),
            ok(37.4, 1.0),
        ]));
        let nearby = search(store, provider, NearbySettings::default());

        let results = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON).limit(10))
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["b", "d", "a", "c"]);
    }

    #[tokio::test]
    async fn test_truncates_to_limit() {
        let store = Arc::new(CountingStore::new(vec![truck("far", 37.2), truck("close", 37.1)]));
        let provider = Arc::new(ScriptedProvider::new(vec![ok(37.1, 0.5), ok(37.2, 2.0)]));
        let nearby = search(store, provider, NearbySettings::default());

        let results = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON).limit(1))
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["close"]);
    }

    #[tokio::test]
    async fn test_returns_all_when_fewer_than_limit() {
        let store = Arc::new(CountingStore::new(vec![truck("x", 37.1), truck("y", 37.2)]));
        let provider = Arc::new(ScriptedProvider::new(vec![ok(37.1, 0.5), ok(37.2, 2.0)]));
        let nearby = search(store, provider, NearbySettings::default());

        let results = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON).limit(50))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_external_calls() {
        let store = Arc::new(CountingStore::new(vec![truck("a", 37.1)]));
        let provider = Arc::new(ScriptedProvider::new(vec![ok(37.1, 0.5)]));
        let nearby = search(store.clone(), provider.clone(), NearbySettings::default());

        let bad_queries = vec![
            NearbyQuery::new(90.01, SF_LON),
            NearbyQuery::new(-91.0, SF_LON),
            NearbyQuery::new(SF_LAT, 180.5),
            NearbyQuery::new(SF_LAT, -181.0),
            NearbyQuery::new(f64::NAN, SF_LON),
            NearbyQuery::new(SF_LAT, SF_LON).radius(Kilometers(0.0)),
            NearbyQuery::new(SF_LAT, SF_LON).radius(Kilometers(-1.0)),
            NearbyQuery::new(SF_LAT, SF_LON).radius(Kilometers(f64::INFINITY)),
            NearbyQuery::new(SF_LAT, SF_LON).radius(Kilometers(50.5)),
            NearbyQuery::new(SF_LAT, SF_LON).limit(0),
            NearbyQuery::new(SF_LAT, SF_LON).limit(51),
        ];

        for query in bad_queries {
            let err = nearby.find_nearby(query.clone()).await.unwrap_err();
            assert!(
                matches!(err, NearbyError::InvalidArgument(_)),
                "expected InvalidArgument for {:?}, got {:?}",
                query,
                err
            );
        }
        assert_eq!(store.calls(), 0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_isolates_individual_provider_failures() {
        let store = Arc::new(CountingStore::new(vec![
            truck("broken", 37.1),
            truck("fine", 37.2),
            truck("also-fine", 37.3),
        ]));
        let provider = Arc::new(ScriptedProvider::new(vec![
            (37.1, Err(ProviderError::new("Google Routes API failed: quota"))),
            ok(37.2, 2.5),
            ok(37.3, 1.5),
        ]));
        let nearby = search(store, provider.clone(), NearbySettings::default());

        let results = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON))
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["also-fine", "fine"]);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_every_lookup_failing_yields_empty_result() {
        let store = Arc::new(CountingStore::new(vec![truck("a", 37.1), truck("b", 37.2)]));
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let nearby = search(store, provider, NearbySettings::default());

        let results = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_abort_policy_surfaces_provider_error() {
        let store = Arc::new(CountingStore::new(vec![truck("broken", 37.1), truck("fine", 37.2)]));
        let provider = Arc::new(ScriptedProvider::new(vec![
            (37.1, Err(ProviderError::new("No routes found"))),
            ok(37.2, 1.0),
        ]));
        let settings = NearbySettings {
            failure_policy: FailurePolicy::Abort,
            ..NearbySettings::default()
        };
        let nearby = search(store, provider, settings);

        let err = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON))
            .await
            .unwrap_err();
        match err {
            NearbyError::Provider(e) => assert_eq!(e.message, "No routes found"),
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_distances_are_dropped() {
        let store = Arc::new(CountingStore::new(vec![truck("nan", 37.1), truck("ok", 37.2)]));
        let provider = Arc::new(ScriptedProvider::new(vec![
            ok(37.1, f64::NAN),
            ok(37.2, 4.0),
        ]));
        let nearby = search(store, provider, NearbySettings::default());

        let results = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON))
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_empty_candidate_set_is_not_an_error() {
        let store = Arc::new(CountingStore::new(Vec::new()));
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let nearby = search(store.clone(), provider.clone(), NearbySettings::default());

        let results = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON).status("APPROVED"))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(store.calls(), 1);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_candidates_without_location_are_not_looked_up() {
        let unlocated = FoodTruck::new("nowhere", "Ghost Truck", "APPROVED");
        let store = Arc::new(CountingStore::new(vec![unlocated, truck("here", 37.1)]));
        let provider = Arc::new(ScriptedProvider::new(vec![ok(37.1, 0.3)]));
        let nearby = search(store, provider.clone(), NearbySettings::default());

        let results = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON))
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["here"]);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_upstream_unavailable() {
        let store = Arc::new(CountingStore::failing());
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let nearby = search(store, provider, NearbySettings::default());

        let err = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON))
            .await
            .unwrap_err();
        assert!(matches!(err, NearbyError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_defaults_are_applied() {
        let store = Arc::new(CountingStore::new(Vec::new()));
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let nearby = search(store.clone(), provider, NearbySettings::default());

        let resolved = nearby
            .resolve(&NearbyQuery::new(SF_LAT, SF_LON).status("   "))
            .unwrap();
        assert_eq!(resolved.radius, Kilometers(5.0));
        assert_eq!(resolved.limit, 5);
        assert_eq!(resolved.status, "APPROVED");

        nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON))
            .await
            .unwrap();
        assert_eq!(store.last_status.lock().unwrap().as_deref(), Some("APPROVED"));
    }

    #[tokio::test]
    async fn test_fan_out_respects_concurrency_bound() {
        let trucks: Vec<FoodTruck> = (0..20)
            .map(|i| truck(&format!("t{}", i), 37.0 + i as f64 / 100.0))
            .collect();
        let answers = (0..20)
            .map(|i| ok(37.0 + i as f64 / 100.0, i as f64 / 10.0))
            .collect();
        let store = Arc::new(CountingStore::new(trucks));
        let provider =
            Arc::new(ScriptedProvider::new(answers).with_delay(Duration::from_millis(10)));
        let settings = NearbySettings {
            max_concurrency: 3,
            ..NearbySettings::default()
        };
        let nearby = search(store, provider.clone(), settings);

        let results = nearby
            .find_nearby(NearbyQuery::new(SF_LAT, SF_LON).limit(50))
            .await
            .unwrap();
        assert_eq!(results.len(), 20);
        assert_eq!(results[0].object_id, "t0");
        assert_eq!(provider.calls(), 20);
        let peak = provider.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {} exceeded bound", peak);
        assert!(peak > 1, "lookups were not issued concurrently");
    }

    #[tokio::test]
    async fn test_cancellation_returns_cancelled() {
        let store = Arc::new(CountingStore::new(vec![truck("slow", 37.1)]));
        let provider = Arc::new(
            ScriptedProvider::new(vec![ok(37.1, 0.1)]).with_delay(Duration::from_secs(5)),
        );
        let nearby = search(store, provider, NearbySettings::default());

        let err = nearby
            .find_nearby_until(
                NearbyQuery::new(SF_LAT, SF_LON),
                tokio::time::sleep(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NearbyError::Cancelled));
    }

    #[test]
    fn test_rank_within_includes_radius_boundary() {
        let scored = vec![
            ScoredCandidate {
                truck: truck("edge", 37.1),
                distance: Kilometers(5.0),
                position: 0,
            },
            ScoredCandidate {
                truck: truck("over", 37.2),
                distance: Kilometers(5.0001),
                position: 1,
            },
        ];
        let results = rank_within(scored, Kilometers(5.0), 5);
        assert_eq!(ids(&results), vec!["edge"]);
    }
}
