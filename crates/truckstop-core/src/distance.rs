//! Distance provider abstraction.
//!
//! A [`DistanceProvider`] answers "how far is it from A to B" for one pair
//! of points. Each call is independent and may fail on its own; timeouts
//! and any retry policy belong to the implementation.
//!
//! The HTTP-backed routing provider lives in the application crate.
//! [`HaversineProvider`] is a local straight-line fallback that never fails.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::geo::{haversine, Kilometers, Point};

#[async_trait]
pub trait DistanceProvider: Send + Sync {
    /// Short identifier used in logs (e.g. `"google"`, `"haversine"`).
    fn name(&self) -> &str;

    /// Travel distance from `origin` to `destination`.
    async fn distance(&self, origin: Point, destination: Point)
        -> Result<Kilometers, ProviderError>;
}

/// Great-circle distance provider.
pub struct HaversineProvider;

#[async_trait]
impl DistanceProvider for HaversineProvider {
    fn name(&self) -> &str {
        "haversine"
    }

    async fn distance(
        &self,
        origin: Point,
        destination: Point,
    ) -> Result<Kilometers, ProviderError> {
        Ok(haversine(origin, destination))
    }
}
