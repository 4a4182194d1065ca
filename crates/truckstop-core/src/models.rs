//! Core data models used throughout truckstop.
//!
//! A [`FoodTruck`] is one mobile food facility permit as published by the
//! San Francisco open-data portal, normalized for storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Point;

/// Status value used when a caller does not ask for one.
pub const DEFAULT_STATUS: &str = "APPROVED";

/// A mobile food facility permit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodTruck {
    pub id: String,
    /// Identifier in the source dataset; unique across imports.
    pub object_id: String,
    pub applicant: String,
    pub facility_type: Option<String>,
    pub cnn: Option<String>,
    pub location_description: Option<String>,
    pub address: Option<String>,
    pub block_lot: Option<String>,
    pub block: Option<String>,
    pub lot: Option<String>,
    pub permit: Option<String>,
    pub status: String,
    pub food_items: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub schedule: Option<String>,
    pub approved: Option<DateTime<Utc>>,
    pub received: Option<String>,
    pub prior_permit: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FoodTruck {
    /// A minimal record with a fresh id and timestamps; all optional
    /// attributes empty.
    pub fn new(
        object_id: impl Into<String>,
        applicant: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            object_id: object_id.into(),
            applicant: applicant.into(),
            facility_type: None,
            cnn: None,
            location_description: None,
            address: None,
            block_lot: None,
            block: None,
            lot: None,
            permit: None,
            status: status.into(),
            food_items: None,
            x: None,
            y: None,
            latitude: None,
            longitude: None,
            schedule: None,
            approved: None,
            received: None,
            prior_permit: None,
            expiration_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// The permit location, if both coordinates are present and valid.
    pub fn location(&self) -> Option<Point> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Point::new(lat, lon).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_requires_both_coordinates() {
        let truck = FoodTruck::new("1", "Tacos", "APPROVED");
        assert!(truck.location().is_none());

        let mut half = truck.clone();
        half.latitude = Some(37.7);
        assert!(half.location().is_none());

        let full = truck.with_location(37.7, -122.4);
        let p = full.location().unwrap();
        assert_eq!(p.latitude(), 37.7);
        assert_eq!(p.longitude(), -122.4);
    }

    #[test]
    fn test_location_rejects_invalid_coordinates() {
        let truck = FoodTruck::new("1", "Tacos", "APPROVED").with_location(120.0, 0.0);
        assert!(truck.location().is_none());
    }

    #[test]
    fn test_serializes_camel_case() {
        let truck = FoodTruck::new("obj-1", "Tacos", "APPROVED");
        let json = serde_json::to_value(&truck).unwrap();
        assert_eq!(json["objectId"], "obj-1");
        assert!(json.get("locationDescription").is_some());
        assert!(json.get("distance").is_none());
    }
}
