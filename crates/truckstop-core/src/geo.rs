//! Coordinates and distances.
//!
//! [`Point`] is only constructible with in-range coordinates, and every
//! distance or radius that crosses a component boundary is a [`Kilometers`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{NearbyError, Result};

/// Mean Earth radius used by [`haversine`].
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    latitude: f64,
    longitude: f64,
}

impl Point {
    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(NearbyError::invalid(
                "Latitude must be between -90 and 90",
            ));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(NearbyError::invalid(
                "Longitude must be between -180 and 180",
            ));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// A distance in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kilometers(pub f64);

impl Kilometers {
    pub fn from_meters(meters: f64) -> Self {
        Self(meters / 1000.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Finite and not negative. Providers may return garbage; callers use
    /// this to decide whether a distance can be ranked at all.
    pub fn is_valid(self) -> bool {
        self.0.is_finite() && self.0 >= 0.0
    }
}

impl fmt::Display for Kilometers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} km", self.0)
    }
}

/// Great-circle distance between two points.
pub fn haversine(a: Point, b: Point) -> Kilometers {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    Kilometers(EARTH_RADIUS_KM * c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_rejects_out_of_range() {
        assert!(Point::new(90.0, 180.0).is_ok());
        assert!(Point::new(-90.0, -180.0).is_ok());
        assert!(matches!(
            Point::new(90.5, 0.0),
            Err(NearbyError::InvalidArgument(_))
        ));
        assert!(matches!(
            Point::new(0.0, -180.01),
            Err(NearbyError::InvalidArgument(_))
        ));
        assert!(Point::new(f64::NAN, 0.0).is_err());
        assert!(Point::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        let p = Point::new(37.7749, -122.4194).unwrap();
        assert!(haversine(p, p).value().abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // San Francisco City Hall to the Ferry Building, roughly 2.9 km.
        let city_hall = Point::new(37.7793, -122.4193).unwrap();
        let ferry = Point::new(37.7955, -122.3937).unwrap();
        let d = haversine(city_hall, ferry).value();
        assert!((2.7..3.1).contains(&d), "unexpected distance {}", d);
    }

    #[test]
    fn test_kilometers_from_meters() {
        assert_eq!(Kilometers::from_meters(1200.0), Kilometers(1.2));
        assert!(!Kilometers(f64::NAN).is_valid());
        assert!(!Kilometers(-1.0).is_valid());
        assert!(Kilometers(0.0).is_valid());
    }
}
