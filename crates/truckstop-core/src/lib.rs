//! # truckstop core
//!
//! Runtime-agnostic logic for truckstop: geo types, the food truck model,
//! store and distance-provider abstractions, nearby ranking, and text-search
//! pagination.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Concrete backends (SQLite, Google Routes) live in the `truckstop` crate
//! and are handed to the algorithms here as trait objects.

pub mod distance;
pub mod error;
pub mod geo;
pub mod models;
pub mod nearby;
pub mod store;
pub mod text_search;

pub use error::{NearbyError, ProviderError};
pub use geo::{Kilometers, Point};
pub use models::FoodTruck;
