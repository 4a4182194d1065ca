//! # truckstop
//!
//! Food truck lookup for San Francisco's Mobile Food Facility Permit
//! dataset: import the open-data export into SQLite, then search it by
//! name, by address, or by driving distance from a point.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────┐   ┌──────────────────┐
//! │ SF open data│──▶│  import  │──▶│      SQLite      │
//! └─────────────┘   └──────────┘   └────────┬─────────┘
//!                                           │ Store
//!                   ┌───────────────────────┤
//!                   ▼                       ▼
//!              ┌──────────┐  NearbySearch ┌──────────┐
//!              │   CLI    │◀─────────────▶│   HTTP   │
//!              └──────────┘  text search  └──────────┘
//!                                 │
//!                                 ▼
//!                        Google Routes / haversine
//! ```
//!
//! Ranking, pagination, and the store/provider traits live in
//! `truckstop-core`; this crate supplies the SQLite store, the HTTP
//! distance provider, the importer, the server, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! truckstop init
//! truckstop import
//! truckstop nearby --lat 37.7749 --long -122.4194
//! truckstop serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `Store` implementation |
//! | [`distance`] | Distance providers |
//! | [`import`] | Open-data importer |
//! | [`stats`] | Dataset analysis |
//! | [`search`] | CLI search commands |
//! | [`server`] | HTTP API server |

pub mod config;
pub mod db;
pub mod distance;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;
