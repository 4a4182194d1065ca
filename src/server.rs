//! HTTP API server.
//!
//! Serves name, address and nearby search over JSON. Routes live under the
//! `/api` prefix except the health check.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/food-trucks/search` | Paginated name search (`name`, `status`, `limit`, `offset`) |
//! | `GET`  | `/api/food-trucks/search-by-address` | Paginated address search (`address`, ...) |
//! | `GET`  | `/api/food-trucks/nearby` | Nearest trucks (`lat`, `long`, `radius`, `status`, `limit`) |
//! | `GET`  | `/api/food-trucks/{id}` | One truck by id |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Name parameter is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `provider_error` (502), `upstream_unavailable` (503).
//!
//! Unknown query parameters are rejected with `bad_request`.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use truckstop_core::distance::DistanceProvider;
use truckstop_core::models::FoodTruck;
use truckstop_core::nearby::{NearbyQuery, NearbySearch};
use truckstop_core::store::{SearchField, Store};
use truckstop_core::text_search::{self, Pagination, SearchPage};
use truckstop_core::{Kilometers, NearbyError};

use crate::config::Config;
use crate::db;
use crate::distance::create_provider;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    nearby: NearbySearch,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, distance: Arc<dyn DistanceProvider>, config: Config) -> Self {
        let nearby = NearbySearch::new(store.clone(), distance, config.nearby.settings());
        Self {
            store,
            nearby,
            config: Arc::new(config),
        }
    }
}

/// Open the database, build the configured provider, and serve until
/// Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let provider = create_provider(&config.distance)?;
    info!(provider = provider.name(), "distance provider ready");

    let bind_addr = config.server.bind.clone();
    let app = build_router(AppState::new(store, provider, config.clone()))?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("truckstop listening on http://{}/api", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

/// All routes plus the CORS layer.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(state.config.server.cors_origin.as_deref())?;

    Ok(Router::new()
        .route("/api/food-trucks/search", get(handle_search_by_name))
        .route(
            "/api/food-trucks/search-by-address",
            get(handle_search_by_address),
        )
        .route("/api/food-trucks/nearby", get(handle_nearby))
        .route("/api/food-trucks/{id}", get(handle_get_truck))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state))
}

fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    Ok(match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(HeaderValue::from_str(origin)?)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl From<NearbyError> for AppError {
    fn from(err: NearbyError) -> Self {
        match err {
            NearbyError::InvalidArgument(msg) => Self::bad_request(msg),
            NearbyError::Cancelled => Self::new(
                StatusCode::REQUEST_TIMEOUT,
                "timeout",
                "request timed out before all distance lookups completed",
            ),
            NearbyError::UpstreamUnavailable(msg) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_unavailable",
                msg,
            ),
            NearbyError::Provider(e) => {
                Self::new(StatusCode::BAD_GATEWAY, "provider_error", e.message)
            }
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Parse an optional numeric query value.
fn parse_param<T: FromStr>(value: Option<&str>, name: &str) -> Result<Option<T>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::bad_request(format!("{} must be a number", name))),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /api/food-trucks/search{,-by-address} ============

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NameSearchParams {
    name: Option<String>,
    status: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AddressSearchParams {
    address: Option<String>,
    status: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

async fn handle_search_by_name(
    State(state): State<AppState>,
    params: Result<Query<NameSearchParams>, QueryRejection>,
) -> Result<Json<SearchPage<FoodTruck>>, AppError> {
    let Query(p) = params?;
    run_text_search(
        &state,
        SearchField::Name,
        p.name.as_deref(),
        p.status.as_deref(),
        p.limit.as_deref(),
        p.offset.as_deref(),
    )
    .await
}

async fn handle_search_by_address(
    State(state): State<AppState>,
    params: Result<Query<AddressSearchParams>, QueryRejection>,
) -> Result<Json<SearchPage<FoodTruck>>, AppError> {
    let Query(p) = params?;
    run_text_search(
        &state,
        SearchField::Address,
        p.address.as_deref(),
        p.status.as_deref(),
        p.limit.as_deref(),
        p.offset.as_deref(),
    )
    .await
}

async fn run_text_search(
    state: &AppState,
    field: SearchField,
    term: Option<&str>,
    status: Option<&str>,
    limit: Option<&str>,
    offset: Option<&str>,
) -> Result<Json<SearchPage<FoodTruck>>, AppError> {
    let search = &state.config.search;
    let pagination = Pagination::resolve(
        parse_param(limit, "limit")?,
        parse_param(offset, "offset")?,
        search.default_limit,
        search.max_limit,
    )?;

    let page = text_search::search_by_field(
        state.store.as_ref(),
        field,
        term.unwrap_or(""),
        status,
        pagination,
    )
    .await?;
    Ok(Json(page))
}

// ============ GET /api/food-trucks/nearby ============

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NearbyParams {
    lat: Option<String>,
    long: Option<String>,
    radius: Option<String>,
    status: Option<String>,
    limit: Option<String>,
}

async fn handle_nearby(
    State(state): State<AppState>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> Result<Json<Vec<FoodTruck>>, AppError> {
    let Query(p) = params?;

    let coordinates = (
        parse_param::<f64>(p.lat.as_deref(), "lat").ok().flatten(),
        parse_param::<f64>(p.long.as_deref(), "long").ok().flatten(),
    );
    let (latitude, longitude) = match coordinates {
        (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => (lat, lon),
        _ => {
            return Err(AppError::bad_request(
                "Valid latitude and longitude are required",
            ))
        }
    };

    let mut query = NearbyQuery::new(latitude, longitude);
    if let Some(radius) = parse_param::<f64>(p.radius.as_deref(), "radius")? {
        query = query.radius(Kilometers(radius));
    }
    if let Some(limit) = parse_param::<usize>(p.limit.as_deref(), "limit")? {
        query = query.limit(limit);
    }
    if let Some(status) = p.status {
        query = query.status(status);
    }

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let trucks = state
        .nearby
        .find_nearby_until(query, tokio::time::sleep(timeout))
        .await?;
    Ok(Json(trucks))
}

// ============ GET /api/food-trucks/{id} ============

async fn handle_get_truck(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FoodTruck>, AppError> {
    let truck = state
        .store
        .get_truck(&id)
        .await
        .map_err(NearbyError::upstream)?;

    truck.map(Json).ok_or_else(|| {
        AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no food truck with id: {}", id),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use truckstop_core::error::ProviderError;

    #[test]
    fn test_error_mapping() {
        let cases = [
            (NearbyError::invalid("bad"), StatusCode::BAD_REQUEST, "bad_request"),
            (NearbyError::Cancelled, StatusCode::REQUEST_TIMEOUT, "timeout"),
            (
                NearbyError::UpstreamUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_unavailable",
            ),
            (
                NearbyError::Provider(ProviderError::new("boom")),
                StatusCode::BAD_GATEWAY,
                "provider_error",
            ),
        ];
        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status, status);
            assert_eq!(app.code, code);
        }
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param::<i64>(Some("25"), "limit").ok().flatten(), Some(25));
        assert_eq!(parse_param::<i64>(Some(" "), "limit").ok().flatten(), None);
        assert_eq!(parse_param::<i64>(None, "limit").ok().flatten(), None);
        let err = parse_param::<i64>(Some("ten"), "limit").err().unwrap();
        assert_eq!(err.message, "limit must be a number");
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer(Some("http://localhost:4200")).is_ok());
        assert!(cors_layer(Some("bad\norigin")).is_err());
        assert!(cors_layer(None).is_ok());
    }
}
