//! Backend of a small weather dashboard.
//!
//! Proxies current weather for a fixed list of cities to an authenticated single page frontend.
//!
//!
//!
//! # General Infrastructure
//! - Frontend logs in with the identity provider and sends its access token as `Authorization: Bearer <token>`
//! - This server verifies the token, then answers from cache, catalog mock data or OpenWeatherMap
//! - One process, all state in memory, nothing persisted
//!
//!
//!
//! # Endpoints
//!
//! | Route | Auth | Response |
//! |---|---|---|
//! | `GET /` | none | service status |
//! | `GET /api/weather/all` | gate | every catalog city, catalog order |
//! | `GET /api/weather/{id}` | gate | one city |
//! | `GET /api/weather/debug-auth` | gate | raw header and resolved user, development bypass only |
//!
//! Errors are JSON: `{ "error": ..., "description"?: ..., "details"?: ... }`.
//!
//!
//!
//! # Mock Versus Live
//!
//! Without `OPENWEATHER_API_KEY`, or with `USE_MOCK_WEATHER=true`, readings come from the
//! bundled catalog. Celsius is the rounded catalog temperature, Kelvin is derived from it
//! with two decimals.
//!
//! With a key every cache miss is one upstream call. Readings are cached for 5 minutes by default.
//!
//!
//!
//! # Setup
//!
//! Run against mock data with auth disabled.
//! ```sh
//! cd backend
//! RUST_LOG=info cargo run
//! ```
//!
//! Local development with the bypass user.
//! ```sh
//! DEV_AUTH_BYPASS=true cargo run
//! curl -H "Authorization: Bearer dev-token" localhost:4000/api/weather/debug-auth
//! ```
//!
//! Production.
//! ```sh
//! APP_ENV=production AUTH0_DOMAIN=tenant.eu.auth0.com AUTH0_AUDIENCE=https://weather-api \
//!     OPENWEATHER_API_KEY=... cargo run --release
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod jwks;
pub mod openweather;
pub mod routes;
pub mod state;
pub mod utils;
pub mod weather;

use auth::{require_auth, require_scope};
use config::Config;
use routes::{
    all_handler, city_handler, debug_auth_handler, missing_id_handler, require_city_id,
    status_handler,
};
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    info!("Initializing state...");
    let state = Config::load()
        .map_err(anyhow::Error::from)
        .and_then(AppState::new)
        .inspect_err(|e| error!("Refusing to start: {e:#}"))?;

    info!("Starting server...");
    let app = app(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");

    Ok(())
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let weather = gated(
        Router::new()
            .route("/api/weather/all", get(all_handler))
            .route("/api/weather/debug-auth", get(debug_auth_handler)),
        &state,
    );

    // A blank id is rejected before the auth gate, same as the bare prefix.
    let city = gated(
        Router::new().route("/api/weather/{id}", get(city_handler)),
        &state,
    )
    .route_layer(from_fn(require_city_id));

    Router::new()
        .route("/", get(status_handler))
        .route("/api/weather/", get(missing_id_handler))
        .merge(weather)
        .merge(city)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Installs the scope check when enabled, then the auth gate around it.
fn gated(router: Router<Arc<AppState>>, state: &Arc<AppState>) -> Router<Arc<AppState>> {
    // Route layers run outermost last, so auth wraps the scope check.
    let router = if state.auth.scope_gate_enabled() {
        router.route_layer(from_fn_with_state(state.clone(), require_scope))
    } else {
        router
    };

    router.route_layer(from_fn_with_state(state.clone(), require_auth))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
