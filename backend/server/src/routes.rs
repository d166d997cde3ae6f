use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;

use crate::{
    auth::{AuthMode, AuthenticatedUser, Caller},
    error::AppError,
    state::AppState,
    weather::{BatchRow, WeatherReading},
};

#[derive(Serialize)]
pub struct DebugAuth {
    pub authorization: Option<String>,
    pub user: Option<AuthenticatedUser>,
}

pub async fn status_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Weather API running. Use /api/weather/all to fetch mock/live weather.",
        "endpoints": {
            "all": "/api/weather/all",
            "single": "/api/weather/:id",
            "debug": "/api/weather/debug-auth"
        }
    }))
}

pub async fn all_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BatchRow>>, AppError> {
    let results = state.weather.fetch_all().await;

    // Only a batch where every city failed is an error for the whole request.
    if !results.is_empty() && results.iter().all(|(_, result)| result.is_err()) {
        if let Some((id, Err(e))) = results.into_iter().next() {
            error!("Every city failed, first failure for {id}: {e}");
            return Err(e.into());
        }

        return Err(AppError::Fetch("every city failed".to_string()));
    }

    Ok(Json(state.weather.rows(results)))
}

pub async fn city_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WeatherReading>, AppError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::CityIdRequired);
    }

    let reading = state.weather.fetch(id).await.map_err(|e| {
        error!("Failed to fetch weather for city {id}: {e}");
        AppError::from(e)
    })?;

    Ok(Json(reading))
}

/// Runs ahead of the auth gate on `/api/weather/{id}`.
pub async fn require_city_id(
    Path(id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if id.trim().is_empty() {
        return Err(AppError::CityIdRequired);
    }

    Ok(next.run(request).await)
}

pub async fn missing_id_handler() -> AppError {
    AppError::CityIdRequired
}

pub async fn debug_auth_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
) -> Result<Json<DebugAuth>, AppError> {
    if state.config.is_production() || !matches!(state.auth.mode(), AuthMode::DevBypass) {
        return Err(AppError::NotFound);
    }

    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    Ok(Json(DebugAuth {
        authorization,
        user: caller.0,
    }))
}
