use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{auth::AuthError, weather::WeatherError};

pub const FETCH_FAILED: &str = "Failed to fetch weather";

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("City id required")]
    CityIdRequired,

    #[error("Upstream responded with status {status}")]
    Upstream { status: u16, body: String },

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Not found")]
    NotFound,
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            description: None,
            details: None,
        }
    }

    fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::Upstream { status, body } => AppError::Upstream { status, body },
            WeatherError::Fetch(details) => AppError::Fetch(details),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Auth(e) => (
                e.status(),
                ErrorBody::new(e.code()).with_description(e.to_string()),
            ),
            AppError::CityIdRequired => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("city_id_required").with_description("City id required".to_string()),
            ),
            AppError::Upstream { status, body } => return upstream_response(status, body),
            AppError::Fetch(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(FETCH_FAILED).with_details(Value::String(details)),
            ),
            AppError::NotFound => (StatusCode::NOT_FOUND, ErrorBody::new("not_found")),
        };

        (status, Json(body)).into_response()
    }
}

/// Forwards the upstream status and body, wrapping non-JSON bodies.
fn upstream_response(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);

    match serde_json::from_str::<Value>(&body) {
        Ok(json) => (status, Json(json)).into_response(),
        Err(_) => (
            status,
            Json(ErrorBody::new("upstream_error").with_details(Value::String(body))),
        )
            .into_response(),
    }
}
