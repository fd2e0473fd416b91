use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::ConfigError;
use crate::engagements::shortlist::service::ShortlistError;
use crate::telemetry::TelemetryError;

/// Process-level failures surfaced during startup and serving.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Engagement(ShortlistError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Engagement(err) => write!(f, "engagement error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Engagement(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ShortlistError> for AppError {
    fn from(value: ShortlistError) -> Self {
        Self::Engagement(value)
    }
}

/// HTTP rendering of the service error taxonomy. Provider detail is kept
/// out of responses; companies see only the public category.
impl IntoResponse for ShortlistError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ShortlistError::Validation(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, message.clone())
            }
            ShortlistError::Guard { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            ShortlistError::Conflict => (StatusCode::CONFLICT, self.to_string()),
            ShortlistError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ShortlistError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ShortlistError::ExpiredAuthorization => {
                (StatusCode::PAYMENT_REQUIRED, self.to_string())
            }
            ShortlistError::Settlement(err) => {
                let status = if err.is_transient() {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::PAYMENT_REQUIRED
                };
                (status, err.public_category().to_string())
            }
            ShortlistError::Repository(_)
            | ShortlistError::EventLog(_)
            | ShortlistError::Dispatch(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
