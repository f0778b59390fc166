//! Error types for the billing core, the upstream client and the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, warn};

/// Failures raised by the period calculator and the bet aggregator.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid billing anchor: {0}")]
    InvalidAnchor(String),

    #[error("invalid interval: start {start} must be before end {end}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("no calendar date exists in {year}-{month:02}")]
    DateOutOfRange { year: i32, month: u32 },

    #[error("upstream fetch failed for window {start} .. {end}")]
    UpstreamFetch {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        #[source]
        source: UpstreamError,
    },
}

/// Failures talking to the sportsbook API.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("sportsbook credentials are not configured")]
    MissingCredentials,

    #[error("request to sportsbook failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sportsbook API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode sportsbook response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors surfaced by request handlers, mapped onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Core(CoreError::InvalidAnchor(_))
            | ApiError::Core(CoreError::InvalidInterval { .. })
            | ApiError::Core(CoreError::DateOutOfRange { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Core(CoreError::UpstreamFetch { .. }) | ApiError::Upstream(_) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Core(CoreError::UpstreamFetch { source, .. }) => {
                format!("{}: {}", self, source)
            }
            _ => self.to_string(),
        };

        if status.is_server_error() {
            error!("Request failed ({}): {}", status, detail);
        } else {
            warn!("Request rejected ({}): {}", status, detail);
        }

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
