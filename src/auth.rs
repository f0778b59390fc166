use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::warn;

use crate::api::AppState;
use crate::db::ApiKey;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// An active API key presented in the `x-api-key` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedKey(pub ApiKey);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized("Missing API key"))?;

        match state.api_keys.find_active(presented).await? {
            Some(key) => Ok(AuthenticatedKey(key)),
            None => {
                warn!("Rejected request with invalid or inactive API key");
                Err(ApiError::Unauthorized("Invalid or inactive API key"))
            }
        }
    }
}
