use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AppState, error::ApiError};

/// The authenticated user, taken from the identity header set by the
/// upstream auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub i64);

impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = &state.config.server.identity_header;
        let value = parts
            .headers
            .get(header.as_str())
            .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))?;

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(Identity)
            .ok_or_else(|| ApiError::Unauthorized(format!("invalid {} header", header)))
    }
}
