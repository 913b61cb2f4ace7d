use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};
use sha2::{Digest, Sha256};

use crate::api::errors::ApiError;
use crate::core::state::AppState;

/// Admin endpoints are open when `ADMIN_API_TOKEN` is empty; otherwise the request
/// must carry it as a bearer token.
pub(crate) struct AdminAccess;

fn tokens_match(expected: &str, provided: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(provided.as_bytes())
}

#[async_trait]
impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let expected = app_state.settings().security().admin_api_token.as_str();
        if expected.is_empty() {
            return Ok(AdminAccess);
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        if tokens_match(expected, token.trim()) {
            Ok(AdminAccess)
        } else {
            Err(ApiError::Unauthorized("Invalid authentication credentials"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::tokens_match;

    #[test]
    fn token_comparison() {
        assert!(tokens_match("secret", "secret"));
        assert!(!tokens_match("secret", "secret "));
        assert!(!tokens_match("secret", ""));
    }
}
