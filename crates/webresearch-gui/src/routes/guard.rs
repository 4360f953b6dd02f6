use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
};

use crate::error::AppError;
use crate::state::AppState;

/// Extractor for `/api/*` handlers. Enforces the bearer token when one is
/// configured.
pub struct GuardedState(pub AppState);

#[async_trait]
impl FromRequestParts<AppState> for GuardedState {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_state = state.clone();

        if let Some(expected) = app_state.auth_token() {
            let provided = parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim);

            match provided {
                Some(token) if token == expected.as_str() => {}
                _ => {
                    return Err(AppError::new(
                        StatusCode::UNAUTHORIZED,
                        "invalid auth token",
                    ));
                }
            }
        }

        Ok(GuardedState(app_state))
    }
}
