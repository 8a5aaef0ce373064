//! Caller identification
//!
//! The server sits behind an authenticating proxy that forwards the username
//! in a trusted header. The user record (superuser flag and groups) is loaded
//! from the store on every request.

use crate::{
    AppState,
    error::{ApiError, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use relman::{ErrorKind, User};
use tracing::debug;

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header = state.config.auth_header.as_str();
        let username = parts
            .headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::unauthorized(&format!("missing {} header", header)))?;

        match state.registry.store().get_user(username).await {
            Ok(user) => {
                debug!("Authenticated request as {}", user.username);
                Ok(CurrentUser(user))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ApiError::unauthorized(&format!("unknown user {}", username)))
            }
            Err(e) => Err(e.into()),
        }
    }
}
