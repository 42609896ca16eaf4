//! Caller identification for subscription routes.
//!
//! In `remote` mode the `Authorization: Bearer <token>` header is checked
//! against the auth service. In `none` mode the `X-User-Id` and
//! `X-User-Role` headers are trusted as-is.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use sweep_core::{config::AuthMode, Caller, Role};
use sweep_scheduler::CollaboratorError;

use crate::app::AppState;
use crate::error::ApiError;

/// Resolves a bearer token to a caller identity.
#[async_trait]
pub trait AuthValidator: Send + Sync {
    /// `Ok(None)` means the token was understood and rejected.
    async fn validate(&self, token: &str) -> Result<Option<Caller>, CollaboratorError>;
}

/// Extractor yielding the authenticated caller, or a 401 rejection.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller(pub Caller);

impl FromRequestParts<Arc<AppState>> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let caller = match state.config.auth.mode {
            AuthMode::None => caller_from_headers(&parts.headers)?,
            AuthMode::Remote => {
                let token = extract_bearer(&parts.headers).ok_or_else(|| {
                    ApiError::unauthorized("set 'Authorization: Bearer <token>' header")
                })?;
                state
                    .auth
                    .validate(token)
                    .await?
                    .ok_or_else(|| ApiError::unauthorized("invalid or expired token"))?
            }
        };
        Ok(AuthenticatedCaller(caller))
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing X-User-Id header"))?;
    let role = match headers.get("x-user-role").and_then(|v| v.to_str().ok()) {
        Some(raw) => raw.parse::<Role>().map_err(ApiError::unauthorized)?,
        None => Role::Client,
    };
    Ok(Caller::new(user_id, role))
}

/// Validator used in `none` mode; every token is refused.
pub struct DenyAll;

#[async_trait]
impl AuthValidator for DenyAll {
    async fn validate(&self, _token: &str) -> Result<Option<Caller>, CollaboratorError> {
        Ok(None)
    }
}
