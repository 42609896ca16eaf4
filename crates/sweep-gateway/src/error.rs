use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sweep_core::SweepError;
use sweep_scheduler::{CollaboratorError, SchedulerError};
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by HTTP handlers, rendered as `{"error": …, "code": …}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] SweepError),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Upstream(#[from] CollaboratorError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => match e {
                SweepError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
                SweepError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                SweepError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Scheduler(e) => match e {
                SchedulerError::Validation(_) => StatusCode::BAD_REQUEST,
                SchedulerError::NotFound { .. } => StatusCode::NOT_FOUND,
                SchedulerError::InvalidTransition { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Core(e) => e.code(),
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Scheduler(e) => e.code(),
            ApiError::Upstream(_) => "UPSTREAM_UNAVAILABLE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log.
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            match self {
                ApiError::Upstream(_) => "upstream service unavailable".to_string(),
                _ => "internal error".to_string(),
            }
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
            self.to_string()
        };
        (status, Json(json!({"error": message, "code": self.code()}))).into_response()
    }
}

impl ApiError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        ApiError::Core(SweepError::AuthFailed(reason.into()))
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        ApiError::Core(SweepError::PermissionDenied {
            reason: reason.into(),
        })
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        let not_found = ApiError::from(SchedulerError::NotFound { id: "s1".into() });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.code(), "NOT_FOUND");
        assert_eq!(ApiError::BadRequest("x".into()).code(), "BAD_REQUEST");
        let invalid = ApiError::from(SchedulerError::Validation("bad".into()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(SchedulerError::LockPoisoned).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
