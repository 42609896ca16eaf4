use thiserror::Error;

use crate::types::SubscriptionStatus;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Malformed schedule or subscription input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No subscription with the given ID exists in the store.
    #[error("Subscription not found: {id}")]
    NotFound { id: String },

    /// The operation is not allowed from the subscription's current state.
    #[error("Cannot {action} subscription {id} in status {status}")]
    InvalidTransition {
        id: String,
        status: SubscriptionStatus,
        action: &'static str,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A thread panicked while holding the store connection.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl SchedulerError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Database(_) => "DATABASE_ERROR",
            SchedulerError::Validation(_) => "VALIDATION_ERROR",
            SchedulerError::NotFound { .. } => "NOT_FOUND",
            SchedulerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SchedulerError::Serialization(_) => "SERIALIZATION_ERROR",
            SchedulerError::LockPoisoned => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failure reported by a sibling service (orders, notifications, auth).
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Connection refused, DNS failure or timeout.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The service answered with a non-success status.
    #[error("{service} rejected request ({status}): {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The response could not be understood.
    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },
}
