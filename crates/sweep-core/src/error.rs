use thiserror::Error;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },
}

impl SweepError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            SweepError::Config(_) => "CONFIG_ERROR",
            SweepError::AuthFailed(_) => "AUTH_FAILED",
            SweepError::PermissionDenied { .. } => "PERMISSION_DENIED",
        }
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;
