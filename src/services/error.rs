//! Error type shared by all services
//!
//! Repositories return `anyhow::Result`; services translate domain failures
//! into [`ServiceError`] variants and let everything else fall through as
//! `Internal`. The API layer maps each variant to an HTTP status.

/// Error types for service operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate or state conflict (taken username, full event, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad credentials, banned account or missing session
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Too many requests: {0}")]
    RateLimited(String),

    /// Payload exceeds a configured size limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Well-formed upload with content we refuse (type, missing parts)
    #[error("Unprocessable upload: {0}")]
    InvalidUpload(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.into())
    }
}

/// Fail with `NotFound(what)` when `value` is `None`
pub fn found<T>(value: Option<T>, what: &str) -> ServiceResult<T> {
    value.ok_or_else(|| ServiceError::not_found(what))
}

/// Check a required text field: trimmed, non-empty and at most `max` chars
pub fn require_text(field: &str, value: &str, max: usize) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::validation(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max {
        return Err(ServiceError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}
