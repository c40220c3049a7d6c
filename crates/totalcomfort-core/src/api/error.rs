use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Authentication rejected: {0}")]
    AuthError(String),

    #[error("Session expired and re-authentication failed")]
    SessionExpired,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Portal unavailable (status {0})")]
    ServiceUnavailable(reqwest::StatusCode),

    #[error("Login rate limited - next attempt allowed at {0}")]
    RateLimited(DateTime<Utc>),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl PortalError {
    /// Truncate a response body to avoid dragging whole HTML pages into logs
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    /// Map a non-success portal status to the error taxonomy.
    ///
    /// 401/403 on a data request means the auth cookie is no longer honored,
    /// which the portal uses to signal session expiry.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => PortalError::SessionExpired,
            500..=599 => PortalError::ServiceUnavailable(status),
            _ => PortalError::UnexpectedResponse(format!(
                "Status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }
}
