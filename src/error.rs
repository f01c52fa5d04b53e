/// Unified error types for the coregate engine
use thiserror::Error;

/// Main error type for credential and session operations
#[derive(Error, Debug)]
pub enum GateError {
    /// Durable store errors
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Validation errors (malformed email, empty required field)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown id or email
    #[error("Not found: {0}")]
    NotFound(String),

    /// Logout against an unrecorded or already-closed session event
    #[error("No such open session event: {0}")]
    NoSuchEvent(i64),

    /// The external login flow ran out its overall deadline
    #[error("External login timed out")]
    Timeout,

    /// The external login flow was cancelled by the caller
    #[error("External login cancelled")]
    Cancelled,

    /// The profile page never yielded one or more required fields
    #[error("Profile scrape incomplete; missing fields: {}", missing.join(", "))]
    ScrapeIncomplete { missing: Vec<String> },

    /// Page driver failures (navigation or probe delivery)
    #[error("Page driver error: {0}")]
    Driver(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for engine operations
pub type GateResult<T> = Result<T, GateError>;
