//! Error types for Conductor
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Hard errors surfaced to callers of the library.
///
/// Task and job failures are not in here: those travel as
/// [`FailureReason`](crate::domain::FailureReason) inside the batch outcome
/// so the supervisor can keep making progress.
#[derive(Debug, Error)]
pub enum ConductorError {
    /// Malformed job input, raised before any work starts
    #[error("Validation error: {0}")]
    Validation(String),

    /// Event bus used before `start()` or after `stop()`
    #[error("Event bus is not running")]
    NotRunning,

    /// A subscriber failed while processing an event
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    /// An external capability (producer, summarizer, reviewer, planner) failed
    #[error("Capability error: {0}")]
    Capability(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by an event handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{handler}: {message}")]
pub struct HandlerError {
    /// Name of the failing handler
    pub handler: String,
    /// What went wrong
    pub message: String,
}

impl HandlerError {
    pub fn new(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for Conductor operations
pub type Result<T> = std::result::Result<T, ConductorError>;
