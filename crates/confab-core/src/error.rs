//! Error taxonomy for the Confab engine.

use confab_protocol::ErrorCode;
use thiserror::Error;

/// Engine errors.
///
/// Every variant maps to a stable wire code; the transport reports failures
/// to the originating connection as structured `error` events and nothing
/// here ever terminates the process.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or self-referential input.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown user or room reference.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Membership check failure.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Storage write failure; aborts the triggering operation only.
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl CoreError {
    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation(_) => ErrorCode::Validation,
            CoreError::NotFound(_) => ErrorCode::NotFound,
            CoreError::Forbidden(_) => ErrorCode::Forbidden,
            CoreError::Persistence(_) => ErrorCode::Persistence,
        }
    }
}
