//! Client-level error handling.
//!
//! Transport failures are classified in [`crate::api::ApiError`]; this module
//! adds the failures the engine itself can produce. Callers can match on the
//! error kind instead of string-matching messages.

use thiserror::Error;

use crate::api::ApiError;

/// Errors surfaced by the ordering client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A mutation was rejected locally before any network call.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// No identity could be established, so the pending mutation was
    /// abandoned without contacting the order service.
    #[error("session bootstrap failed: {source}")]
    BootstrapFailed {
        /// The error from the final bootstrap attempt.
        #[source]
        source: ApiError,
    },

    /// A remote call failed after the retry executor gave up, or failed with
    /// a non-retryable error.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ClientError {
    /// Whether this error invalidated the active session.
    #[must_use]
    pub const fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::Api(ApiError::AuthExpired))
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
