//! Typed clients for the Tableside remote services.
//!
//! # Architecture
//!
//! - One shared [`HttpClient`] owns the base URL, bearer-token slot, and the
//!   HTTP-status to [`ApiError`] mapping
//! - Each service is a trait ([`OrderApi`], [`CatalogApi`], [`AuthApi`],
//!   [`RatingsApi`]) with a reqwest-backed production implementation, so the
//!   synchronization engine can be exercised against in-process doubles
//! - The order service is the source of truth - responses carry the full
//!   authoritative cart (line list plus per-line pricing)

mod auth;
mod http;
mod menu;
mod orders;
mod ratings;

pub use auth::{AuthApi, HttpAuthApi};
pub use http::HttpClient;
pub use menu::{CatalogApi, HttpCatalogApi};
pub use orders::{AddLineRequest, CartSnapshot, HttpOrderApi, OrderApi, UpdateLineRequest};
pub use ratings::{
    FeedbackEntry, FeedbackRequest, FeedbackStats, HttpRatingsApi, ItemRating, RatingsApi,
};

use thiserror::Error;

/// Errors that can occur when calling a Tableside remote service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a usable response (connect failure,
    /// timeout, protocol error).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with a 5xx status.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Body detail, if the service provided one.
        message: String,
    },

    /// The service rejected the request (4xx other than auth / not-found).
    /// Never retried.
    #[error("validation error ({status}): {message}")]
    Validation {
        /// HTTP status code.
        status: u16,
        /// Body detail, if the service provided one.
        message: String,
    },

    /// The referenced resource does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The service rejected our credentials (401/403). The session must be
    /// invalidated and re-bootstrapped; the failed call is not retried.
    #[error("authentication rejected")]
    AuthExpired,

    /// The response body could not be decoded.
    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether the retry executor may re-attempt the call.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Server { .. } => true,
            Self::Validation { .. } | Self::NotFound(_) | Self::AuthExpired | Self::Parse(_) => {
                false
            }
        }
    }
}
