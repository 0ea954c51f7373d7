//! Auth0 client errors
//!
//! Every failure is classified here so callers never inspect HTTP status codes or
//! reqwest internals.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when interacting with the Auth0 Management API
#[derive(Debug, Error)]
pub enum Auth0Error {
    /// HTTP transport error (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The Management API rejected the request
    #[error("Auth0 API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the response body
        message: String,
    },

    /// Rate limit exceeded; `reset` is when the bucket refills
    #[error("Auth0 rate limit exceeded (reset at {reset:?})")]
    RateLimited {
        /// Reset time from the `x-ratelimit-reset` header
        reset: Option<DateTime<Utc>>,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Token acquisition failed or credentials were rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrent modification or uniqueness conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request cannot be expressed (unsupported operation, missing field)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Protocol-agnostic error class seen by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The remote object does not exist
    NotFound,
    /// The remote rejected the write because of concurrent state
    Conflict,
    /// Worth retrying with backoff
    Transient,
    /// Retrying without a declaration change will not help
    Permanent,
}

impl Auth0Error {
    /// Classify the error for retry decisions
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::RateLimited { .. } => ErrorClass::Transient,
            Self::Http(e) => {
                if e.is_decode() || e.is_builder() {
                    ErrorClass::Permanent
                } else {
                    ErrorClass::Transient
                }
            }
            Self::Api { status, .. } => match *status {
                404 => ErrorClass::NotFound,
                409 => ErrorClass::Conflict,
                408 | 429 => ErrorClass::Transient,
                s if s >= 500 => ErrorClass::Transient,
                _ => ErrorClass::Permanent,
            },
            Self::Serialization(_) | Self::Authentication(_) | Self::InvalidRequest(_) => {
                ErrorClass::Permanent
            }
        }
    }

    /// Rate limit reset time, when the error carries one
    #[must_use]
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimited { reset } => *reset,
            _ => None,
        }
    }
}
