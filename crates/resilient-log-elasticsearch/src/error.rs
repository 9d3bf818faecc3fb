//! Error types for the Elasticsearch sink.
//!
//! None of these escape [`LogTarget::submit`](resilient_log_core::LogTarget):
//! they are logged and reported as a rejected delivery.

use thiserror::Error;

/// A single `_create` request that did not confirm delivery.
#[derive(Error, Debug)]
pub enum EsError {
    /// Transport failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Status other than success or conflict
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Success status but the document was not created
    #[error("unexpected index result '{0}'")]
    UnexpectedResult(String),

    /// Document URL could not be built
    #[error("invalid document URL: {0}")]
    Url(String),
}

/// Result type alias using EsError.
pub type EsResult<T> = Result<T, EsError>;
