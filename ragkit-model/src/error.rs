//! Error types for the `ragkit-model` crate.

use thiserror::Error;

/// Errors raised by language model backends.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// The provider rejected or failed the request.
    #[error("Model request error ({provider}): {message}")]
    Request {
        /// The backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The provider throttled the request. Retrying is left to the caller.
    #[error("Model rate limited ({provider}): {message}")]
    RateLimited {
        /// The backend that produced the error.
        provider: String,
        /// The provider's message, verbatim.
        message: String,
    },

    /// The response stream failed after it started.
    #[error("Model stream error: {0}")]
    Stream(String),

    /// Invalid client or generation configuration.
    #[error("Model configuration error: {0}")]
    Config(String),

    /// The provider returned no text at all.
    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// A convenience result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
