//! Error types for the fixture harness.

use thiserror::Error;

/// Harness error type.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The mock server never passed its health probe within the retry budget.
    #[error("mock server failed to start after {attempts} attempts: {last_error}")]
    ServerStartupFailed { attempts: u32, last_error: String },

    /// A permission operation was attempted in the wrong state.
    #[error("precondition violated: {0}")]
    PreconditionViolated(String),

    /// Release of a bucket that is not currently registered.
    #[error("bucket not registered: {0}")]
    BucketNotFound(String),

    /// The server refused a request.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Core(#[from] shoal_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for harness operations.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
