/*!
 * Error types for the checkup pipeline
 */

use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckupError>;

#[derive(Error, Debug)]
pub enum CheckupError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog query or connection failure
    #[error("Catalog error: {0}")]
    Catalog(#[from] sqlx::Error),

    /// Pin backend request failed or returned an unusable body
    #[error("Pin backend error: {0}")]
    PinBackend(String),

    /// Verification service request failed
    #[error("Verification error: {0}")]
    Verification(String),

    /// An external call exceeded its deadline
    #[error("Timed out after {duration:?}: {operation}")]
    Timeout { operation: String, duration: Duration },

    /// A string that should be a content identifier is not one
    #[error("Invalid CID '{cid}': {reason}")]
    InvalidCid { cid: String, reason: String },

    /// Secondary provider object storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Metrics registry or scrape server failure
    #[error("Server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CheckupError {
    /// Whether this error ends the current pipeline run
    ///
    /// Recoverable errors are handled inside the stage that produced them.
    pub fn is_fatal(&self) -> bool {
        match self {
            CheckupError::Config(_)
            | CheckupError::Catalog(_)
            | CheckupError::PinBackend(_)
            | CheckupError::InvalidCid { .. }
            | CheckupError::Server(_)
            | CheckupError::Io(_) => true,

            CheckupError::Verification(_)
            | CheckupError::Timeout { .. }
            | CheckupError::Storage(_) => false,
        }
    }

    pub(crate) fn invalid_cid(cid: &str, reason: impl ToString) -> Self {
        CheckupError::InvalidCid {
            cid: cid.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<orbit_observability::MetricsError> for CheckupError {
    fn from(err: orbit_observability::MetricsError) -> Self {
        CheckupError::Server(err.to_string())
    }
}
