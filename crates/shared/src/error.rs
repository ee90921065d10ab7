//! Error taxonomy for a digest run.
//!
//! Only [`DigestError::SummaryUnavailable`] is recoverable: the pipeline turns it
//! into a placeholder summary. Every other variant ends the run.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, DigestError>;

#[derive(Error, Debug)]
pub enum DigestError {
    /// Missing credentials or an invalid run configuration. Raised before any
    /// external call is made.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The paper source was unreachable or returned something we could not parse.
    #[error("Failed to fetch papers: {0}")]
    Fetch(String),

    /// Summarization gave up on a single paper.
    #[error("Summary unavailable after {attempts} attempt(s): {reason}")]
    SummaryUnavailable { attempts: u32, reason: String },

    /// The transport rejected or failed to send the digest.
    #[error("Failed to deliver digest: {0}")]
    Delivery(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DigestError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, DigestError::Configuration(_))
    }
}
