//! Error types for event delivery.

use thiserror::Error;

/// Errors that can occur when delivering an event.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Channel is not configured
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rate limited by the receiver
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The receiver answered with an error status
    #[error("Receiver returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Drops the webhook URL from the message.
impl From<reqwest::Error> for ChannelError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url().to_string())
    }
}
