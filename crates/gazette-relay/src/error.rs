//! Relay error types.

use thiserror::Error;

use crate::broker::SubscriberId;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The change source could not be reached, or the subscription was lost.
    #[error("change source unavailable: {0}")]
    SourceUnavailable(String),

    /// A raw notification payload could not be decoded.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A subscriber queue rejected an event.
    #[error("subscriber {0} is not keeping up")]
    SlowSubscriber(SubscriberId),

    /// Writing to a stream connection failed.
    #[error("session transport error: {0}")]
    SessionTransport(String),

    /// The listener was started twice.
    #[error("listener is already running")]
    AlreadyRunning,
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MalformedEvent(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        RelayError::SourceUnavailable(err.to_string())
    }
}
