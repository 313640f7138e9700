//! Change sources: where raw commit notifications come from.
//!
//! A source yields one UTF-8 payload per committed write, in commit order.
//! The listener owns exactly one source at a time.

mod channel;
#[cfg(feature = "postgres")]
mod postgres;

use std::future::Future;

pub use channel::{ChannelNotifier, ChannelSource};
#[cfg(feature = "postgres")]
pub use postgres::PgChangeSource;

use crate::error::RelayError;

/// A commit-triggered notification channel.
pub trait ChangeSource: Send + 'static {
    /// Establish the subscription.
    ///
    /// Fails with [`RelayError::SourceUnavailable`] if the source cannot be reached.
    fn open(&mut self) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Wait for the next raw payload.
    ///
    /// Returns [`RelayError::SourceUnavailable`] once the subscription is lost;
    /// no further payloads are produced after that.
    fn next_payload(&mut self) -> impl Future<Output = Result<String, RelayError>> + Send;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Notification channel name for a watched table.
pub fn channel_name(table: &str) -> String {
    format!("{}_changes", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_name("newsletters"), "newsletters_changes");
    }
}
