//! In-process change source backed by a tokio channel.

use tokio::sync::mpsc;

use super::ChangeSource;
use crate::error::RelayError;
use crate::event::ChangeEvent;

/// Sending half of a [`ChannelSource`]; plays the role of the commit trigger.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelNotifier {
    /// Send a raw payload. Returns `false` if the source has gone away.
    pub fn notify(&self, payload: impl Into<String>) -> bool {
        self.tx.send(payload.into()).is_ok()
    }

    /// Encode and send an event the way the database trigger would.
    pub fn notify_event(&self, event: &ChangeEvent) -> Result<bool, RelayError> {
        Ok(self.notify(event.to_json()?))
    }

    /// Whether the receiving source has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Change source fed by a [`ChannelNotifier`].
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<String>,
    opened: bool,
}

impl ChannelSource {
    /// Create a connected notifier/source pair.
    pub fn pair() -> (ChannelNotifier, ChannelSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChannelNotifier { tx },
            ChannelSource { rx, opened: false },
        )
    }
}

impl ChangeSource for ChannelSource {
    async fn open(&mut self) -> Result<(), RelayError> {
        // Queued payloads survive a dropped notifier; only refuse when nothing is left.
        if self.rx.is_closed() && self.rx.is_empty() {
            return Err(RelayError::SourceUnavailable(
                "notifier has been dropped".to_string(),
            ));
        }
        self.opened = true;
        Ok(())
    }

    async fn next_payload(&mut self) -> Result<String, RelayError> {
        if !self.opened {
            return Err(RelayError::SourceUnavailable(
                "source has not been opened".to_string(),
            ));
        }
        self.rx
            .recv()
            .await
            .ok_or_else(|| RelayError::SourceUnavailable("notifier closed".to_string()))
    }

    fn describe(&self) -> String {
        "in-process channel".to_string()
    }
}
