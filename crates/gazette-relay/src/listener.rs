//! Change listener: the single bridge from a change source to the broker.
//!
//! The listener runs one background task that waits on the source, decodes
//! every payload into a [`ChangeEvent`] and publishes it before reading the
//! next one, so events reach the broker in commit order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::EventBroker;
use crate::error::RelayError;
use crate::event::ChangeEvent;
use crate::source::ChangeSource;

/// Why the listener task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// `stop` was called, or the listener was dropped.
    Stopped,
    /// The source subscription was lost.
    Disconnected(String),
}

/// Counters for a listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    /// Events decoded and published.
    pub delivered: u64,
    /// Payloads discarded as malformed.
    pub malformed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    malformed: AtomicU64,
}

/// Shared handle on a listener's counters.
///
/// Clones observe the same values, across restarts of the listener.
#[derive(Debug, Clone, Default)]
pub struct ListenerMetrics {
    counters: Arc<Counters>,
}

impl ListenerMetrics {
    /// Current counter values.
    pub fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
        }
    }
}

struct Running {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<ListenerExit>,
}

/// Listener that forwards change notifications to an [`EventBroker`].
pub struct ChangeListener {
    broker: EventBroker,
    metrics: ListenerMetrics,
    running: Option<Running>,
}

impl ChangeListener {
    /// Create an idle listener for the given broker.
    pub fn new(broker: EventBroker) -> Self {
        Self {
            broker,
            metrics: ListenerMetrics::default(),
            running: None,
        }
    }

    /// Open `source` and start forwarding its notifications.
    ///
    /// Fails with [`RelayError::SourceUnavailable`] when the source cannot be
    /// opened, and with [`RelayError::AlreadyRunning`] if a previous start is
    /// still active.
    pub async fn start<S: ChangeSource>(&mut self, mut source: S) -> Result<(), RelayError> {
        if self.is_running() {
            return Err(RelayError::AlreadyRunning);
        }
        self.running = None;

        source.open().await?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let broker = self.broker.clone();
        let counters = self.metrics.counters.clone();

        info!(source = %source.describe(), "change listener started");
        let task = tokio::spawn(run(source, broker, counters, stop_rx));

        self.running = Some(Running { stop_tx, task });
        Ok(())
    }

    /// Whether the listener task is active.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|running| !running.task.is_finished())
            .unwrap_or(false)
    }

    /// Wait until the listener task ends on its own.
    ///
    /// Returns immediately with [`ListenerExit::Stopped`] if nothing is running.
    pub async fn disconnected(&mut self) -> ListenerExit {
        let Some(running) = self.running.as_mut() else {
            return ListenerExit::Stopped;
        };

        let exit = match (&mut running.task).await {
            Ok(exit) => exit,
            Err(e) => ListenerExit::Disconnected(format!("listener task failed: {}", e)),
        };
        self.running = None;
        exit
    }

    /// Stop the listener and close its source.
    ///
    /// Idempotent, and safe to call when `start` never succeeded.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.stop_tx.send(());
        match running.task.await {
            Ok(exit) => debug!(?exit, "change listener task joined"),
            Err(e) => warn!(error = %e, "change listener task failed"),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> ListenerStats {
        self.metrics.snapshot()
    }

    /// A handle that keeps reporting counters after the listener is moved
    /// into its supervising task.
    pub fn metrics(&self) -> ListenerMetrics {
        self.metrics.clone()
    }

    /// The broker events are published to.
    pub fn broker(&self) -> &EventBroker {
        &self.broker
    }
}

async fn run<S: ChangeSource>(
    mut source: S,
    broker: EventBroker,
    counters: Arc<Counters>,
    mut stop_rx: oneshot::Receiver<()>,
) -> ListenerExit {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => {
                info!(source = %source.describe(), "change listener stopped");
                return ListenerExit::Stopped;
            }
            payload = source.next_payload() => match payload {
                Ok(payload) => forward(&payload, &broker, &counters),
                Err(e) => {
                    warn!(source = %source.describe(), error = %e, "change source disconnected");
                    return ListenerExit::Disconnected(e.to_string());
                }
            },
        }
    }
}

fn forward(payload: &str, broker: &EventBroker, counters: &Counters) {
    match ChangeEvent::decode(payload) {
        Ok(event) => {
            debug!(operation = %event.operation, "forwarding change event");
            broker.publish(event);
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.malformed.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, payload_len = payload.len(), "discarding malformed notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ChannelSource;
    use std::time::Duration;

    async fn recv_id(sub: &mut crate::broker::Subscription) -> i64 {
        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("subscription closed");
        event.field("id").and_then(|v| v.as_i64()).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_in_order() {
        let broker = EventBroker::new();
        let mut sub = broker.subscribe();
        let mut listener = ChangeListener::new(broker.clone());

        let (notifier, source) = ChannelSource::pair();
        listener.start(source).await.unwrap();
        assert!(listener.is_running());

        for id in 1..=5 {
            notifier.notify(format!(r#"{{"operation":"INSERT","id":{id}}}"#));
        }

        for id in 1..=5 {
            assert_eq!(recv_id(&mut sub).await, id);
        }
        assert_eq!(listener.stats().delivered, 5);

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let broker = EventBroker::new();
        let mut sub = broker.subscribe();
        let mut listener = ChangeListener::new(broker);

        let (notifier, source) = ChannelSource::pair();
        listener.start(source).await.unwrap();

        notifier.notify("{not json");
        notifier.notify(r#"{"operation":"DELETE","id":1}"#);
        notifier.notify(r#"{"operation":"UPDATE","id":2}"#);

        assert_eq!(recv_id(&mut sub).await, 2);
        assert!(listener.is_running());

        let stats = listener.stats();
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.delivered, 1);

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_metrics_handle_tracks_listener() {
        let broker = EventBroker::new();
        let mut sub = broker.subscribe();
        let mut listener = ChangeListener::new(broker);
        let metrics = listener.metrics();

        let (notifier, source) = ChannelSource::pair();
        listener.start(source).await.unwrap();
        notifier.notify("nope");
        notifier.notify(r#"{"operation":"INSERT","id":3}"#);
        assert_eq!(recv_id(&mut sub).await, 3);

        assert_eq!(
            metrics.snapshot(),
            ListenerStats {
                delivered: 1,
                malformed: 1
            }
        );
        assert_eq!(metrics.snapshot(), listener.stats());

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_start_fails_when_source_unreachable() {
        let mut listener = ChangeListener::new(EventBroker::new());
        let (notifier, source) = ChannelSource::pair();
        drop(notifier);

        let err = listener.start(source).await.unwrap_err();
        assert!(matches!(err, RelayError::SourceUnavailable(_)));
        assert!(!listener.is_running());

        // stop after a failed start is a no-op
        listener.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut listener = ChangeListener::new(EventBroker::new());
        let (_n1, s1) = ChannelSource::pair();
        let (_n2, s2) = ChannelSource::pair();

        listener.start(s1).await.unwrap();
        let err = listener.start(s2).await.unwrap_err();
        assert!(matches!(err, RelayError::AlreadyRunning));

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_is_surfaced() {
        let mut listener = ChangeListener::new(EventBroker::new());
        let (notifier, source) = ChannelSource::pair();
        listener.start(source).await.unwrap();

        drop(notifier);

        let exit = tokio::time::timeout(Duration::from_secs(5), listener.disconnected())
            .await
            .unwrap();
        assert!(matches!(exit, ListenerExit::Disconnected(_)));
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn test_restart_after_disconnect() {
        let broker = EventBroker::new();
        let mut sub = broker.subscribe();
        let mut listener = ChangeListener::new(broker);

        let (first, source) = ChannelSource::pair();
        listener.start(source).await.unwrap();
        drop(first);
        listener.disconnected().await;

        let (second, source) = ChannelSource::pair();
        listener.start(source).await.unwrap();
        second.notify(r#"{"operation":"INSERT","id":9}"#);
        assert_eq!(recv_id(&mut sub).await, 9);

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut listener = ChangeListener::new(EventBroker::new());
        listener.stop().await;

        let (_notifier, source) = ChannelSource::pair();
        listener.start(source).await.unwrap();
        listener.stop().await;
        listener.stop().await;

        assert!(!listener.is_running());
        assert_eq!(listener.disconnected().await, ListenerExit::Stopped);
    }
}
