//! Per-connection stream sessions.
//!
//! A session owns one subscriber queue and one outbound message sink. It sends
//! a retry hint first, then forwards queued change events as `newsletter`
//! messages, falling back to a `ping` message whenever the queue stays quiet
//! for a full idle window.
//!
//! ```text
//! OPENING ──retry hint──▶ STREAMING ──disconnect / write error / shutdown──▶ CLOSED
//! ```

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::broker::{EventBroker, SubscriberId, Subscription};
use crate::error::RelayError;

/// Default reconnect delay advertised to clients.
pub const DEFAULT_RETRY_HINT: Duration = Duration::from_millis(5000);

/// Default idle window before a ping is sent.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Event tag for change notifications.
pub const NEWSLETTER_EVENT: &str = "newsletter";

/// Event tag and body for keepalives.
pub const PING_EVENT: &str = "ping";

/// One outbound stream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Reconnect delay hint.
    pub retry: Option<Duration>,
    /// Event tag.
    pub event: Option<String>,
    /// Payload.
    pub data: String,
}

impl StreamMessage {
    /// The opening message: a retry hint and no data.
    pub fn retry_hint(retry: Duration) -> Self {
        Self {
            retry: Some(retry),
            event: None,
            data: String::new(),
        }
    }

    /// A change notification carrying a JSON body.
    pub fn newsletter(body: impl Into<String>) -> Self {
        Self {
            retry: None,
            event: Some(NEWSLETTER_EVENT.to_string()),
            data: body.into(),
        }
    }

    /// A keepalive.
    pub fn ping() -> Self {
        Self {
            retry: None,
            event: Some(PING_EVENT.to_string()),
            data: PING_EVENT.to_string(),
        }
    }

    /// Whether this is a keepalive.
    pub fn is_ping(&self) -> bool {
        self.event.as_deref() == Some(PING_EVENT)
    }

    /// Whether this carries a change event.
    pub fn is_newsletter(&self) -> bool {
        self.event.as_deref() == Some(NEWSLETTER_EVENT)
    }
}

/// Session timing configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reconnect delay sent in the opening message.
    pub retry_hint: Duration,
    /// Quiet period after which a ping is sent.
    pub idle_timeout: Duration,
}

impl SessionConfig {
    /// Set the reconnect delay sent in the opening message.
    pub fn with_retry_hint(mut self, retry_hint: Duration) -> Self {
        self.retry_hint = retry_hint;
        self
    }

    /// Set the quiet period after which a ping is sent.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_hint: DEFAULT_RETRY_HINT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered with the broker; retry hint not yet sent.
    Opening,
    /// Forwarding events and pings.
    Streaming,
    /// Deregistered; terminal.
    Closed,
}

/// Why a session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The receiving side of the sink went away.
    ClientDisconnected,
    /// A write to the sink failed.
    TransportError(String),
    /// Server shutdown was signalled.
    Shutdown,
    /// The broker dropped the subscription.
    Unsubscribed,
}

/// Final accounting for a closed session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Subscriber identity the session held.
    pub id: SubscriberId,
    /// `newsletter` messages written.
    pub events_sent: u64,
    /// `ping` messages written.
    pub pings_sent: u64,
    /// Why the session closed.
    pub reason: CloseReason,
}

/// One client's stream.
pub struct StreamSession {
    id: SubscriberId,
    subscription: Option<Subscription>,
    config: SessionConfig,
    state: SessionState,
    shutdown: Option<broadcast::Receiver<()>>,
    events_sent: u64,
    pings_sent: u64,
}

impl StreamSession {
    /// Register a subscriber queue with `broker` and return an opening session.
    ///
    /// Events published after this call are queued for the session even
    /// before [`run`](Self::run) starts.
    pub fn open(broker: &EventBroker, config: SessionConfig) -> Self {
        let subscription = broker.subscribe();
        let id = subscription.id();
        debug!(subscriber_id = %id, "stream session opening");

        Self {
            id,
            subscription: Some(subscription),
            config,
            state: SessionState::Opening,
            shutdown: None,
            events_sent: 0,
            pings_sent: 0,
        }
    }

    /// Close the session when a message arrives on `shutdown`.
    pub fn with_shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Identity of the session's subscriber queue.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until it closes.
    ///
    /// The subscription is deregistered before this returns, whatever the
    /// reason for closing.
    pub async fn run(mut self, sink: mpsc::Sender<StreamMessage>) -> SessionSummary {
        let reason = self.stream(&sink).await;
        self.close(reason)
    }

    async fn stream(&mut self, sink: &mpsc::Sender<StreamMessage>) -> CloseReason {
        if let Err(reason) = self
            .deliver(sink, StreamMessage::retry_hint(self.config.retry_hint))
            .await
        {
            return reason;
        }
        self.state = SessionState::Streaming;

        let idle_timeout = self.config.idle_timeout;
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return CloseReason::Unsubscribed;
            };

            let next = tokio::select! {
                biased;
                _ = sink.closed() => return CloseReason::ClientDisconnected,
                _ = shutdown_signal(&mut self.shutdown) => return CloseReason::Shutdown,
                next = tokio::time::timeout(idle_timeout, subscription.recv()) => next,
            };

            let message = match next {
                Ok(Some(event)) => match event.to_json() {
                    Ok(body) => StreamMessage::newsletter(body),
                    Err(e) => {
                        warn!(
                            subscriber_id = %self.id,
                            error = %e,
                            "failed to encode change event"
                        );
                        continue;
                    }
                },
                Ok(None) => return CloseReason::Unsubscribed,
                Err(_) => StreamMessage::ping(),
            };

            let is_ping = message.is_ping();
            if let Err(reason) = self.deliver(sink, message).await {
                return reason;
            }
            if is_ping {
                self.pings_sent += 1;
            } else {
                self.events_sent += 1;
            }
        }
    }

    async fn deliver(
        &mut self,
        sink: &mpsc::Sender<StreamMessage>,
        message: StreamMessage,
    ) -> Result<(), CloseReason> {
        tokio::select! {
            biased;
            _ = shutdown_signal(&mut self.shutdown) => Err(CloseReason::Shutdown),
            sent = sink.send(message) => sent.map_err(|_| {
                let err = RelayError::SessionTransport("stream connection closed".to_string());
                CloseReason::TransportError(err.to_string())
            }),
        }
    }

    fn close(mut self, reason: CloseReason) -> SessionSummary {
        self.state = SessionState::Closed;
        // Deregister before anything else is released.
        drop(self.subscription.take());

        info!(
            subscriber_id = %self.id,
            events_sent = self.events_sent,
            pings_sent = self.pings_sent,
            reason = ?reason,
            "stream session closed"
        );

        SessionSummary {
            id: self.id,
            events_sent: self.events_sent,
            pings_sent: self.pings_sent,
            reason,
        }
    }
}

async fn shutdown_signal(shutdown: &mut Option<broadcast::Receiver<()>>) {
    match shutdown {
        // Lagged, closed or a message all mean the server is going away.
        Some(rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}
