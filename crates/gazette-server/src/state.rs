//! Shared application state.

use std::sync::Arc;

use gazette_relay::{EventBroker, ListenerMetrics};
use tokio::sync::{broadcast, watch};

use crate::config::ServerConfig;
use crate::store::NewsletterStore;
use crate::supervisor::ListenerStatus;

/// State shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Newsletter storage.
    pub store: Arc<NewsletterStore>,
    /// Fan-out to stream sessions.
    pub broker: EventBroker,
    /// Server configuration.
    pub config: ServerConfig,
    /// Latest listener status published by the supervisor.
    pub listener: watch::Receiver<ListenerStatus>,
    /// Counters of the change listener.
    pub listener_metrics: ListenerMetrics,
    shutdown: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        store: Arc<NewsletterStore>,
        broker: EventBroker,
        config: ServerConfig,
        listener: watch::Receiver<ListenerStatus>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            broker,
            config,
            listener,
            listener_metrics: ListenerMetrics::default(),
            shutdown,
        }
    }

    /// Report counters from the given listener in `/health`.
    pub fn with_listener_metrics(mut self, metrics: ListenerMetrics) -> Self {
        self.listener_metrics = metrics;
        self
    }

    /// A receiver that fires when the server begins shutting down.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    pub fn listener_status(&self) -> ListenerStatus {
        self.listener.borrow().clone()
    }
}
