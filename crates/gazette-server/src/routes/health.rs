//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use gazette_relay::{ListenerStats, SubscriberInfo};
use serde::Serialize;

use crate::supervisor::ListenerStatus;
use crate::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: &'static str,
    pub storage_connected: bool,
    pub subscribers: usize,
    /// Per-stream queue accounting; `skipped` counts events lost to a full queue.
    pub subscriber_queues: Vec<SubscriberQueue>,
    pub events_published: u64,
    pub listener: ListenerStatus,
    pub listener_stats: ListenerStats,
}

/// One registered stream queue.
#[derive(Debug, Serialize)]
pub struct SubscriberQueue {
    pub id: u64,
    pub age_ms: u64,
    pub delivered: u64,
    pub skipped: u64,
}

impl From<SubscriberInfo> for SubscriberQueue {
    fn from(info: SubscriberInfo) -> Self {
        Self {
            id: info.id.as_u64(),
            age_ms: info.age.as_millis() as u64,
            delivered: info.delivered,
            skipped: info.skipped,
        }
    }
}

/// Health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage_connected = state.store.ping().await.is_ok();
    let listener = state.listener_status();
    let healthy = storage_connected && listener == ListenerStatus::Connected;

    let subscriber_queues: Vec<SubscriberQueue> = state
        .broker
        .subscribers()
        .into_iter()
        .map(SubscriberQueue::from)
        .collect();

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        storage: state.store.backend(),
        storage_connected,
        subscribers: subscriber_queues.len(),
        subscriber_queues,
        events_published: state.broker.published_count(),
        listener,
        listener_stats: state.listener_metrics.snapshot(),
    })
}
