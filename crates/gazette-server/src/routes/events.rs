//! Live change stream endpoint.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use gazette_relay::{StreamMessage, StreamSession};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tracing::{debug, info};

use crate::auth::CurrentUser;
use crate::AppState;

// Messages buffered between the session task and the response body.
const SINK_CAPACITY: usize = 16;

/// Stream routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/newsletter/events", get(newsletter_events))
}

async fn newsletter_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = StreamSession::open(&state.broker, state.config.session.clone())
        .with_shutdown(state.shutdown_signal());
    info!(user = %user.username, subscriber_id = %session.id(), "stream opened");

    let (tx, rx) = mpsc::channel(SINK_CAPACITY);
    tokio::spawn(async move {
        let summary = session.run(tx).await;
        debug!(
            subscriber_id = %summary.id,
            events_sent = summary.events_sent,
            pings_sent = summary.pings_sent,
            "stream task finished"
        );
    });

    Sse::new(ReceiverStream::new(rx).map(|message| Ok(to_sse_event(message))))
}

/// Map a session message onto an SSE event.
pub fn to_sse_event(message: StreamMessage) -> Event {
    let mut event = Event::default();
    if let Some(retry) = message.retry {
        event = event.retry(retry);
    }
    if let Some(name) = message.event {
        event = event.event(name);
    }
    if !message.data.is_empty() {
        event = event.data(message.data);
    }
    event
}
