//! `watch`: follow the live change stream, reconnecting like a browser would.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::GazetteClient;
use crate::error::CliError;
use crate::formatter::{format_event, OutputFormat};
use crate::sse::{SseDecoder, SseFrame};

/// Reconnect delay used until the server sends a retry hint.
pub const DEFAULT_RETRY: Duration = Duration::from_secs(5);

/// What to do with one decoded frame.
#[derive(Debug, PartialEq)]
pub enum FrameAction {
    /// Print this line.
    Print(String),
    /// Adopt a new reconnect delay.
    Retry(Duration),
    Ignore,
}

/// Classify a frame from `/newsletter/events`.
pub fn handle_frame(frame: &SseFrame, format: OutputFormat) -> FrameAction {
    if let Some(retry) = frame.retry {
        return FrameAction::Retry(retry);
    }
    match frame.event_type() {
        "newsletter" => match serde_json::from_str::<Value>(&frame.data) {
            Ok(body) => FrameAction::Print(format_event(&body, format)),
            Err(e) => {
                warn!(error = %e, "undecodable newsletter event");
                FrameAction::Ignore
            }
        },
        "ping" => {
            debug!("keepalive");
            FrameAction::Ignore
        }
        other => {
            debug!(event = other, "ignoring unknown event type");
            FrameAction::Ignore
        }
    }
}

/// Print change events until the process is interrupted.
///
/// A dropped stream is reopened after the last retry hint; missed events are
/// not replayed.
pub async fn run(client: &GazetteClient, format: OutputFormat) -> Result<(), CliError> {
    let mut retry = DEFAULT_RETRY;

    loop {
        match stream_once(client, format, &mut retry).await {
            Ok(()) => info!("stream closed by server"),
            // Auth failures will not fix themselves.
            Err(e @ CliError::Server { status: 401, .. }) => return Err(e),
            Err(e) => warn!(error = %e, "stream interrupted"),
        }

        info!(delay_ms = retry.as_millis() as u64, "reconnecting");
        tokio::time::sleep(retry).await;
    }
}

async fn stream_once(
    client: &GazetteClient,
    format: OutputFormat,
    retry: &mut Duration,
) -> Result<(), CliError> {
    let mut response = client.events().await?;
    let mut decoder = SseDecoder::new();
    info!("watching for newsletter changes");

    while let Some(chunk) = response.chunk().await? {
        for frame in decoder.push(&chunk) {
            match handle_frame(&frame, format) {
                FrameAction::Print(line) => println!("{}", line),
                FrameAction::Retry(delay) => *retry = delay,
                FrameAction::Ignore => {}
            }
        }
    }
    Ok(())
}
