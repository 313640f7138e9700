//! Change listener supervision.
//!
//! The relay's listener reports a lost source and stops. The supervisor owns
//! the reconnect policy: exponential backoff between attempts, and an optional
//! limit on consecutive failures.

use std::time::Duration;

use gazette_relay::{ChangeListener, ChangeSource, ListenerExit, RelayError};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

/// Listener reconnect policy.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on the delay.
    pub max_backoff: Duration,
    /// Consecutive failures before giving up; 0 retries forever.
    pub max_attempts: u32,
}

impl SupervisorConfig {
    /// Set the delay before the first retry.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set the upper bound on the retry delay.
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set the consecutive failure limit (0 = never give up).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_attempts: 0,
        }
    }
}

/// Listener state as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ListenerStatus {
    /// No start attempt has finished yet.
    Starting,
    /// The listener is attached to an open source.
    Connected,
    /// Waiting `delay_ms` before retry number `attempt`.
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// Stopped by shutdown.
    Stopped,
    /// Gave up after too many consecutive failures.
    Failed { error: String },
}

/// Keep `listener` attached to a source built by `make_source` until shutdown.
///
/// Returns `Ok` on shutdown and `Err(SourceUnavailable)` once the failure limit
/// is reached.
pub async fn run<F, S>(
    mut listener: ChangeListener,
    mut make_source: F,
    config: SupervisorConfig,
    status: watch::Sender<ListenerStatus>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), RelayError>
where
    F: FnMut() -> S,
    S: ChangeSource,
{
    let mut failures: u32 = 0;

    loop {
        let source = make_source();
        let description = source.describe();

        // A source can stall while opening; shutdown must not wait for it.
        let started = tokio::select! {
            started = listener.start(source) => started,
            _ = shutdown.recv() => break,
        };

        let last_error = match started {
            Ok(()) => {
                failures = 0;
                info!(source = %description, "change listener connected");
                status.send_replace(ListenerStatus::Connected);

                let exit = tokio::select! {
                    exit = listener.disconnected() => Some(exit),
                    _ = shutdown.recv() => None,
                };
                match exit {
                    None | Some(ListenerExit::Stopped) => break,
                    Some(ListenerExit::Disconnected(reason)) => {
                        warn!(source = %description, %reason, "change listener disconnected");
                        reason
                    }
                }
            }
            Err(e) => {
                warn!(source = %description, error = %e, "failed to start change listener");
                e.to_string()
            }
        };

        failures += 1;
        if config.max_attempts > 0 && failures >= config.max_attempts {
            error!(attempts = failures, error = %last_error, "giving up on change listener");
            status.send_replace(ListenerStatus::Failed {
                error: last_error.clone(),
            });
            return Err(RelayError::SourceUnavailable(format!(
                "gave up after {} attempts: {}",
                failures, last_error
            )));
        }

        let delay = config.backoff(failures);
        info!(
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            "reconnecting change listener"
        );
        status.send_replace(ListenerStatus::Reconnecting {
            attempt: failures,
            delay_ms: delay.as_millis() as u64,
        });

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.recv() => break,
        }
    }

    listener.stop().await;
    status.send_replace(ListenerStatus::Stopped);
    info!("change listener stopped");
    Ok(())
}
