//! PostgreSQL `LISTEN`/`NOTIFY` change source.

use sqlx::postgres::PgListener;

use super::ChangeSource;
use crate::error::RelayError;

/// Change source listening on one PostgreSQL notification channel.
///
/// Connection loss is reported through [`ChangeSource::next_payload`] instead
/// of being retried here; reconnecting is the caller's decision.
pub struct PgChangeSource {
    database_url: String,
    channel: String,
    listener: Option<PgListener>,
}

impl PgChangeSource {
    /// Create a source for `channel` on the database at `database_url`.
    pub fn new(database_url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            channel: channel.into(),
            listener: None,
        }
    }

    /// Channel being listened on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl ChangeSource for PgChangeSource {
    async fn open(&mut self) -> Result<(), RelayError> {
        let mut listener = PgListener::connect(&self.database_url).await?;
        listener.listen(&self.channel).await?;
        tracing::info!(channel = %self.channel, "listening for change notifications");
        self.listener = Some(listener);
        Ok(())
    }

    async fn next_payload(&mut self) -> Result<String, RelayError> {
        let listener = self.listener.as_mut().ok_or_else(|| {
            RelayError::SourceUnavailable("source has not been opened".to_string())
        })?;

        let received = listener.try_recv().await;
        match received {
            Ok(Some(notification)) => Ok(notification.payload().to_owned()),
            Ok(None) => {
                // try_recv would reconnect on the next call; drop it instead.
                self.listener = None;
                Err(RelayError::SourceUnavailable(format!(
                    "connection lost while listening on {}",
                    self.channel
                )))
            }
            Err(e) => {
                self.listener = None;
                Err(e.into())
            }
        }
    }

    fn describe(&self) -> String {
        format!("postgres channel {}", self.channel)
    }
}

// Omits the URL, which may carry credentials.
impl std::fmt::Debug for PgChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgChangeSource")
            .field("channel", &self.channel)
            .field("connected", &self.listener.is_some())
            .finish()
    }
}
