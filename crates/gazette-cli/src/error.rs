//! CLI error types.

use thiserror::Error;

/// Errors surfaced to the user.
#[derive(Debug, Error)]
pub enum CliError {
    /// Transport-level failure talking to the server.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {detail}")]
    Server { status: u16, detail: String },

    /// Login succeeded but no session cookie came back.
    #[error("login response carried no session cookie")]
    MissingSession,

    /// Response body could not be decoded.
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}
