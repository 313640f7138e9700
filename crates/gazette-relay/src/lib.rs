//! Gazette change-notification relay.
//!
//! This crate turns committed writes on a watched table into events pushed to
//! every connected stream:
//!
//! - [`source`]: commit-triggered notification channels (PostgreSQL `NOTIFY`,
//!   or an in-process channel)
//! - [`listener`]: one long-lived task decoding notifications into
//!   [`ChangeEvent`]s, in commit order
//! - [`broker`]: fan-out to per-session bounded queues, skipping full ones
//! - [`session`]: per-connection loop emitting events and keepalive pings

pub mod broker;
pub mod error;
pub mod event;
pub mod listener;
pub mod session;
pub mod source;

pub use broker::{
    BrokerConfig, EventBroker, PublishReport, SubscriberId, SubscriberInfo, Subscription,
};
pub use error::RelayError;
pub use event::{ChangeEvent, Operation};
pub use listener::{ChangeListener, ListenerExit, ListenerMetrics, ListenerStats};
pub use session::{
    CloseReason, SessionConfig, SessionState, SessionSummary, StreamMessage, StreamSession,
};
pub use source::{channel_name, ChangeSource, ChannelNotifier, ChannelSource};
#[cfg(feature = "postgres")]
pub use source::PgChangeSource;
