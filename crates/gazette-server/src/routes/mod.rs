//! HTTP route handlers.

pub mod auth;
pub mod events;
pub mod health;
pub mod newsletters;
