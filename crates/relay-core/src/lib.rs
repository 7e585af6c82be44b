//! Core of the notification relay.
//!
//! This crate is intentionally transport-agnostic. The bot API's HTTP surface lives behind
//! the `HttpTransport` port, implemented in adapter crates.

pub mod client;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod retry;

pub use client::{
    dispatch::{LoopState, LoopStats, UpdateHandler},
    notifier::Notifier,
    NotificationClient,
};
pub use errors::{Error, Result};
