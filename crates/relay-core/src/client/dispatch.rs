use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{messaging::types::Update, Result};

/// Callback invoked once per inbound update.
///
/// The loop awaits each call before starting the next, so implementations never see two
/// updates at once. A returned error is logged and the loop moves on.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: &Update) -> Result<()>;
}

/// Where the poll loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    Dispatching { remaining: usize },
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Idle => f.write_str("idle"),
            LoopState::Polling => f.write_str("polling"),
            LoopState::Dispatching { remaining } => write!(f, "dispatching({remaining})"),
            LoopState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Counters returned when the loop stops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopStats {
    pub started_at: DateTime<Utc>,
    pub polls: u64,
    pub updates_dispatched: u64,
    pub handler_failures: u64,
}

impl LoopStats {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            polls: 0,
            updates_dispatched: 0,
            handler_failures: 0,
        }
    }
}

impl fmt::Display for LoopStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} polls, {} updates dispatched, {} handler failures since {}",
            self.polls,
            self.updates_dispatched,
            self.handler_failures,
            self.started_at.to_rfc3339()
        )
    }
}
