//! Notification client: outbound sends, cursor-tracked long-polling, and ordered dispatch.

pub mod cursor;
pub mod dispatch;
pub mod notifier;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    domain::{RecipientId, UpdateId},
    errors::Error,
    messaging::{
        port::HttpTransport,
        types::{BotIdentity, OutboundNotification, Update},
        wire::decode_updates,
    },
    Result,
};

use cursor::Cursor;
use dispatch::{LoopState, LoopStats, UpdateHandler};
use notifier::Notifier;

/// Client for a bot messaging API.
///
/// Owns the update cursor, so polling takes `&mut self`; sends go through a cloneable
/// [`Notifier`] that handlers may hold.
pub struct NotificationClient {
    notifier: Notifier,
    cursor: Cursor,
    poll_timeout: Duration,
    state: LoopState,
}

impl NotificationClient {
    pub fn new(transport: Arc<dyn HttpTransport>, start_offset: i64) -> Self {
        Self {
            notifier: Notifier::new(transport),
            cursor: Cursor::new(start_offset),
            poll_timeout: Duration::from_secs(10),
            state: LoopState::Idle,
        }
    }

    pub fn from_config(cfg: &Config, transport: Arc<dyn HttpTransport>) -> Self {
        Self::new(transport, cfg.start_offset)
            .with_parse_mode(cfg.parse_mode.clone())
            .with_link_previews_disabled(cfg.disable_link_preview)
            .with_poll_timeout(cfg.poll_timeout)
    }

    pub fn with_parse_mode(mut self, parse_mode: Option<String>) -> Self {
        self.notifier = self.notifier.with_parse_mode(parse_mode);
        self
    }

    pub fn with_link_previews_disabled(mut self, disabled: bool) -> Self {
        self.notifier = self.notifier.with_link_previews_disabled(disabled);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Last consumed update id.
    pub fn cursor(&self) -> i64 {
        self.cursor.last()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub async fn send_text(&self, recipient: &RecipientId, text: &str) -> Result<bool> {
        self.notifier.send_text(recipient, text).await
    }

    pub async fn send_photo(
        &self,
        recipient: &RecipientId,
        blob: &[u8],
        caption: Option<&str>,
    ) -> Result<bool> {
        self.notifier.send_photo(recipient, blob, caption).await
    }

    pub async fn send(&self, notification: &OutboundNotification) -> Result<bool> {
        self.notifier.send(notification).await
    }

    pub async fn get_me(&self) -> Result<BotIdentity> {
        self.notifier.get_me().await
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.notifier.download_file(file_id).await
    }

    /// Long-poll for updates after the cursor.
    ///
    /// Returns the new updates in ascending id order and moves the cursor to the highest one.
    /// Any failure yields an empty batch and leaves the cursor where it was.
    pub async fn poll_updates(&mut self, timeout: Duration) -> Vec<Update> {
        let before = self.cursor;
        let query = [
            ("offset", before.next_offset().to_string()),
            ("timeout", timeout.as_secs().to_string()),
        ];

        let fetched = match self.notifier.transport().get("getUpdates", &query).await {
            Ok(resp) if resp.is_success() => decode_updates(resp.status, &resp.body),
            Ok(resp) => Err(Error::Rejected {
                status: resp.status,
                description: resp.snippet(200),
            }),
            Err(e) => Err(e),
        };

        let mut batch = match fetched {
            Ok(updates) => updates,
            Err(e @ Error::Transport(_)) => {
                warn!(offset = before.next_offset(), error = %e, "poll failed: transport");
                return Vec::new();
            }
            Err(e) => {
                warn!(offset = before.next_offset(), error = %e, "poll failed: rejected");
                return Vec::new();
            }
        };

        let total = batch.len();
        batch.retain(|u| before.is_fresh(u.update_id));
        if batch.len() < total {
            warn!(
                dropped = total - batch.len(),
                cursor = before.last(),
                "server re-sent already consumed updates"
            );
        }
        // A conforming server already sends ascending ids; the stable sort is a no-op then.
        batch.sort_by_key(|u| u.update_id);

        if let Some(max) = batch.last().map(|u| u.update_id) {
            self.cursor.advance(max);
            debug!(count = batch.len(), cursor = self.cursor.last(), "poll returned updates");
        }
        batch
    }

    /// Poll, dispatch each update in order, sleep, repeat until `cancel` fires.
    ///
    /// Cancellation is observed between cycles and during the sleep; a long-poll already in
    /// flight runs to its own timeout, and a fetched batch is always dispatched in full.
    pub async fn run_loop(
        &mut self,
        handler: &dyn UpdateHandler,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> LoopStats {
        let mut stats = LoopStats::start();
        info!(
            cursor = self.cursor.last(),
            poll_timeout_secs = self.poll_timeout.as_secs(),
            "update loop started"
        );

        while !cancel.is_cancelled() {
            self.set_state(LoopState::Polling);
            let batch = self.poll_updates(self.poll_timeout).await;
            stats.polls += 1;

            let mut remaining = batch.len();
            for update in &batch {
                self.set_state(LoopState::Dispatching { remaining });
                dispatch_one(handler, update, &mut stats).await;
                remaining -= 1;
            }
            self.set_state(LoopState::Idle);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        self.set_state(LoopState::Stopped);
        info!(%stats, "update loop stopped");
        stats
    }

    fn set_state(&mut self, next: LoopState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "loop state");
            self.state = next;
        }
    }
}

async fn dispatch_one(handler: &dyn UpdateHandler, update: &Update, stats: &mut LoopStats) {
    let UpdateId(id) = update.update_id;
    debug!(update_id = id, kind = update.payload.kind(), "dispatching update");
    match handler.handle(update).await {
        Ok(()) => stats.updates_dispatched += 1,
        Err(e) => {
            stats.updates_dispatched += 1;
            stats.handler_failures += 1;
            warn!(update_id = id, error = %e, "update handler failed");
        }
    }
}
