use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use relay_core::{
    config::Config,
    domain::RecipientId,
    messaging::{
        port::HttpTransport,
        throttled::{ThrottleConfig, ThrottledTransport},
    },
    retry::{with_backoff, RetryPolicy},
    NotificationClient, Notifier,
};
use relay_telegram::TelegramTransport;

mod handler;

use handler::RelayHandler;

const STARTUP_MESSAGE: &str = "📡 <b>Relay online</b>\n\nListening for messages.";
const SHUTDOWN_MESSAGE: &str = "📴 <b>Relay offline</b>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_core::logging::init("relay")?;

    let cfg = Config::load()?;

    let raw: Arc<dyn HttpTransport> = Arc::new(TelegramTransport::from_config(&cfg)?);
    // Space out sends so bursts of replies stay under Telegram's flood limits.
    let transport: Arc<dyn HttpTransport> = if cfg.throttle_enabled {
        Arc::new(ThrottledTransport::new(raw, ThrottleConfig::default()))
    } else {
        raw
    };

    let mut client = NotificationClient::from_config(&cfg, transport);

    let me = client
        .get_me()
        .await
        .context("bot credential check (getMe) failed")?;
    info!(
        bot_id = me.id,
        username = me.username.as_deref().unwrap_or("?"),
        recipient = %cfg.recipient,
        allowed_chats = cfg.allowed_chats.len(),
        "relay started"
    );

    let retry = RetryPolicy::with_attempts(cfg.send_retry_attempts);
    let notifier = client.notifier();
    announce(&notifier, &cfg.recipient, &retry, STARTUP_MESSAGE).await;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received; stopping after the current poll"),
                Err(e) => error!(error = %e, "could not listen for interrupt; stopping"),
            }
            cancel.cancel();
        });
    }

    let handler = RelayHandler::new(
        notifier.clone(),
        cfg.allowed_chats.clone(),
        cfg.message_limit,
        cfg.parse_mode.as_deref(),
    );
    let stats = client
        .run_loop(&handler, cfg.poll_interval, &cancel)
        .await;
    info!(
        polls = stats.polls,
        updates = stats.updates_dispatched,
        failures = stats.handler_failures,
        "relay stopped"
    );

    announce(&notifier, &cfg.recipient, &retry, SHUTDOWN_MESSAGE).await;
    Ok(())
}

/// Best-effort status notice; only transient failures are retried.
async fn announce(notifier: &Notifier, recipient: &RecipientId, retry: &RetryPolicy, text: &str) {
    match with_backoff(retry, move || notifier.try_send_text(recipient, text)).await {
        Ok(()) => {}
        Err(e) if e.is_retryable() => warn!(%recipient, error = %e, "status notice not delivered"),
        Err(e) => error!(%recipient, error = %e, "status notice rejected"),
    }
}
