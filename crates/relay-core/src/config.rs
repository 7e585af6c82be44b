use std::{env, fs, path::Path, time::Duration};

use crate::{
    domain::{BotToken, RecipientId},
    errors::Error,
    Result,
};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Typed configuration for the relay.
///
/// Credentials and the recipient are injected here and nowhere else.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials / routing
    pub bot_token: BotToken,
    pub recipient: RecipientId,
    pub allowed_chats: Vec<i64>,
    pub api_base: String,

    // Outbound formatting
    pub parse_mode: Option<String>,
    pub disable_link_preview: bool,
    pub message_limit: usize,

    // Polling
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub start_offset: i64,

    // Delivery
    pub send_retry_attempts: u32,
    pub throttle_enabled: bool,
}

impl Config {
    /// Load from the process environment, after folding in `.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw_token = lookup("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if raw_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let bot_token = BotToken::parse(&raw_token)?;

        let raw_recipient = lookup("TELEGRAM_CHAT_ID").unwrap_or_default();
        if raw_recipient.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_CHAT_ID environment variable is required".to_string(),
            ));
        }
        let recipient = RecipientId::parse(&raw_recipient)?;

        // Inbound is served only for these chats; the recipient is the natural default.
        let allowed_chats = match lookup("TELEGRAM_ALLOWED_CHATS").and_then(non_empty) {
            Some(csv) => parse_csv_i64(&csv),
            None => recipient.as_str().parse::<i64>().into_iter().collect(),
        };

        let api_base = lookup("TELEGRAM_API_BASE")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let parse_mode = match lookup("TELEGRAM_PARSE_MODE") {
            None => Some("HTML".to_string()),
            Some(v) => {
                let v = v.trim();
                if v.is_empty() || v.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(v.to_string())
                }
            }
        };
        let disable_link_preview = lookup("TELEGRAM_DISABLE_PREVIEW")
            .map(|s| parse_bool(&s))
            .unwrap_or(false);
        let message_limit = parse_num(&lookup, "TELEGRAM_MESSAGE_LIMIT")?.unwrap_or(4096);
        if message_limit == 0 {
            return Err(Error::Config(
                "TELEGRAM_MESSAGE_LIMIT must be positive".to_string(),
            ));
        }

        let poll_timeout_secs: u64 = parse_num(&lookup, "POLL_TIMEOUT_SECS")?.unwrap_or(10);
        let poll_interval_ms: u64 = parse_num(&lookup, "POLL_INTERVAL_MS")?.unwrap_or(1000);
        // The transport must outlive the long-poll or every idle poll would look like a failure.
        let http_timeout_secs: u64 = parse_num(&lookup, "HTTP_TIMEOUT_SECS")?
            .unwrap_or(poll_timeout_secs.saturating_add(10));
        if http_timeout_secs <= poll_timeout_secs {
            return Err(Error::Config(format!(
                "HTTP_TIMEOUT_SECS ({http_timeout_secs}) must exceed POLL_TIMEOUT_SECS ({poll_timeout_secs})"
            )));
        }
        let start_offset: i64 = parse_num(&lookup, "RELAY_START_OFFSET")?.unwrap_or(0);
        if start_offset < 0 {
            return Err(Error::Config(
                "RELAY_START_OFFSET must not be negative".to_string(),
            ));
        }

        let send_retry_attempts: u32 = parse_num(&lookup, "SEND_RETRY_ATTEMPTS")?.unwrap_or(3);
        let throttle_enabled = lookup("THROTTLE_ENABLED")
            .map(|s| parse_bool(&s))
            .unwrap_or(true);

        Ok(Self {
            bot_token,
            recipient,
            allowed_chats,
            api_base,
            parse_mode,
            disable_link_preview,
            message_limit,
            poll_timeout: Duration::from_secs(poll_timeout_secs),
            poll_interval: Duration::from_millis(poll_interval_ms),
            http_timeout: Duration::from_secs(http_timeout_secs),
            start_offset,
            send_retry_attempts: send_retry_attempts.max(1),
            throttle_enabled,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn parse_num<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} is not a valid number: {raw}")))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_csv_i64(v: &str) -> Vec<i64> {
    v.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
