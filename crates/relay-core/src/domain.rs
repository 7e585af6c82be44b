use std::fmt;

use crate::{errors::Error, Result};

/// Server-assigned update id (monotonically increasing per bot).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

/// Destination of an outbound notification: a numeric chat id or an `@channel` handle.
///
/// Construction rejects empty input, so every send path can assume a usable recipient.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecipientId(String);

impl RecipientId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidArgument("recipient id is empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ChatId> for RecipientId {
    fn from(c: ChatId) -> Self {
        Self(c.0.to_string())
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bot credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    /// Telegram tokens look like `123456789:AA...`.
    pub fn parse(raw: &str) -> Result<Self> {
        let token = raw.trim();
        if token.is_empty() {
            return Err(Error::Config("bot token is empty".to_string()));
        }
        let Some((id, secret)) = token.split_once(':') else {
            return Err(Error::Config(
                "bot token must have the form <id>:<secret>".to_string(),
            ));
        };
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) || secret.is_empty() {
            return Err(Error::Config(
                "bot token must have the form <id>:<secret>".to_string(),
            ));
        }
        Ok(Self(token.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BotToken(***)")
    }
}

impl fmt::Display for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}
