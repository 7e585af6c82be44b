use crate::domain::{ChatId, MessageId, RecipientId, UpdateId};

/// One inbound update, as fetched by a single poll.
///
/// Immutable after decode; the client hands each one to the dispatcher exactly once.
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub update_id: UpdateId,
    pub payload: UpdatePayload,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UpdatePayload {
    Text(TextMessage),
    Photo(PhotoMessage),
    /// Anything else the remote delivers (edits, stickers, callbacks, ...).
    ///
    /// Kept so the cursor can move past it and callers can see it was skipped.
    Unsupported { kind: String },
}

impl UpdatePayload {
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            UpdatePayload::Text(m) => Some(m.chat_id),
            UpdatePayload::Photo(m) => Some(m.chat_id),
            UpdatePayload::Unsupported { .. } => None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            UpdatePayload::Text(_) => "text",
            UpdatePayload::Photo(_) => "photo",
            UpdatePayload::Unsupported { kind } => kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub from: Option<Sender>,
    pub text: String,
}

impl TextMessage {
    /// Bot command name without the leading `/` or a `@botname` suffix, lowercased.
    pub fn command(&self) -> Option<(String, &str)> {
        let rest = self.text.trim().strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            return None;
        }
        Some((name.to_lowercase(), args.trim()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    pub file_size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhotoMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub from: Option<Sender>,
    pub sizes: Vec<PhotoSize>,
    pub caption: Option<String>,
}

impl PhotoMessage {
    /// Highest resolution variant: largest `file_size`, then largest pixel area.
    pub fn largest(&self) -> Option<&PhotoSize> {
        self.sizes.iter().max_by_key(|p| {
            (
                p.file_size.unwrap_or(0),
                u64::from(p.width) * u64::from(p.height),
            )
        })
    }
}

/// Bot account info returned by `getMe`.
#[derive(Clone, Debug, PartialEq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NotificationBody {
    Text(String),
    Photo { blob: Vec<u8>, caption: Option<String> },
}

/// Fire-and-forget outbound message.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundNotification {
    pub recipient: RecipientId,
    pub body: NotificationBody,
}

impl OutboundNotification {
    pub fn text(recipient: RecipientId, text: impl Into<String>) -> Self {
        Self {
            recipient,
            body: NotificationBody::Text(text.into()),
        }
    }

    pub fn photo(recipient: RecipientId, blob: Vec<u8>, caption: Option<String>) -> Self {
        Self {
            recipient,
            body: NotificationBody::Photo { blob, caption },
        }
    }
}

/// Truncate `text` to at most `limit` bytes on a char boundary, marking the cut with `...`.
pub fn truncate_for_message(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    const MARK: &str = "...";
    let budget = limit.saturating_sub(MARK.len());
    let mut end = budget;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    if limit < MARK.len() {
        return MARK[..limit].to_string();
    }
    format!("{}{MARK}", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> TextMessage {
        TextMessage {
            chat_id: ChatId(1),
            message_id: MessageId(1),
            from: None,
            text: s.to_string(),
        }
    }

    #[test]
    fn command_parsing() {
        assert_eq!(text("/start").command(), Some(("start".to_string(), "")));
        assert_eq!(
            text("/Ping@relay_bot  now ").command(),
            Some(("ping".to_string(), "now"))
        );
        assert_eq!(text("hello").command(), None);
        assert_eq!(text("/").command(), None);
    }

    #[test]
    fn largest_photo_prefers_file_size_then_area() {
        let size = |id: &str, w, h, fs| PhotoSize {
            file_id: id.to_string(),
            width: w,
            height: h,
            file_size: fs,
        };
        let msg = PhotoMessage {
            chat_id: ChatId(1),
            message_id: MessageId(2),
            from: None,
            sizes: vec![
                size("small", 90, 90, Some(1_000)),
                size("big", 1280, 720, Some(90_000)),
                size("mid", 320, 320, Some(20_000)),
            ],
            caption: None,
        };
        assert_eq!(msg.largest().unwrap().file_id, "big");

        let no_sizes = PhotoMessage {
            sizes: vec![size("a", 10, 10, None), size("b", 20, 20, None)],
            ..msg
        };
        assert_eq!(no_sizes.largest().unwrap().file_id, "b");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_for_message("short", 10), "short");
        assert_eq!(truncate_for_message("abcdefghij", 8), "abcde...");
        let s = "ééééé"; // 10 bytes
        let t = truncate_for_message(s, 8);
        assert!(t.len() <= 8);
        assert_eq!(t, "éé...");
        assert_eq!(truncate_for_message("abcdef", 2), "..");
    }
}
