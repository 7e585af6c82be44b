use async_trait::async_trait;
use tracing::{debug, info, warn};

use relay_core::{
    domain::{ChatId, RecipientId},
    messaging::types::{PhotoMessage, TextMessage, Update, UpdatePayload},
    Notifier, Result, UpdateHandler,
};

/// Telegram's limit for photo captions.
const CAPTION_LIMIT: usize = 1024;

const WELCOME: &str = "📡 <b>Relay online</b>\n\n\
Send a photo and it comes straight back with a receipt.\n\
Commands: /start, /help, /ping";

const UNKNOWN_COMMAND: &str = "Unknown command: /{}\nTry /help";

/// Replies to inbound messages from the chats it serves.
pub struct RelayHandler {
    notifier: Notifier,
    allowed_chats: Vec<i64>,
    message_limit: usize,
    html: bool,
}

impl RelayHandler {
    pub fn new(
        notifier: Notifier,
        allowed_chats: Vec<i64>,
        message_limit: usize,
        parse_mode: Option<&str>,
    ) -> Self {
        Self {
            notifier,
            allowed_chats,
            message_limit,
            html: parse_mode.is_some_and(|m| m.eq_ignore_ascii_case("html")),
        }
    }

    fn is_allowed(&self, chat_id: ChatId) -> bool {
        self.allowed_chats.contains(&chat_id.0)
    }

    /// Markup-free fallback when the configured parse mode is not HTML.
    fn render(&self, html: &str) -> String {
        if self.html {
            html.to_string()
        } else {
            strip_tags(html)
        }
    }

    async fn reply(&self, chat_id: ChatId, html: &str) -> Result<()> {
        let text = self.render(html);
        if !self.notifier.send_text(&RecipientId::from(chat_id), &text).await? {
            warn!(chat_id = chat_id.0, "reply not delivered");
        }
        Ok(())
    }

    async fn on_text(&self, msg: &TextMessage) -> Result<()> {
        match msg.command() {
            Some((name, _)) if name == "start" || name == "help" => {
                self.reply(msg.chat_id, WELCOME).await
            }
            Some((name, _)) if name == "ping" => self.reply(msg.chat_id, "pong").await,
            Some((name, _)) => {
                let budget = self.message_limit.saturating_sub(UNKNOWN_COMMAND.len());
                let text = UNKNOWN_COMMAND.replacen("{}", &escape_within(&name, budget), 1);
                self.reply(msg.chat_id, &text).await
            }
            None => {
                self.reply(msg.chat_id, "Send a photo to get a receipt, or /help.")
                    .await
            }
        }
    }

    async fn on_photo(&self, msg: &PhotoMessage) -> Result<()> {
        let Some(best) = msg.largest() else {
            return Ok(());
        };

        let blob = match self.notifier.download_file(&best.file_id).await {
            Ok(b) => b,
            Err(e) => {
                self.reply(msg.chat_id, "❌ Could not download that photo.")
                    .await?;
                return Err(e);
            }
        };

        let mut caption = format!(
            "<b>Received</b> {}x{}, {:.1} KB",
            best.width,
            best.height,
            blob.len() as f64 / 1024.0
        );
        if let Some(c) = msg.caption.as_deref().filter(|c| !c.trim().is_empty()) {
            caption.push_str("\n\n");
            let budget = CAPTION_LIMIT.saturating_sub(caption.len());
            caption.push_str(&escape_within(c, budget));
        }
        let caption = self.render(&caption);

        let recipient = RecipientId::from(msg.chat_id);
        if !self
            .notifier
            .send_photo(&recipient, &blob, Some(&caption))
            .await?
        {
            warn!(chat_id = msg.chat_id.0, "photo receipt not delivered");
        }
        Ok(())
    }
}

#[async_trait]
impl UpdateHandler for RelayHandler {
    async fn handle(&self, update: &Update) -> Result<()> {
        let Some(chat_id) = update.payload.chat_id() else {
            debug!(update_id = update.update_id.0, kind = update.payload.kind(), "skipping");
            return Ok(());
        };
        if !self.is_allowed(chat_id) {
            info!(
                update_id = update.update_id.0,
                chat_id = chat_id.0,
                "ignoring message from unlisted chat"
            );
            return Ok(());
        }

        match &update.payload {
            UpdatePayload::Text(msg) => self.on_text(msg).await,
            UpdatePayload::Photo(msg) => self.on_photo(msg).await,
            UpdatePayload::Unsupported { .. } => Ok(()),
        }
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape `plain`, cutting it so the escaped form fits in `budget` bytes.
///
/// The cut happens on the plain text, never inside an entity.
fn escape_within(plain: &str, budget: usize) -> String {
    const MARK: &str = "...";
    let full = escape_html(plain);
    if full.len() <= budget {
        return full;
    }
    let room = budget.saturating_sub(MARK.len());
    let mut out = String::with_capacity(budget);
    let mut buf = [0u8; 4];
    for ch in plain.chars() {
        let piece: &str = match ch {
            '&' => "&amp;",
            '<' => "&lt;",
            '>' => "&gt;",
            _ => ch.encode_utf8(&mut buf),
        };
        if out.len() + piece.len() > room {
            break;
        }
        out.push_str(piece);
    }
    if budget >= MARK.len() {
        out.push_str(MARK);
    }
    out
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{
        client::testing::FakeTransport,
        domain::{MessageId, UpdateId},
        messaging::{port::HttpResponse, types::PhotoSize},
        Error,
    };
    use std::sync::Arc;

    const CHAT: i64 = 7700;

    fn ok() -> HttpResponse {
        HttpResponse::new(200, r#"{"ok":true,"result":{}}"#)
    }

    fn handler(t: &Arc<FakeTransport>, parse_mode: Option<&str>) -> RelayHandler {
        let notifier = Notifier::new(t.clone()).with_parse_mode(parse_mode.map(str::to_string));
        RelayHandler::new(notifier, vec![CHAT], 4096, parse_mode)
    }

    fn text_update(id: i64, chat: i64, text: &str) -> Update {
        Update {
            update_id: UpdateId(id),
            payload: UpdatePayload::Text(TextMessage {
                chat_id: ChatId(chat),
                message_id: MessageId(id),
                from: None,
                text: text.to_string(),
            }),
        }
    }

    fn photo_update(id: i64, caption: Option<&str>) -> Update {
        Update {
            update_id: UpdateId(id),
            payload: UpdatePayload::Photo(PhotoMessage {
                chat_id: ChatId(CHAT),
                message_id: MessageId(id),
                from: None,
                sizes: vec![
                    PhotoSize {
                        file_id: "thumb".to_string(),
                        width: 90,
                        height: 60,
                        file_size: Some(900),
                    },
                    PhotoSize {
                        file_id: "full".to_string(),
                        width: 1280,
                        height: 720,
                        file_size: Some(2048),
                    },
                ],
                caption: caption.map(str::to_string),
            }),
        }
    }

    #[tokio::test]
    async fn start_sends_welcome() {
        let t = FakeTransport::new();
        t.reply_send(ok());
        handler(&t, Some("HTML"))
            .handle(&text_update(1, CHAT, "/start"))
            .await
            .unwrap();

        let sent = t.sends();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].field("chat_id"), Some("7700"));
        assert!(sent[0].field("text").unwrap().contains("<b>Relay online</b>"));
    }

    #[tokio::test]
    async fn plain_mode_strips_markup() {
        let t = FakeTransport::new();
        t.reply_send(ok());
        handler(&t, None)
            .handle(&text_update(1, CHAT, "/help"))
            .await
            .unwrap();

        let text = t.sends()[0].field("text").unwrap().to_string();
        assert!(text.starts_with("📡 Relay online"));
        assert!(!text.contains("<b>"));
    }

    #[tokio::test]
    async fn ping_and_unknown_commands() {
        let t = FakeTransport::new();
        t.reply_send(ok());
        t.reply_send(ok());
        let h = handler(&t, Some("HTML"));
        h.handle(&text_update(1, CHAT, "/ping")).await.unwrap();
        h.handle(&text_update(2, CHAT, "/<x>")).await.unwrap();

        let sent = t.sends();
        assert_eq!(sent[0].field("text"), Some("pong"));
        assert!(sent[1].field("text").unwrap().contains("/&lt;x&gt;"));
    }

    #[tokio::test]
    async fn unlisted_chat_is_ignored() {
        let t = FakeTransport::new();
        handler(&t, Some("HTML"))
            .handle(&text_update(1, 999, "/start"))
            .await
            .unwrap();
        assert!(t.sends().is_empty());
    }

    #[tokio::test]
    async fn unsupported_update_is_skipped() {
        let t = FakeTransport::new();
        let update = Update {
            update_id: UpdateId(3),
            payload: UpdatePayload::Unsupported {
                kind: "edited_message".to_string(),
            },
        };
        handler(&t, Some("HTML")).handle(&update).await.unwrap();
        assert!(t.sends().is_empty());
        assert!(t.gets().is_empty());
    }

    #[tokio::test]
    async fn photo_is_echoed_with_receipt() {
        let t = FakeTransport::new();
        t.reply_get(
            "getFile",
            HttpResponse::new(
                200,
                serde_json::to_vec(&serde_json::json!({
                    "ok": true,
                    "result": {"file_id": "full", "file_path": "photos/file_1.jpg"}
                }))
                .unwrap(),
            ),
        );
        t.reply_download(HttpResponse::new(200, vec![0xffu8; 2048]));
        t.reply_send(ok());

        handler(&t, Some("HTML"))
            .handle(&photo_update(4, Some("EUR/USD <1m>")))
            .await
            .unwrap();

        let gets = t.gets();
        assert_eq!(gets[0].0, "getFile");
        assert_eq!(gets[0].1, vec![("file_id".to_string(), "full".to_string())]);

        let sent = t.sends();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "sendPhoto");
        let caption = sent[0].field("caption").unwrap();
        assert!(caption.contains("1280x720, 2.0 KB"), "{caption}");
        assert!(caption.contains("EUR/USD &lt;1m&gt;"), "{caption}");
        assert_eq!(sent[0].file.as_ref().unwrap().bytes.len(), 2048);
    }

    #[tokio::test]
    async fn failed_download_is_reported_and_returned() {
        let t = FakeTransport::new();
        t.fail_get("getFile", "connection reset");
        t.reply_send(ok());

        let res = handler(&t, Some("HTML"))
            .handle(&photo_update(5, None))
            .await;

        assert!(matches!(res, Err(Error::Transport(_))));
        let sent = t.sends();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].field("text").unwrap().contains("Could not download"));
    }

    #[test]
    fn escaped_cut_never_splits_an_entity() {
        assert_eq!(escape_within("a<b", 10), "a&lt;b");
        assert_eq!(escape_within("a<<<<", 8), "a&lt;...");
        // A whole entity does not fit in the 5 bytes left before the mark.
        assert_eq!(escape_within("ab<<", 8), "ab...");
        assert_eq!(escape_within("é<x>", 9), "é&lt;...");
        assert_eq!(escape_within("<<<", 2), "");
    }

    #[tokio::test]
    async fn long_caption_is_cut_before_escaping() {
        let t = FakeTransport::new();
        t.reply_get(
            "getFile",
            HttpResponse::new(
                200,
                r#"{"ok":true,"result":{"file_id":"full","file_path":"photos/a.jpg"}}"#,
            ),
        );
        t.reply_download(HttpResponse::new(200, vec![0xffu8; 10]));
        t.reply_send(ok());
        let long = "<&>".repeat(600);

        handler(&t, Some("HTML"))
            .handle(&photo_update(6, Some(long.as_str())))
            .await
            .unwrap();

        let caption = t.sends()[0].field("caption").unwrap().to_string();
        assert!(caption.len() <= CAPTION_LIMIT, "{}", caption.len());
        assert!(caption.ends_with("..."));
        let body = caption.trim_end_matches("...");
        assert!(
            body.ends_with("&lt;") || body.ends_with("&amp;") || body.ends_with("&gt;"),
            "{body}"
        );
        assert!(caption.starts_with("<b>Received</b>"));
    }

    #[tokio::test]
    async fn long_unknown_command_stays_within_limit() {
        let t = FakeTransport::new();
        t.reply_send(ok());
        let notifier = Notifier::new(t.clone()).with_parse_mode(Some("HTML".to_string()));
        let h = RelayHandler::new(notifier, vec![CHAT], 60, Some("HTML"));
        let cmd = format!("/{}", "x&".repeat(40));

        h.handle(&text_update(1, CHAT, &cmd)).await.unwrap();

        let text = t.sends()[0].field("text").unwrap().to_string();
        assert!(text.len() <= 60, "{text}");
        assert!(text.contains("x&amp;"));
        assert!(text.ends_with("...\nTry /help"), "{text}");
    }

    #[test]
    fn tag_stripping_unescapes_entities() {
        assert_eq!(strip_tags("<b>a</b> &lt;b&gt; &amp;"), "a <b> &");
    }
}
