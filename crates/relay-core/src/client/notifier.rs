use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    domain::RecipientId,
    errors::Error,
    messaging::{
        port::{FilePart, HttpResponse, HttpTransport},
        types::{BotIdentity, NotificationBody, OutboundNotification},
        wire::{ApiEnvelope, RawFile, RawUser},
    },
    Result,
};

/// Send side of the client.
///
/// Cheap to clone; handlers keep one so they can reply while the poll loop owns the cursor.
/// Ordinary failures (network, non-2xx, `ok=false`) come back as `Ok(false)` after a log line.
/// Nothing here retries.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn HttpTransport>,
    parse_mode: Option<String>,
    disable_preview: bool,
}

impl Notifier {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            parse_mode: None,
            disable_preview: false,
        }
    }

    pub fn with_parse_mode(mut self, parse_mode: Option<String>) -> Self {
        self.parse_mode = parse_mode;
        self
    }

    /// Ask Telegram not to expand link previews in text messages.
    pub fn with_link_previews_disabled(mut self, disabled: bool) -> Self {
        self.disable_preview = disabled;
        self
    }

    pub(crate) fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Send a text message. `Err` only for an empty `text`.
    pub async fn send_text(&self, recipient: &RecipientId, text: &str) -> Result<bool> {
        match self.try_send_text(recipient, text).await {
            Err(e @ Error::InvalidArgument(_)) => Err(e),
            outcome => Ok(report("sendMessage", recipient, outcome)),
        }
    }

    /// Like [`send_text`](Self::send_text) but keeps the failure, so callers can tell a
    /// transient outage from a permanent refusal (see [`Error::is_retryable`]).
    pub async fn try_send_text(&self, recipient: &RecipientId, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::InvalidArgument("message text is empty".to_string()));
        }

        let mut fields = vec![
            ("chat_id", recipient.to_string()),
            ("text", text.to_string()),
        ];
        if let Some(mode) = &self.parse_mode {
            fields.push(("parse_mode", mode.clone()));
        }
        if self.disable_preview {
            fields.push(("disable_web_page_preview", "true".to_string()));
        }

        let resp = self.transport.post_form("sendMessage", &fields).await?;
        interpret::<serde_json::Value>("sendMessage", resp).map(|_| ())
    }

    /// Upload a photo as multipart form data. A 0-byte blob is refused with `Ok(false)`.
    pub async fn send_photo(
        &self,
        recipient: &RecipientId,
        blob: &[u8],
        caption: Option<&str>,
    ) -> Result<bool> {
        if blob.is_empty() {
            warn!(%recipient, "refusing to send an empty photo");
            return Ok(false);
        }
        let outcome = self.try_send_photo(recipient, blob, caption).await;
        Ok(report("sendPhoto", recipient, outcome))
    }

    /// Classified form of [`send_photo`](Self::send_photo); an empty blob is `InvalidArgument`.
    pub async fn try_send_photo(
        &self,
        recipient: &RecipientId,
        blob: &[u8],
        caption: Option<&str>,
    ) -> Result<()> {
        if blob.is_empty() {
            return Err(Error::InvalidArgument("photo is empty".to_string()));
        }

        let mut fields = vec![("chat_id", recipient.to_string())];
        if let Some(c) = caption.filter(|c| !c.trim().is_empty()) {
            fields.push(("caption", c.to_string()));
            if let Some(mode) = &self.parse_mode {
                fields.push(("parse_mode", mode.clone()));
            }
        }

        let mime = sniff_image_mime(blob);
        let file = FilePart {
            field: "photo".to_string(),
            file_name: format!("photo.{}", mime.extension),
            mime: mime.mime.to_string(),
            bytes: blob.to_vec(),
        };

        let resp = self
            .transport
            .post_multipart("sendPhoto", &fields, file)
            .await?;
        interpret::<serde_json::Value>("sendPhoto", resp).map(|_| ())
    }

    pub async fn send(&self, notification: &OutboundNotification) -> Result<bool> {
        match &notification.body {
            NotificationBody::Text(text) => self.send_text(&notification.recipient, text).await,
            NotificationBody::Photo { blob, caption } => {
                self.send_photo(&notification.recipient, blob, caption.as_deref())
                    .await
            }
        }
    }

    /// Check the credential and return the bot's own account.
    pub async fn get_me(&self) -> Result<BotIdentity> {
        let resp = self.transport.get("getMe", &[]).await?;
        let user: RawUser = interpret("getMe", resp)?;
        Ok(user.into())
    }

    /// Resolve a `file_id` through `getFile` and fetch the bytes.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        if file_id.trim().is_empty() {
            return Err(Error::InvalidArgument("file id is empty".to_string()));
        }
        let resp = self
            .transport
            .get("getFile", &[("file_id", file_id.to_string())])
            .await?;
        let file: RawFile = interpret("getFile", resp)?;
        let path = file.file_path.ok_or_else(|| Error::Rejected {
            status: 200,
            description: format!("file {} has no download path", file.file_id),
        })?;

        let resp = self.transport.download(&path).await?;
        if !resp.is_success() {
            return Err(Error::Rejected {
                status: resp.status,
                description: format!("download of {path} failed: {}", resp.snippet(120)),
            });
        }
        Ok(resp.body)
    }
}

/// Turn a raw reply into the method's `result`, or a typed failure.
pub(crate) fn interpret<T: DeserializeOwned>(method: &str, resp: HttpResponse) -> Result<T> {
    let parsed = serde_json::from_slice::<ApiEnvelope<T>>(&resp.body);

    if !resp.is_success() {
        // Telegram usually explains a 4xx/5xx in the body; fall back to the raw text if not.
        let description = match &parsed {
            Ok(env) => env.description.clone(),
            Err(_) => None,
        }
        .unwrap_or_else(|| resp.snippet(200));
        return Err(Error::Rejected {
            status: resp.status,
            description,
        });
    }

    parsed
        .map_err(|e| Error::Decode(format!("{method}: {e}")))?
        .into_result(resp.status)
}

fn report(method: &str, recipient: &RecipientId, outcome: Result<()>) -> bool {
    match outcome {
        Ok(()) => {
            debug!(method, %recipient, "delivered");
            true
        }
        Err(e @ Error::Transport(_)) => {
            warn!(method, %recipient, error = %e, "send failed: transport");
            false
        }
        Err(e) => {
            warn!(method, %recipient, error = %e, "send failed: rejected");
            false
        }
    }
}

struct ImageMime {
    mime: &'static str,
    extension: &'static str,
}

fn sniff_image_mime(blob: &[u8]) -> ImageMime {
    if blob.starts_with(&[0x89, b'P', b'N', b'G']) {
        ImageMime {
            mime: "image/png",
            extension: "png",
        }
    } else if blob.starts_with(b"GIF8") {
        ImageMime {
            mime: "image/gif",
            extension: "gif",
        }
    } else if blob.len() >= 12 && &blob[..4] == b"RIFF" && &blob[8..12] == b"WEBP" {
        ImageMime {
            mime: "image/webp",
            extension: "webp",
        }
    } else {
        ImageMime {
            mime: "image/jpeg",
            extension: "jpg",
        }
    }
}
