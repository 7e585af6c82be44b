//! Bot API JSON shapes and their mapping onto the relay's message model.

use serde::Deserialize;
use tracing::warn;

use crate::{
    domain::{ChatId, MessageId, UpdateId},
    errors::Error,
    messaging::types::{
        BotIdentity, PhotoMessage, PhotoSize, Sender, TextMessage, Update, UpdatePayload,
    },
    Result,
};

/// `{ ok, result?, description?, error_code? }` envelope shared by every method.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<u16>,
}

impl<T> ApiEnvelope<T> {
    /// Collapse the envelope into a value, or a rejection carrying the remote's reason.
    pub fn into_result(self, status: u16) -> Result<T> {
        if !self.ok {
            return Err(Error::Rejected {
                status: self.error_code.unwrap_or(status),
                description: self
                    .description
                    .unwrap_or_else(|| "ok=false without description".to_string()),
            });
        }
        self.result.ok_or_else(|| Error::Decode("ok=true but no result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct RawUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<RawMessage>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub message_id: i64,
    pub chat: RawChat,
    #[serde(default)]
    pub from: Option<RawUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<RawPhotoSize>>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RawUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RawPhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawFile {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

impl From<RawUser> for Sender {
    fn from(u: RawUser) -> Self {
        Self {
            id: u.id,
            username: u.username,
            first_name: u.first_name,
        }
    }
}

impl From<RawUser> for BotIdentity {
    fn from(u: RawUser) -> Self {
        Self {
            id: u.id,
            username: u.username,
            first_name: u.first_name,
        }
    }
}

impl From<RawUpdate> for Update {
    fn from(raw: RawUpdate) -> Self {
        let update_id = UpdateId(raw.update_id);
        let payload = match raw.message {
            Some(msg) => message_payload(msg),
            None => UpdatePayload::Unsupported {
                kind: raw
                    .rest
                    .keys()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| "empty".to_string()),
            },
        };
        Update { update_id, payload }
    }
}

fn message_payload(msg: RawMessage) -> UpdatePayload {
    let chat_id = ChatId(msg.chat.id);
    let message_id = MessageId(msg.message_id);
    let from = msg.from.map(Sender::from);

    if let Some(sizes) = msg.photo.filter(|s| !s.is_empty()) {
        return UpdatePayload::Photo(PhotoMessage {
            chat_id,
            message_id,
            from,
            sizes: sizes
                .into_iter()
                .map(|p| PhotoSize {
                    file_id: p.file_id,
                    width: p.width,
                    height: p.height,
                    file_size: p.file_size,
                })
                .collect(),
            caption: msg.caption,
        });
    }

    match msg.text {
        Some(text) => UpdatePayload::Text(TextMessage {
            chat_id,
            message_id,
            from,
            text,
        }),
        None => UpdatePayload::Unsupported {
            kind: "message".to_string(),
        },
    }
}

/// Decode a `getUpdates` response body.
///
/// Elements are decoded one by one. An element that still carries an `update_id`
/// but whose shape is unexpected becomes `Unsupported { kind: "undecodable" }`, so the
/// cursor can move past it; one without an id cannot be acknowledged and is dropped.
pub fn decode_updates(status: u16, body: &[u8]) -> Result<Vec<Update>> {
    let env: ApiEnvelope<Vec<serde_json::Value>> =
        serde_json::from_slice(body).map_err(|e| Error::Decode(format!("getUpdates: {e}")))?;
    Ok(env
        .into_result(status)?
        .into_iter()
        .filter_map(decode_update)
        .collect())
}

fn decode_update(value: serde_json::Value) -> Option<Update> {
    let update_id = value.get("update_id").and_then(serde_json::Value::as_i64);
    match serde_json::from_value::<RawUpdate>(value) {
        Ok(raw) => Some(Update::from(raw)),
        Err(e) => match update_id {
            Some(id) => {
                warn!(update_id = id, error = %e, "undecodable update");
                Some(Update {
                    update_id: UpdateId(id),
                    payload: UpdatePayload::Unsupported {
                        kind: "undecodable".to_string(),
                    },
                })
            }
            None => {
                warn!(error = %e, "dropping update without an id");
                None
            }
        },
    }
}
