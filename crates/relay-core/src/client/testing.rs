//! In-memory transport for unit tests.
//!
//! Acts as a tiny bot API server: a backlog of updates answered by offset, plus scripted
//! replies for everything else.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::json;

use crate::{
    errors::Error,
    messaging::port::{FilePart, HttpResponse, HttpTransport},
    Result,
};

#[derive(Clone, Debug)]
pub struct SentRequest {
    pub method: String,
    pub fields: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

impl SentRequest {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
pub struct FakeTransport {
    backlog: Mutex<Vec<serde_json::Value>>,
    get_replies: Mutex<HashMap<String, VecDeque<Result<HttpResponse>>>>,
    send_replies: Mutex<VecDeque<Result<HttpResponse>>>,
    download_replies: Mutex<VecDeque<Result<HttpResponse>>>,
    gets: Mutex<Vec<(String, Vec<(String, String)>)>>,
    sends: Mutex<Vec<SentRequest>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a text update on the "server".
    pub fn push_text(&self, update_id: i64, chat_id: i64, text: &str) {
        self.backlog.lock().unwrap().push(json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "chat": {"id": chat_id, "type": "private"},
                "from": {"id": chat_id, "is_bot": false, "first_name": "Tester"},
                "date": 0,
                "text": text
            }
        }));
    }

    /// Queue a photo update on the "server".
    pub fn push_photo(&self, update_id: i64, chat_id: i64, file_id: &str, caption: Option<&str>) {
        self.backlog.lock().unwrap().push(json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "chat": {"id": chat_id},
                "date": 0,
                "photo": [
                    {"file_id": format!("{file_id}-thumb"), "width": 90, "height": 60, "file_size": 900},
                    {"file_id": file_id, "width": 1280, "height": 720, "file_size": 64000}
                ],
                "caption": caption
            }
        }));
    }

    pub fn push_raw(&self, update: serde_json::Value) {
        self.backlog.lock().unwrap().push(update);
    }

    pub fn reply_get(&self, method: &str, resp: HttpResponse) {
        self.get_replies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(Ok(resp));
    }

    pub fn fail_get(&self, method: &str, reason: &str) {
        self.get_replies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(Err(Error::Transport(reason.to_string())));
    }

    pub fn reply_send(&self, resp: HttpResponse) {
        self.send_replies.lock().unwrap().push_back(Ok(resp));
    }

    pub fn fail_send(&self, reason: &str) {
        self.send_replies
            .lock()
            .unwrap()
            .push_back(Err(Error::Transport(reason.to_string())));
    }

    pub fn reply_download(&self, resp: HttpResponse) {
        self.download_replies.lock().unwrap().push_back(Ok(resp));
    }

    pub fn sends(&self) -> Vec<SentRequest> {
        self.sends.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.gets.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    /// `offset` values sent with each `getUpdates` call, in order.
    pub fn poll_offsets(&self) -> Vec<i64> {
        self.gets()
            .into_iter()
            .filter(|(m, _)| m == "getUpdates")
            .filter_map(|(_, q)| {
                q.into_iter()
                    .find(|(k, _)| k == "offset")
                    .and_then(|(_, v)| v.parse().ok())
            })
            .collect()
    }

    fn answer_updates(&self, query: &[(&str, String)]) -> HttpResponse {
        let offset: i64 = query
            .iter()
            .find(|(k, _)| *k == "offset")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);
        let result: Vec<serde_json::Value> = self
            .backlog
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u["update_id"].as_i64().unwrap_or(0) >= offset)
            .cloned()
            .collect();
        HttpResponse::new(
            200,
            serde_json::to_vec(&json!({"ok": true, "result": result})).unwrap(),
        )
    }

    fn owned(pairs: &[(&str, String)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn next_send(&self) -> Result<HttpResponse> {
        self.send_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport("no scripted send reply".to_string())))
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, method: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        self.gets
            .lock()
            .unwrap()
            .push((method.to_string(), Self::owned(query)));

        let scripted = self
            .get_replies
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(|q| q.pop_front());
        match scripted {
            Some(reply) => reply,
            None if method == "getUpdates" => Ok(self.answer_updates(query)),
            None => Err(Error::Transport(format!("no scripted reply for {method}"))),
        }
    }

    async fn post_form(&self, method: &str, fields: &[(&str, String)]) -> Result<HttpResponse> {
        self.sends.lock().unwrap().push(SentRequest {
            method: method.to_string(),
            fields: Self::owned(fields),
            file: None,
        });
        self.next_send()
    }

    async fn post_multipart(
        &self,
        method: &str,
        fields: &[(&str, String)],
        file: FilePart,
    ) -> Result<HttpResponse> {
        self.sends.lock().unwrap().push(SentRequest {
            method: method.to_string(),
            fields: Self::owned(fields),
            file: Some(file),
        });
        self.next_send()
    }

    async fn download(&self, file_path: &str) -> Result<HttpResponse> {
        self.downloads.lock().unwrap().push(file_path.to_string());
        self.download_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport("no scripted download".to_string())))
    }
}
