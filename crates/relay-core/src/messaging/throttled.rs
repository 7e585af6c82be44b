use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    messaging::port::{FilePart, HttpResponse, HttpTransport},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound sends (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between sends to the same chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// HttpTransport decorator that spaces out outbound sends.
///
/// Reads (`get`, `download`) pass straight through so a long-poll never waits on a send slot.
/// Sends are keyed per chat by their `chat_id` field; sends without one get global spacing only.
pub struct ThrottledTransport {
    inner: Arc<dyn HttpTransport>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<String, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: &str) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_send(&self, fields: &[(&str, String)]) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = match chat_field(fields) {
            Some(chat_id) => {
                let lim = self.limiter_for_chat(chat_id).await;
                let mut guard = lim.lock().await;
                guard.reserve()
            }
            None => Duration::ZERO,
        };

        let wait = global_wait.max(chat_wait);
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

fn chat_field<'a>(fields: &'a [(&str, String)]) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| *k == "chat_id")
        .map(|(_, v)| v.as_str())
}

#[async_trait::async_trait]
impl HttpTransport for ThrottledTransport {
    async fn get(&self, method: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        self.inner.get(method, query).await
    }

    async fn post_form(&self, method: &str, fields: &[(&str, String)]) -> Result<HttpResponse> {
        self.throttle_send(fields).await;
        self.inner.post_form(method, fields).await
    }

    async fn post_multipart(
        &self,
        method: &str,
        fields: &[(&str, String)],
        file: FilePart,
    ) -> Result<HttpResponse> {
        self.throttle_send(fields).await;
        self.inner.post_multipart(method, fields, file).await
    }

    async fn download(&self, file_path: &str) -> Result<HttpResponse> {
        self.inner.download(file_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<(String, Instant)>>,
    }

    impl Recorder {
        fn record(&self, what: &str) -> Result<HttpResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((what.to_string(), Instant::now()));
            Ok(HttpResponse::new(200, br#"{"ok":true,"result":true}"#.to_vec()))
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for Recorder {
        async fn get(&self, method: &str, _q: &[(&str, String)]) -> Result<HttpResponse> {
            self.record(method)
        }
        async fn post_form(&self, method: &str, _f: &[(&str, String)]) -> Result<HttpResponse> {
            self.record(method)
        }
        async fn post_multipart(
            &self,
            method: &str,
            _f: &[(&str, String)],
            _file: FilePart,
        ) -> Result<HttpResponse> {
            self.record(method)
        }
        async fn download(&self, file_path: &str) -> Result<HttpResponse> {
            self.record(file_path)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_chat_sends_are_spaced() {
        let rec = Arc::new(Recorder::default());
        let t = ThrottledTransport::new(rec.clone(), ThrottleConfig::default());
        let fields = [("chat_id", "1".to_string()), ("text", "a".to_string())];

        let start = Instant::now();
        t.post_form("sendMessage", &fields).await.unwrap();
        t.post_form("sendMessage", &fields).await.unwrap();

        let calls = rec.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1 - start >= Duration::from_millis(1050));
    }

    #[tokio::test(start_paused = true)]
    async fn reads_are_not_throttled() {
        let rec = Arc::new(Recorder::default());
        let t = ThrottledTransport::new(rec.clone(), ThrottleConfig::default());
        let fields = [("chat_id", "1".to_string())];

        let start = Instant::now();
        t.post_form("sendMessage", &fields).await.unwrap();
        t.get("getUpdates", &[]).await.unwrap();
        t.download("photos/file_1.jpg").await.unwrap();

        let calls = rec.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].1, start);
    }

    #[test]
    fn finds_chat_field() {
        let fields = [("text", "x".to_string()), ("chat_id", "42".to_string())];
        assert_eq!(chat_field(&fields), Some("42"));
        assert_eq!(chat_field(&[]), None);
    }
}
