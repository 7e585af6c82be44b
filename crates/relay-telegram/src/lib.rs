//! Telegram adapter (reqwest).
//!
//! This crate implements the `relay-core` HttpTransport port over the Telegram Bot API.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use relay_core::{
    config::Config,
    domain::BotToken,
    errors::Error,
    messaging::port::{FilePart, HttpResponse, HttpTransport},
    Result,
};

#[derive(Clone, Debug)]
pub struct TelegramTransport {
    http: reqwest::Client,
    api_base: String,
    token: BotToken,
}

impl TelegramTransport {
    pub fn new(api_base: impl Into<String>, token: BotToken, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.api_base.clone(), cfg.bot_token.clone(), cfg.http_timeout)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose(), method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_base,
            self.token.expose(),
            file_path.trim_start_matches('/')
        )
    }

    /// Request URLs embed the token, so errors are stripped of them before they reach a log.
    fn map_err(e: reqwest::Error) -> Error {
        Error::Transport(format!("telegram request error: {}", e.without_url()))
    }

    async fn finish(method: &str, resp: reqwest::Response) -> Result<HttpResponse> {
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(Self::map_err)?;
        trace!(method, status, bytes = body.len(), "telegram reply");
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl HttpTransport for TelegramTransport {
    async fn get(&self, method: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        let resp = self
            .http
            .get(self.method_url(method))
            .query(query)
            .send()
            .await
            .map_err(Self::map_err)?;
        Self::finish(method, resp).await
    }

    async fn post_form(&self, method: &str, fields: &[(&str, String)]) -> Result<HttpResponse> {
        let resp = self
            .http
            .post(self.method_url(method))
            .form(fields)
            .send()
            .await
            .map_err(Self::map_err)?;
        Self::finish(method, resp).await
    }

    async fn post_multipart(
        &self,
        method: &str,
        fields: &[(&str, String)],
        file: FilePart,
    ) -> Result<HttpResponse> {
        let mut form = reqwest::multipart::Form::new();
        for (k, v) in fields {
            form = form.text(k.to_string(), v.clone());
        }
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.mime)
            .map_err(|e| Error::InvalidArgument(format!("bad attachment mime: {e}")))?;
        form = form.part(file.field, part);

        let resp = self
            .http
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_err)?;
        Self::finish(method, resp).await
    }

    async fn download(&self, file_path: &str) -> Result<HttpResponse> {
        let resp = self
            .http
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(Self::map_err)?;
        Self::finish("download", resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> TelegramTransport {
        TelegramTransport::new(
            base,
            BotToken::parse("123456:TopSecret").unwrap(),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn builds_method_and_file_urls() {
        let t = transport("https://api.telegram.org/");
        assert_eq!(
            t.method_url("sendMessage"),
            "https://api.telegram.org/bot123456:TopSecret/sendMessage"
        );
        assert_eq!(
            t.file_url("/photos/file_1.jpg"),
            "https://api.telegram.org/file/bot123456:TopSecret/photos/file_1.jpg"
        );
    }

    #[test]
    fn debug_does_not_leak_token() {
        let t = transport("https://api.telegram.org");
        assert!(!format!("{t:?}").contains("TopSecret"));
    }

    #[tokio::test]
    async fn connection_failure_is_a_transport_error_without_token() {
        // Port 9 (discard) is closed on any sane test host.
        let t = transport("http://127.0.0.1:9");
        match t.get("getUpdates", &[("offset", "1".to_string())]).await {
            Err(Error::Transport(msg)) => assert!(!msg.contains("TopSecret"), "{msg}"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
