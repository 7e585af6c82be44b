use async_trait::async_trait;

use crate::Result;

/// Raw HTTP reply: status plus body bytes.
///
/// Interpreting the status and the `ok` envelope is the client's job, not the transport's.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First bytes of the body as text, for log lines.
    pub fn snippet(&self, max_chars: usize) -> String {
        String::from_utf8_lossy(&self.body)
            .chars()
            .take(max_chars)
            .collect()
    }
}

/// Binary attachment for multipart uploads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Hexagonal port for the bot API's HTTP surface.
///
/// `method` is the API method name (`sendMessage`, `getUpdates`, ...); the adapter owns the
/// base URL and the credential. `Err` means the request never produced an HTTP reply
/// (DNS, connect, timeout); any reply, including a 5xx, comes back as `Ok`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, method: &str, query: &[(&str, String)]) -> Result<HttpResponse>;

    async fn post_form(&self, method: &str, fields: &[(&str, String)]) -> Result<HttpResponse>;

    async fn post_multipart(
        &self,
        method: &str,
        fields: &[(&str, String)],
        file: FilePart,
    ) -> Result<HttpResponse>;

    /// Fetch a file by the `file_path` that `getFile` returned.
    async fn download(&self, file_path: &str) -> Result<HttpResponse>;
}
