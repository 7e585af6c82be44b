/// Core error type for the relay.
///
/// Only `InvalidArgument` escapes the boolean-returning send paths; it marks a
/// caller bug. `Transport` and `Rejected` are recovered locally there (logged,
/// then reported as `false` / an empty batch). The `try_send_*` paths return them
/// as-is so retry can tell a transient outage from a permanent refusal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote rejected request (status {status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for failures a caller may reasonably retry later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
