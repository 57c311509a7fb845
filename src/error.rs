//! Crate error type

use thiserror::Error;

/// Longest plain-text body carried into an error message.
pub const MAX_DETAIL_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum Error {
    /// Server answered with a non-2xx status. `detail` is the JSON `detail`
    /// field, else the plain-text body cut to [`MAX_DETAIL_CHARS`], else a
    /// generic message.
    #[error("{detail}")]
    Http { status: u16, detail: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl Error {
    pub fn http(status: u16, body: &str) -> Self {
        let body = body.trim();
        let detail = json_detail(body)
            .or_else(|| plain_detail(body))
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        Error::Http { status, detail }
    }

    /// True for failures that never reached the server (DNS, refused, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(status) => Error::http(status, ""),
            ureq::Error::Io(io) => Error::Io(io),
            other => Error::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// `{"detail": "..."}`, the shape of the API's error responses.
fn json_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let detail = value.get("detail")?.as_str()?.trim();
    (!detail.is_empty()).then(|| detail.to_string())
}

/// Plain-text body, truncated. Markup (proxy and debug error pages) is dropped.
fn plain_detail(body: &str) -> Option<String> {
    if body.is_empty() || body.starts_with('<') {
        return None;
    }
    let mut detail: String = body.chars().take(MAX_DETAIL_CHARS).collect();
    if body.chars().nth(MAX_DETAIL_CHARS).is_some() {
        detail.push('…');
    }
    Some(detail)
}
