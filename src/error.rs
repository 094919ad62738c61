//! Crate-level error types.
//!
//! [`HelixError`] covers the REST client, configuration loading and frame
//! decoding. [`TransportError`] is the narrower error a WebSocket session
//! reports; the monitor logs it and never hands it to the caller.

use thiserror::Error;

/// Errors returned by [`HelixClient`](crate::client::HelixClient) and the
/// configuration layer.
///
/// Each variant carries enough context to diagnose the failure without
/// needing to inspect the originating error directly.
#[derive(Debug, Error)]
pub enum HelixError {
    /// The remote server replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Response body could not be parsed as the expected JSON structure.
    #[error("JSON parse error on field '{field}': {detail}")]
    Json { field: String, detail: String },

    /// A TCP-level connection could not be established.
    #[error("Connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// An inbound WebSocket frame was not valid JSON.
    #[error("could not decode frame: {0}")]
    Decode(String),

    /// Configuration was missing, malformed or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for HelixError {
    fn from(e: serde_json::Error) -> Self {
        HelixError::Decode(e.to_string())
    }
}

impl From<toml::de::Error> for HelixError {
    fn from(e: toml::de::Error) -> Self {
        HelixError::Config(e.to_string())
    }
}

/// Failures reported by a [`Transport`](crate::monitor::Transport) session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The session already finished; there is nothing left to close.
    #[error("session already closed")]
    AlreadyClosed,

    /// The WebSocket handshake or the underlying socket failed.
    #[error("transport failure: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, HelixError>;
