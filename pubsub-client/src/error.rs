//! Error types for the pubsub client.

use {std::time::Duration, thiserror::Error};

/// Errors raised by the duplex channel and the pubsub client.
///
/// `Clone` so a single in-flight connect can report the same outcome to
/// every caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PubsubError {
    #[error("url parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// `send` was called while the channel was not connected.
    #[error("channel is not connected")]
    NotConnected,

    /// The websocket handshake failed or the socket closed before it was ready.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// No matching reply arrived within the deadline.
    #[error("no reply received within {0:?}")]
    AckTimeout(Duration),

    /// The channel closed while a reply was still outstanding.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("unknown subscription: {0}")]
    UnknownSubscription(u64),

    /// The remote side answered a request with an error object.
    #[error("request failed with code {code}: {message}")]
    RequestFailed { code: i64, message: String },

    #[error("unexpected subscription response: {0}")]
    UnexpectedSubscriptionResponse(String),

    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),

    #[error("json parse error: {0}")]
    JsonParseError(String),
}

impl From<serde_json::Error> for PubsubError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParseError(err.to_string())
    }
}

/// Convenience result type for pubsub operations.
pub type Result<T> = std::result::Result<T, PubsubError>;
