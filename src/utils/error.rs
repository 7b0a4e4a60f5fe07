//! The `error` module defines the error type shared by the connector, its
//! transport and its configuration loader.
//!
//! Construction failures (`Config`, `Bind`) are returned synchronously from
//! `Connector::new`. Per-message failures (`Serialize`, `Deserialize`,
//! `HandlerPanicked`) never
//! bubble up to the caller; they are reported through the connector's event
//! channel and the offending message is dropped.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Missing or malformed construction parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// The publish endpoint could not be bound.
    #[error("failed to bind publish endpoint {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// An outbound message could not be encoded; it was not sent.
    #[error("failed to serialize message for topic '{topic}': {reason}")]
    Serialize { topic: String, reason: String },

    /// A handler panicked while a message was dispatched to it. Later
    /// handlers and messages are unaffected.
    #[error("handler for topic '{topic}' panicked")]
    HandlerPanicked { topic: String },

    /// An inbound payload was not valid JSON; it was dropped.
    #[error("message parse error on topic '{topic}': {source}")]
    Deserialize {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<config::ConfigError> for ConnectorError {
    fn from(err: config::ConfigError) -> Self {
        ConnectorError::Config(err.to_string())
    }
}
