//! Control and data messages exchanged between a `Subscriber` and the
//! `Publisher` endpoints it is connected to. Every message travels as one
//! WebSocket text frame holding tagged JSON.

use serde::{Deserialize, Serialize};

/// Sent by a subscribing socket to each publisher it is connected to.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum SubscriberMessage {
    #[serde(rename = "subscribe")]
    Subscribe { topic: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },
}

/// Sent by a publishing socket to every connected subscriber whose filters
/// match the topic. `payload` is opaque text to the transport.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum PublisherMessage {
    #[serde(rename = "frame")]
    Frame { topic: String, payload: String },
}
