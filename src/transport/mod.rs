//! The `transport` module is the raw publish/subscribe layer the connector is
//! built on. It mirrors the PUB/SUB socket pair of classic messaging
//! middleware over WebSockets:
//!
//! - a `Publisher` binds one local address and broadcasts topic frames to
//!   every connected subscriber whose prefix filters match the topic;
//! - a `Subscriber` connects to any number of publishers, keeps its filter set
//!   in sync with each of them, reconnects when a peer goes away, and funnels
//!   every received frame into a single inbound channel.
//!
//! Delivery is best-effort: frames sent while a peer is disconnected are lost
//! and there is no ordering across publishers.

pub mod endpoint;
pub mod message;
pub mod publisher;
pub mod subscriber;

pub use endpoint::Endpoint;
pub use message::{PublisherMessage, SubscriberMessage};
pub use publisher::Publisher;
pub use subscriber::{InboundFrame, Subscriber};

/// Prefix matching used on both sides of the connection.
pub(crate) fn matches_filter<'a>(mut filters: impl Iterator<Item = &'a String>, topic: &str) -> bool {
    filters.any(|filter| topic.starts_with(filter.as_str()))
}
