//! The `connector` module is the application-facing side of the crate.
//!
//! It multiplexes any number of local topic handlers onto one transport
//! subscription per topic, stamps outgoing messages with a sender identity,
//! and filters out malformed payloads and echoes of its own publications.

pub mod engine;
pub mod envelope;
pub mod registry;

pub use engine::{Connector, ConnectorEvent};
pub use envelope::{Envelope, SENDER_FIELD};
pub use registry::{Handler, TopicRegistry, handler};
