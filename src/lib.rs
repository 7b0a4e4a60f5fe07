//! # PopSub Connector
//!
//! `popsub-connector` lets independent processes exchange JSON messages over
//! a best-effort publish/subscribe transport, behind a simple per-topic
//! `subscribe` / `unsubscribe` / `publish` contract.
//!
//! ## Core Modules
//!
//! - `connector`: the `Connector` itself: handler multiplexing, sender
//!   stamping, echo suppression and readiness.
//! - `transport`: the WebSocket-based PUB/SUB endpoints the connector drives.
//! - `config`: loading connector settings from files and the environment.
//! - `utils`: the shared error type and logging setup.
//!
//! ## Example
//!
//! ```no_run
//! use popsub_connector::{Connector, ConnectorSettings, handler};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), popsub_connector::ConnectorError> {
//!     let settings = ConnectorSettings::new(
//!         "tcp://127.0.0.1:3001",
//!         vec!["tcp://127.0.0.1:3002", "tcp://127.0.0.1:3003"],
//!     );
//!     let connector = Connector::new(settings)?;
//!     connector.ready().await;
//!
//!     let on_update = handler(|envelope| println!("{} sent {:?}", envelope.sender(), envelope));
//!     connector.subscribe("topic1", on_update.clone());
//!     connector.publish("topic1", &json!({ "some": "data" }));
//!     connector.unsubscribe("topic1", &on_update);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connector;
pub mod transport;
pub mod utils;

pub use config::{ConnectorSettings, Settings, SubAddress, load_config};
pub use connector::{Connector, ConnectorEvent, Envelope, Handler, handler};
pub use utils::error::{ConnectorError, Result};

/// Package name reported by `Connector::name`.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Package version reported by `Connector::version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests;
