//! `tcp://host:port` addresses for transport endpoints.

use std::fmt;
use std::str::FromStr;

use crate::utils::error::ConnectorError;

const SCHEME: &str = "tcp://";

/// A parsed transport address. A `*` host is accepted and means "all
/// interfaces" when binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Address suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        let host = if self.host == "*" { "0.0.0.0" } else { &self.host };
        format!("{host}:{}", self.port)
    }

    /// WebSocket URL a subscriber connects to.
    pub fn ws_url(&self) -> String {
        let host = if self.host == "*" { "127.0.0.1" } else { &self.host };
        format!("ws://{host}:{}", self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| ConnectorError::Config(format!("address '{s}' must start with {SCHEME}")))?;

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| ConnectorError::Config(format!("address '{s}' is missing a port")))?;

        if host.is_empty() {
            return Err(ConnectorError::Config(format!("address '{s}' is missing a host")));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| ConnectorError::Config(format!("address '{s}' has an invalid port: {e}")))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}:{}", self.host, self.port)
    }
}
