use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes the connector addressing and the logging level.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub connector: ConnectorSettings,
    pub logging: LoggingSettings,
}

/// Construction parameters for a `Connector`.
///
/// `pub_address` is the local address the publish endpoint binds to and
/// `sub_address` lists the peers the subscribe endpoint connects to. Both use
/// the `tcp://host:port` form. `server_name`, when set, becomes the sender
/// identity stamped on every outgoing message.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConnectorSettings {
    #[serde(default)]
    pub server_name: Option<String>,
    pub pub_address: String,
    pub sub_address: SubAddress,
}

impl ConnectorSettings {
    pub fn new(pub_address: impl Into<String>, sub_address: impl Into<SubAddress>) -> Self {
        Self {
            server_name: None,
            pub_address: pub_address.into(),
            sub_address: sub_address.into(),
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// One peer address or a list of them.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SubAddress {
    One(String),
    Many(Vec<String>),
}

impl SubAddress {
    pub fn addresses(&self) -> Vec<&str> {
        match self {
            SubAddress::One(addr) => vec![addr.as_str()],
            SubAddress::Many(addrs) => addrs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for SubAddress {
    fn from(addr: &str) -> Self {
        SubAddress::One(addr.to_string())
    }
}

impl From<String> for SubAddress {
    fn from(addr: String) -> Self {
        SubAddress::One(addr)
    }
}

impl From<Vec<String>> for SubAddress {
    fn from(addrs: Vec<String>) -> Self {
        SubAddress::Many(addrs)
    }
}

impl From<Vec<&str>> for SubAddress {
    fn from(addrs: Vec<&str>) -> Self {
        SubAddress::Many(addrs.into_iter().map(str::to_string).collect())
    }
}

/// Logging configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing logging values are
/// filled from defaults; missing connector addresses are an error.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub connector: Option<PartialConnectorSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialConnectorSettings {
    pub server_name: Option<String>,
    pub pub_address: Option<String>,
    pub sub_address: Option<SubAddress>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}
