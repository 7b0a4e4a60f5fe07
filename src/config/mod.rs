mod settings;

use crate::config::settings::PartialSettings;
use crate::utils::error::{ConnectorError, Result};
use config::{Config, Environment, File};

pub use settings::{ConnectorSettings, LoggingSettings, Settings, SubAddress};

/// Environment variables look like `POPSUB__CONNECTOR__PUB_ADDRESS`.
const ENV_PREFIX: &str = "POPSUB";

/// Loads the configuration from `config/default` and environment variables.
pub fn load_config() -> Result<Settings> {
    load_config_from("config/default")
}

/// Loads the configuration from the given file (extension optional, the file
/// itself is optional) layered under environment variables, then merges the
/// result with default values.
pub fn load_config_from(path: &str) -> Result<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("connector.sub_address")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default_logging = LoggingSettings::default();

    let connector = partial
        .connector
        .ok_or_else(|| ConnectorError::Config("missing [connector] section".to_string()))?;

    Ok(Settings {
        connector: ConnectorSettings {
            server_name: connector.server_name,
            pub_address: connector
                .pub_address
                .ok_or_else(|| ConnectorError::Config("missing connector.pub_address".to_string()))?,
            sub_address: connector
                .sub_address
                .ok_or_else(|| ConnectorError::Config("missing connector.sub_address".to_string()))?,
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .and_then(|l| l.level)
                .unwrap_or(default_logging.level),
        },
    })
}

#[cfg(test)]
mod tests;
