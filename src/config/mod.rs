mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{BrokerSettings, LogSettings, Settings};

/// Prefix for environment overrides, e.g. `HUBBUB_BROKER__CHANNEL_CAPACITY=64`.
pub const ENV_PREFIX: &str = "HUBBUB";

/// Loads the configuration from `config/default.*` (optional) and
/// `HUBBUB_*` environment variables, then fills the gaps with defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit base file name (extension is
/// resolved by the `config` crate).
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}

#[cfg(test)]
mod tests;
