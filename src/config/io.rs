//! Configuration I/O - Loading and saving configuration
//!
//! Layered precedence: serde defaults < config file < `CLAWHOST_*`
//! environment < legacy environment variables.

use std::path::Path;

use config::{Environment, File, FileFormat};
use secrecy::SecretString;

use super::types::Config;
use crate::error::Result;

/// Load configuration from the default path with environment overrides
pub fn load_config() -> Result<Config> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let config_path = super::paths::config_path();
    load_config_from_path(&config_path)
}

/// Load configuration from a specific path (missing file = defaults)
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let format = if path.extension().is_some_and(|ext| ext == "toml") {
        FileFormat::Toml
    } else {
        // JSON5 is a superset of JSON and tolerates comments
        FileFormat::Json5
    };

    let layered = config::Config::builder()
        .add_source(File::from(path).format(format).required(false))
        .add_source(
            Environment::with_prefix("CLAWHOST")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut config: Config = layered.try_deserialize()?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Apply legacy environment variables understood by the gateway wrapper.
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(program) = std::env::var("SUPERVISOR_GATEWAY_PROGRAM") {
        config.supervisor.program = program;
    }
    if let Ok(key) = std::env::var("EMERGENT_API_KEY") {
        if !key.is_empty() {
            config.gateway.emergent_api_key = Some(SecretString::from(key));
        }
    }
    if let Ok(url) = std::env::var("EMERGENT_BASE_URL") {
        config.gateway.emergent_base_url = url;
    }
    if let Ok(token) = std::env::var("CLAWHOST_OWNER_TOKEN") {
        if !token.is_empty() {
            config.server.owner_token = Some(SecretString::from(token));
        }
    }
    if let Ok(format) = std::env::var("LOG_FORMAT") {
        config.log.format = format;
    }
}
