//! Gateway configuration document and environment secrets

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::selection::{is_safe_value_char, Provider};
use crate::error::{Error, Result};

/// Environment variable carrying the gateway token
pub const TOKEN_ENV: &str = "CLAWDBOT_GATEWAY_TOKEN";

/// Singleton document describing how the gateway runs.
///
/// Holds no provider keys; only a SHA-256 fingerprint so a key change can
/// be detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub provider: Provider,
    /// Primary model slug, e.g. `openai/gpt-5.2`
    pub model: String,
    #[serde(default)]
    pub model_override: Option<String>,
    #[serde(default)]
    pub key_fingerprint: Option<String>,
    pub port: u16,
    pub control_port: u16,
    pub workspace: PathBuf,
    /// Bearer credential for the gateway control channel
    pub token: String,
    /// Whether the gateway should be relaunched when the host boots
    #[serde(default)]
    pub should_run: bool,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl GatewayConfig {
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Secrets handed to the gateway through its environment file
#[derive(Clone, Default)]
pub struct GatewaySecrets {
    entries: Vec<(String, SecretString)>,
}

impl GatewaySecrets {
    /// Secrets carrying only the gateway token
    pub fn with_token(token: &str) -> Result<Self> {
        let mut secrets = GatewaySecrets::default();
        secrets.insert(TOKEN_ENV, token)?;
        Ok(secrets)
    }

    /// Add or replace an entry; keys and values are checked so the file
    /// can never carry anything a shell would evaluate.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<()> {
        validate_env_key(key)?;
        if value.is_empty() || !value.chars().all(is_safe_value_char) {
            return Err(Error::InvalidConfig(format!(
                "Value for {} contains unsafe characters",
                key
            )));
        }

        let secret = SecretString::from(value.to_string());
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = secret,
            None => self.entries.push((key.to_string(), secret)),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.get(TOKEN_ENV)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `KEY=value` lines, newline terminated
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value.expose_secret());
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Debug for GatewaySecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySecrets")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn validate_env_key(key: &str) -> Result<()> {
    let mut chars = key.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_uppercase() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_') {
        return Err(Error::InvalidConfig(format!(
            "Invalid environment variable name: {:?}",
            key
        )));
    }
    Ok(())
}
