//! Provider selection submitted by the owner

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Shortest provider key accepted
pub const MIN_KEY_LEN: usize = 10;

/// Longest model override accepted
pub const MAX_MODEL_LEN: usize = 200;

/// LLM provider the gateway is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Emergent,
    Anthropic,
    OpenAI,
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Emergent => "emergent",
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
            Provider::OpenRouter => "openrouter",
        }
    }

    /// Whether the owner must supply a key
    pub fn requires_key(&self) -> bool {
        !matches!(self, Provider::Emergent)
    }

    /// Environment variable the gateway reads the key from
    pub fn key_env(&self) -> &'static str {
        match self {
            Provider::Emergent => "EMERGENT_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "emergent" => Ok(Provider::Emergent),
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAI),
            "openrouter" => Ok(Provider::OpenRouter),
            other => Err(Error::InvalidConfig(format!(
                "Unknown provider: {}. Valid options: emergent, anthropic, openai, openrouter",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the owner asked for: provider, key and optional model override
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSelection {
    pub provider: String,
    #[serde(default, alias = "apiKey")]
    pub api_key: Option<SecretString>,
    #[serde(default, alias = "model", alias = "modelOverride")]
    pub model_override: Option<String>,
}

impl ProviderSelection {
    pub fn new(provider: impl Into<String>) -> Self {
        ProviderSelection {
            provider: provider.into(),
            api_key: None,
            model_override: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    /// Validate the selection without side effects, returning the provider
    pub fn validate(&self) -> Result<Provider> {
        let provider: Provider = self.provider.parse()?;

        match &self.api_key {
            Some(key) => validate_key(key.expose_secret())?,
            None if provider.requires_key() => {
                return Err(Error::InvalidConfig(format!(
                    "API key required for the {} provider",
                    provider
                )));
            }
            None => {}
        }

        if let Some(model) = &self.model_override {
            validate_model(model)?;
        }

        Ok(provider)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.len() < MIN_KEY_LEN {
        return Err(Error::InvalidConfig(format!(
            "API key must be at least {} characters",
            MIN_KEY_LEN
        )));
    }
    if !key.chars().all(is_safe_value_char) {
        return Err(Error::InvalidConfig(
            "API key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_model(model: &str) -> Result<()> {
    if model.is_empty() || model.len() > MAX_MODEL_LEN {
        return Err(Error::InvalidConfig(format!(
            "Model override must be 1 to {} characters",
            MAX_MODEL_LEN
        )));
    }
    let ok = model
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'));
    if !ok {
        return Err(Error::InvalidConfig(
            "Model override contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Characters allowed in secrets-file values
pub(crate) fn is_safe_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}
