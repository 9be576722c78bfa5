//! ConfigBuilder - turns a provider selection into a gateway document
//!
//! Pure: reads nothing from disk and writes nothing. The controller
//! persists the returned document and hands the secrets to
//! [`SecretWriter`](super::SecretWriter).

use chrono::Utc;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::fields;
use super::selection::{Provider, ProviderSelection};
use super::types::{GatewayConfig, GatewaySecrets};
use crate::config::GatewaySettings;
use crate::error::Result;

/// Result of a build
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub config: GatewayConfig,
    pub secrets: GatewaySecrets,
    pub token_changed: bool,
}

/// Builds gateway documents for a fixed set of host settings
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    settings: GatewaySettings,
}

impl ConfigBuilder {
    pub fn new(settings: GatewaySettings) -> Self {
        ConfigBuilder { settings }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Compute the new document and secrets.
    ///
    /// The token of `current` is carried forward when every differing field
    /// is non-critical; otherwise a fresh token is generated.
    pub fn build(
        &self,
        current: Option<&GatewayConfig>,
        request: &ProviderSelection,
    ) -> Result<BuildOutcome> {
        let provider = request.validate()?;

        let key = request
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .or_else(|| {
                (provider == Provider::Emergent)
                    .then(|| {
                        self.settings
                            .emergent_api_key
                            .as_ref()
                            .map(|k| k.expose_secret().to_string())
                    })
                    .flatten()
            });

        let mut config = GatewayConfig {
            provider,
            model: resolve_model(provider, request.model_override.as_deref()),
            model_override: request.model_override.clone(),
            key_fingerprint: key.as_deref().map(fingerprint),
            port: self.settings.port,
            control_port: self.settings.control_port,
            workspace: self.settings.workspace_dir.clone(),
            token: String::new(),
            should_run: true,
            started_at: current.and_then(|c| c.started_at),
            updated_at: Utc::now(),
        };

        let reusable = current
            .filter(|c| c.has_token())
            .filter(|c| !fields::requires_rotation(c, &config));

        let token_changed = match reusable {
            Some(previous) => {
                config.token = previous.token.clone();
                false
            }
            None => {
                config.token = generate_token();
                true
            }
        };

        debug!(
            provider = %provider,
            model = %config.model,
            token_changed,
            "Built gateway configuration"
        );

        let mut secrets = GatewaySecrets::with_token(&config.token)?;
        if let Some(key) = &key {
            secrets.insert(provider.key_env(), key)?;
        }

        Ok(BuildOutcome {
            config,
            secrets,
            token_changed,
        })
    }
}

/// Primary model slug for a provider
pub fn resolve_model(provider: Provider, model_override: Option<&str>) -> String {
    match (provider, model_override) {
        (Provider::OpenRouter, override_) => {
            let slug = override_.unwrap_or("auto");
            let id = slug.strip_prefix("openrouter/").unwrap_or(slug);
            format!("openrouter/{}", id)
        }
        (_, Some(model)) if model.contains('/') => model.to_string(),
        (Provider::Emergent, Some(model)) => format!("emergent-claude/{}", model),
        (_, Some(model)) => format!("{}/{}", provider, model),
        (Provider::Emergent, None) => "emergent-claude/claude-sonnet-4-5".to_string(),
        (Provider::OpenAI, None) => "openai/gpt-5.2".to_string(),
        (Provider::Anthropic, None) => "anthropic/claude-opus-4-5-20251101".to_string(),
    }
}

/// 32 random bytes, hex encoded
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// SHA-256 of a provider key, hex encoded
pub fn fingerprint(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
