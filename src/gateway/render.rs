//! Gateway-side configuration file
//!
//! The gateway process reads its own JSON config at startup. Only the
//! sections this host owns are replaced; anything else the owner or the
//! gateway put there is preserved. Provider keys are referenced through
//! environment variables, never written inline.

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::secrets::write_private_atomic;
use super::selection::Provider;
use super::types::GatewayConfig;
use crate::error::{Error, Result};

/// Writes the gateway's own config file
#[derive(Debug, Clone)]
pub struct GatewayFileWriter {
    path: PathBuf,
    emergent_base_url: String,
}

impl GatewayFileWriter {
    pub fn new(path: impl Into<PathBuf>, emergent_base_url: impl Into<String>) -> Self {
        GatewayFileWriter {
            path: path.into(),
            emergent_base_url: emergent_base_url.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge `config` into the existing file (if any) and write it back
    pub fn write(&self, config: &GatewayConfig) -> Result<()> {
        let existing = match std::fs::read(&self.path) {
            Ok(raw) => serde_json::from_slice::<Value>(&raw).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), "Replacing unreadable gateway config: {}", e);
                Value::Object(Map::new())
            }),
            Err(_) => Value::Object(Map::new()),
        };

        let merged = render(existing, config, &self.emergent_base_url);
        let bytes = serde_json::to_vec_pretty(&merged)?;
        write_private_atomic(&self.path, &bytes).map_err(|e| {
            Error::Internal(format!("writing {}: {}", self.path.display(), e))
        })?;

        info!(path = %self.path.display(), provider = %config.provider, "Updated gateway config file");
        Ok(())
    }

    /// Token recorded in the file, if any
    pub fn read_token(&self) -> Option<String> {
        let raw = std::fs::read(&self.path).ok()?;
        let value: Value = serde_json::from_slice(&raw).ok()?;
        value
            .pointer("/gateway/auth/token")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Produce the merged gateway config
pub fn render(existing: Value, config: &GatewayConfig, emergent_base_url: &str) -> Value {
    let mut root = match existing {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    root.insert(
        "gateway".to_string(),
        json!({
            "mode": "local",
            "port": config.port,
            "controlPort": config.control_port,
            "bind": "loopback",
            "auth": { "mode": "token", "token": config.token },
            "controlUi": { "enabled": true },
        }),
    );

    let (provider_id, provider_entry) = provider_entry(config, emergent_base_url);

    let models = root
        .entry("models".to_string())
        .or_insert_with(|| json!({}));
    if !models.is_object() {
        *models = json!({});
    }
    models["mode"] = json!("merge");
    let providers = models
        .as_object_mut()
        .map(|m| m.entry("providers".to_string()).or_insert_with(|| json!({})));
    if let Some(providers) = providers {
        if !providers.is_object() {
            *providers = json!({});
        }
        providers[provider_id] = provider_entry;
    }

    let agents = root
        .entry("agents".to_string())
        .or_insert_with(|| json!({}));
    if !agents.is_object() {
        *agents = json!({});
    }
    agents["defaults"] = json!({
        "workspace": config.workspace,
        "model": { "primary": config.model },
    });

    Value::Object(root)
}

fn provider_entry(config: &GatewayConfig, emergent_base_url: &str) -> (&'static str, Value) {
    let key_ref = format!("${{{}}}", config.provider.key_env());
    let model_id = config
        .model
        .split_once('/')
        .map(|(_, id)| id)
        .unwrap_or(&config.model);

    match config.provider {
        Provider::Emergent => (
            "emergent-claude",
            json!({
                "baseUrl": emergent_base_url,
                "apiKey": key_ref,
                "api": "anthropic-messages",
                "models": [{ "id": model_id, "name": model_id }],
            }),
        ),
        Provider::Anthropic => (
            "anthropic",
            json!({
                "baseUrl": "https://api.anthropic.com",
                "apiKey": key_ref,
                "api": "anthropic-messages",
                "models": [{ "id": model_id, "name": model_id }],
            }),
        ),
        Provider::OpenAI => (
            "openai",
            json!({
                "baseUrl": "https://api.openai.com/v1/",
                "apiKey": key_ref,
                "api": "openai-completions",
                "models": [{ "id": model_id, "name": model_id }],
            }),
        ),
        Provider::OpenRouter => (
            "openrouter",
            json!({
                "baseUrl": "https://openrouter.ai/api/v1/",
                "apiKey": key_ref,
                "api": "openai-completions",
                "models": [{ "id": model_id, "name": model_id }],
            }),
        ),
    }
}
