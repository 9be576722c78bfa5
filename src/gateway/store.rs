//! Persistence of the singleton gateway document

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::secrets::write_private_atomic;
use super::types::GatewayConfig;
use crate::error::{Error, Result};

/// Load/save of the one gateway document. Saving replaces it.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<Option<GatewayConfig>>;

    async fn save(&self, config: &GatewayConfig) -> Result<()>;
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileConfigStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<Option<GatewayConfig>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn save(&self, config: &GatewayConfig) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(config)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_private_atomic(&path, &bytes))
            .await
            .map_err(|e| Error::Internal(format!("config save task failed: {}", e)))??;
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    doc: Mutex<Option<GatewayConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        MemoryConfigStore {
            doc: Mutex::new(Some(config)),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<Option<GatewayConfig>> {
        let doc = self
            .doc
            .lock()
            .map_err(|_| Error::Internal("config store poisoned".to_string()))?;
        Ok(doc.clone())
    }

    async fn save(&self, config: &GatewayConfig) -> Result<()> {
        let mut doc = self
            .doc
            .lock()
            .map_err(|_| Error::Internal("config store poisoned".to_string()))?;
        *doc = Some(config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewaySettings;
    use crate::gateway::{ConfigBuilder, ProviderSelection};
    use tempfile::tempdir;

    fn sample() -> GatewayConfig {
        ConfigBuilder::new(GatewaySettings::default())
            .build(
                None,
                &ProviderSelection::new("openai").with_key("sk-validlengthkey1234"),
            )
            .unwrap()
            .config
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("gateway_config.json"));
        assert!(store.load().await.unwrap().is_none());

        let doc = sample();
        store.save(&doc).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(doc.clone()));

        let mut next = doc;
        next.should_run = false;
        store.save(&next).await.unwrap();
        assert!(!store.load().await.unwrap().unwrap().should_run);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gateway_config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileConfigStore::new(path).load().await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_keeps_single_document() {
        let store = MemoryConfigStore::new();
        let mut doc = sample();
        store.save(&doc).await.unwrap();
        doc.model = "openai/other".to_string();
        store.save(&doc).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().model, "openai/other");
    }
}
