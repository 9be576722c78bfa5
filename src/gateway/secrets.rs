//! SecretWriter - the gateway's environment file
//!
//! The file is replaced atomically: content goes to a temp file in the
//! destination directory, gets owner-only permissions, is synced, and is
//! renamed over the destination. A concurrent reader sees either the old
//! or the new file, never a mix.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::GatewaySecrets;
use crate::error::{Error, Result};

/// Writes [`GatewaySecrets`] to a restricted `KEY=value` file
#[derive(Debug, Clone)]
pub struct SecretWriter {
    path: PathBuf,
}

impl SecretWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SecretWriter { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the secrets file
    pub fn write(&self, secrets: &GatewaySecrets) -> Result<()> {
        write_private_atomic(&self.path, secrets.render().as_bytes())
            .map_err(|e| Error::SecretWriteFailed(format!("{}: {}", self.path.display(), e)))?;

        info!(
            path = %self.path.display(),
            keys = secrets.keys().count(),
            "Wrote gateway secrets"
        );
        Ok(())
    }

    /// Remove the secrets file; a missing file is not an error
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Cleared gateway secrets");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::SecretWriteFailed(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Parse the file back into a map (`None` when absent)
    pub fn read(&self) -> Result<Option<HashMap<String, String>>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entries = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(Some(entries))
    }
}

/// Write `bytes` to `path` atomically with mode 0600
pub(crate) fn write_private_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".clawhost-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
