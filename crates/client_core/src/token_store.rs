//! Local persistence for the auth token pair.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use shared::protocol::AuthTokens;
use tracing::debug;

use crate::error::{ClientError, Result};

pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<AuthTokens>>;
    fn save(&self, tokens: &AuthTokens) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Keeps the tokens as a JSON document on disk, readable only by the owner
/// on unix.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn store_err(context: &str, path: &Path, err: impl std::fmt::Display) -> ClientError {
    ClientError::TokenStore(format!("{context} '{}': {err}", path.display()))
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<AuthTokens>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(store_err("failed to read", &self.path, err)),
        };
        let tokens = serde_json::from_str(&raw)
            .map_err(|err| store_err("corrupt token file", &self.path, err))?;
        Ok(Some(tokens))
    }

    fn save(&self, tokens: &AuthTokens) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| store_err("failed to create directory for", &self.path, err))?;
        }
        let raw = serde_json::to_string_pretty(tokens)
            .map_err(|err| store_err("failed to encode", &self.path, err))?;
        fs::write(&self.path, raw).map_err(|err| store_err("failed to write", &self.path, err))?;
        restrict_permissions(&self.path)?;
        debug!(path = %self.path.display(), "saved auth tokens");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(store_err("failed to remove", &self.path, err)),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|err| store_err("failed to restrict permissions on", path, err))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// In-process store; clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    slot: Arc<Mutex<Option<AuthTokens>>>,
}

impl MemoryTokenStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<AuthTokens>>> {
        self.slot
            .lock()
            .map_err(|_| ClientError::TokenStore("memory store lock poisoned".into()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<AuthTokens>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, tokens: &AuthTokens) -> Result<()> {
        *self.lock()? = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
