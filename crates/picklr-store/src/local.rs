use std::path::PathBuf;

use async_trait::async_trait;
use picklr_domain::State;
use tracing::debug;

use crate::backend::Backend;
use crate::encryption;
use crate::error::StoreError;
use crate::format;
use crate::lock;

/// The filesystem state manager (§4.8): the primary [`Backend`]
/// implementation. Atomic write-then-rename, an optional AES-256-GCM
/// encryption key, and a `<path>.lock` sidecar for cooperative locking.
pub struct LocalBackend {
    path: PathBuf,
    encryption_key: Option<Vec<u8>>,
}

impl LocalBackend {
    pub fn new(path: impl Into<PathBuf>) -> LocalBackend {
        LocalBackend { path: path.into(), encryption_key: None }
    }

    pub fn with_encryption_key(path: impl Into<PathBuf>, key: Vec<u8>) -> LocalBackend {
        LocalBackend { path: path.into(), encryption_key: Some(key) }
    }

    fn lock_path(&self) -> PathBuf {
        let mut os_string = self.path.clone().into_os_string();
        os_string.push(".lock");
        PathBuf::from(os_string)
    }

    fn io_err(&self, message: impl std::fmt::Display) -> StoreError {
        StoreError::StateIo { path: self.path.display().to_string(), message: message.to_string() }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn read(&self) -> Result<State, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file yet, returning empty state");
                return Ok(State::empty());
            }
            Err(e) => return Err(self.io_err(e)),
        };

        let text = encryption::maybe_decrypt(&bytes, self.encryption_key.as_deref())?;
        format::parse(&text)
    }

    async fn write(&self, state: &State) -> Result<(), StoreError> {
        let mut to_write = state.clone();
        to_write.serial = state.serial + 1;

        let text = format::serialize(&to_write);
        let body = encryption::maybe_encrypt(&text, self.encryption_key.as_deref());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, body.as_bytes()).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.io_err(e))?;

        debug!(path = %self.path.display(), serial = to_write.serial, "state written");
        Ok(())
    }

    async fn lock(&self) -> Result<(), StoreError> {
        lock::acquire(&self.lock_path())
    }

    async fn unlock(&self) -> Result<(), StoreError> {
        lock::release(&self.lock_path())
    }
}
