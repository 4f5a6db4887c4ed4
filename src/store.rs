use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use crate::{wire::StoredTokens, Credential, StoreError};

/// Durable home for the access/refresh token pair.
///
/// Read once when a client is built, written after every successful
/// refresh, cleared on logout and on irrecoverable refresh failure.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<Credential>, StoreError>;
    fn save(&self, credential: &Credential) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store; tokens do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        *self.slot.lock() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.slot.lock().take();
        Ok(())
    }
}

/// Stores tokens as a small JSON document on disk.
///
/// A missing file loads as "no credential"; clearing removes the file.
/// Saves go through a temporary file in the same directory that is renamed
/// over the target, so a crash never leaves a truncated document behind.
#[derive(Clone, Debug)]
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

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let stored: StoredTokens = serde_json::from_str(&content)?;
        Ok(Some(Credential::new(stored.access_token, stored.refresh_token)))
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
                parent
            }
            None => Path::new("."),
        };
        let stored = StoredTokens {
            access_token: credential.access_token().to_owned(),
            refresh_token: credential.refresh_token().to_owned(),
        };
        let content = serde_json::to_vec_pretty(&stored)?;

        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|err| self.io_error(err))?;
        staged
            .write_all(&content)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|err| self.io_error(err))?;
        staged
            .persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}
