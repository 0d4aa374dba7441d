//! Service provider key persistence.
//!
//! A registered identity is one RSA key pair per service id. The file
//! format is two lines:
//!
//! ```text
//! <hex DER PrivateKeyInfo>
//! <hex DER SubjectPublicKeyInfo>
//! ```
//!
//! Loading checks that the halves belong together.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use cipherise_crypto::{KeyPair, PrivateKey, PublicKey};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::KeyStoreError;

/// Persists service provider key pairs by service id.
pub trait KeyStore: Send + Sync {
    /// Store `keys` for `service_id`, replacing any previous pair.
    fn save(&self, service_id: &str, keys: &KeyPair) -> Result<(), KeyStoreError>;

    /// Load the pair for `service_id`, `None` if there is none.
    fn load(&self, service_id: &str) -> Result<Option<KeyPair>, KeyStoreError>;

    /// Remove the pair for `service_id`. Missing pairs are not an error.
    fn delete(&self, service_id: &str) -> Result<(), KeyStoreError>;
}

/// Key files in a directory, one `<serviceId>.key` per identity.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the key files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the key file for `service_id`.
    pub fn path_for(&self, service_id: &str) -> Result<PathBuf, KeyStoreError> {
        let valid = !service_id.is_empty()
            && service_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(KeyStoreError::InvalidServiceId(service_id.to_string()));
        }
        Ok(self.dir.join(format!("{service_id}.key")))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> KeyStoreError {
    KeyStoreError::Io { path: path.display().to_string(), source }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> KeyStoreError {
    KeyStoreError::Corrupt { path: path.display().to_string(), reason: reason.into() }
}

impl KeyStore for FileKeyStore {
    fn save(&self, service_id: &str, keys: &KeyPair) -> Result<(), KeyStoreError> {
        let path = self.path_for(service_id)?;
        let private = keys.private().to_der_hex().map_err(|e| corrupt(&path, e.to_string()))?;
        let public = keys.public().to_der_hex().map_err(|e| corrupt(&path, e.to_string()))?;
        let contents = Zeroizing::new(format!("{}\n{public}\n", private.as_str()));

        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        fs::write(&path, contents.as_bytes()).map_err(|e| io_error(&path, e))?;
        debug!(path = %path.display(), "service keys saved");
        Ok(())
    }

    fn load(&self, service_id: &str) -> Result<Option<KeyPair>, KeyStoreError> {
        let path = self.path_for(service_id)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => Zeroizing::new(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        let mut lines = contents.lines().map(str::trim).filter(|line| !line.is_empty());
        let (Some(private_hex), Some(public_hex)) = (lines.next(), lines.next()) else {
            return Err(corrupt(&path, "expected two lines"));
        };

        let private =
            PrivateKey::from_der_hex(private_hex).map_err(|e| corrupt(&path, e.to_string()))?;
        let public =
            PublicKey::from_der_hex(public_hex).map_err(|e| corrupt(&path, e.to_string()))?;
        KeyPair::from_parts(private, public).map(Some).map_err(|e| corrupt(&path, e.to_string()))
    }

    fn delete(&self, service_id: &str) -> Result<(), KeyStoreError> {
        let path = self.path_for(service_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "no key file to delete");
                Ok(())
            },
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

/// In-memory store for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, KeyPair>>,
}

impl MemoryKeyStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyStore for MemoryKeyStore {
    fn save(&self, service_id: &str, keys: &KeyPair) -> Result<(), KeyStoreError> {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service_id.to_string(), keys.clone());
        Ok(())
    }

    fn load(&self, service_id: &str) -> Result<Option<KeyPair>, KeyStoreError> {
        Ok(self.keys.lock().unwrap_or_else(PoisonError::into_inner).get(service_id).cloned())
    }

    fn delete(&self, service_id: &str) -> Result<(), KeyStoreError> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).remove(service_id);
        Ok(())
    }
}
