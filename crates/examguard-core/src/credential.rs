//! Credential storage: the single piece of mutable shared state.
//!
//! [`CredentialStore`] is the only path through which any component reads or
//! writes the bearer token. The token itself lives in a [`TokenStorage`]
//! backend that survives navigation between pages of the same exam flow
//! (browser `localStorage`, a state directory on disk, or plain memory).
//!
//! Invariant: a credential is present if and only if the most recent
//! authentication attempt succeeded and no rejection, logout or termination
//! verdict has been observed since.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;

/// Storage key the token is persisted under unless configured otherwise.
pub const DEFAULT_TOKEN_KEY: &str = "access_token";

// ---------------------------------------------------------------------------
// Storage backends
// ---------------------------------------------------------------------------

/// Key/value persistence for the bearer token.
///
/// Implementations perform no validation of the token's shape.
pub trait TokenStorage {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-lifetime storage. Used for headless runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::fs;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use super::TokenStorage;
    use crate::error::{ProctorError, Result};

    /// One file per key inside a state directory.
    ///
    /// Writes go through a temp file in the same directory and are renamed
    /// into place, so a reader sees either the old token or the new one.
    /// Temp files are created owner-only on unix.
    #[derive(Debug, Clone)]
    pub struct FileStorage {
        dir: PathBuf,
    }

    impl FileStorage {
        pub fn new(dir: impl Into<PathBuf>) -> Self {
            Self { dir: dir.into() }
        }

        pub fn dir(&self) -> &Path {
            &self.dir
        }

        fn path_for(&self, key: &str) -> PathBuf {
            let safe: String = key
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
                .collect();
            self.dir.join(safe)
        }
    }

    impl TokenStorage for FileStorage {
        fn read(&self, key: &str) -> Option<String> {
            let raw = fs::read_to_string(self.path_for(key)).ok()?;
            let token = raw.trim();
            if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            }
        }

        fn write(&self, key: &str, value: &str) -> Result<()> {
            fs::create_dir_all(&self.dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
            tmp.write_all(value.as_bytes())?;
            tmp.flush()?;
            tmp.persist(self.path_for(key))
                .map_err(|e| ProctorError::Storage(e.to_string()))?;
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<()> {
            match fs::remove_file(self.path_for(key)) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

/// Single-owner cell around the persisted bearer token.
///
/// Every `set` and every effective `clear` bumps a generation counter. A
/// caller that observed generation `g` can later [`revoke`](Self::revoke) the
/// credential only if nothing changed since `g`, which keeps concurrent
/// rejections from producing more than one teardown and keeps a stale
/// rejection from erasing a newer login.
pub struct CredentialStore<S> {
    storage: S,
    key: String,
    generation: Mutex<u64>,
}

impl<S: TokenStorage> CredentialStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, DEFAULT_TOKEN_KEY)
    }

    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            generation: Mutex::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist a freshly issued credential.
    pub fn set(&self, token: &str) -> Result<()> {
        let mut generation = self.lock_generation();
        self.storage.write(&self.key, token)?;
        *generation += 1;
        Ok(())
    }

    /// Current credential, if any.
    pub fn get(&self) -> Option<String> {
        let _generation = self.lock_generation();
        self.storage.read(&self.key)
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }

    /// Generation and credential read under one lock.
    pub fn snapshot(&self) -> (u64, Option<String>) {
        let generation = self.lock_generation();
        (*generation, self.storage.read(&self.key))
    }

    pub fn generation(&self) -> u64 {
        *self.lock_generation()
    }

    /// Remove the credential. Returns true if one was present.
    ///
    /// Idempotent: clearing an empty store changes nothing. A failed removal
    /// leaves the generation untouched and is returned to the caller.
    pub fn clear(&self) -> Result<bool> {
        let mut generation = self.lock_generation();
        self.clear_locked(&mut generation)
    }

    /// Clear the credential only if nothing has changed since `observed`.
    ///
    /// Returns true for exactly one caller per generation.
    pub fn revoke(&self, observed: u64) -> Result<bool> {
        let mut generation = self.lock_generation();
        if *generation != observed {
            return Ok(false);
        }
        self.clear_locked(&mut generation)?;
        // An anonymous generation is still consumed so that concurrent
        // rejections of unauthenticated calls tear down once.
        if *generation == observed {
            *generation += 1;
        }
        Ok(true)
    }

    fn clear_locked(&self, generation: &mut u64) -> Result<bool> {
        if self.storage.read(&self.key).is_none() {
            return Ok(false);
        }
        self.storage.remove(&self.key)?;
        *generation += 1;
        Ok(true)
    }

    fn lock_generation(&self) -> std::sync::MutexGuard<'_, u64> {
        self.generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
