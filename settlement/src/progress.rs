//! Progress Store
//!
//! Persists one progress token per (chain, progress id) as a plain text file
//! at `<directory>/<chain>/<progress id>.token`. Both path components are
//! escaped so distinct keys never share a file.
//!
//! A run holds the key's lock for its whole duration: an in-process async
//! mutex, then a `<progress id>.lock` file created exclusively next to the
//! token so a second process cannot run the same key at the same time.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use crate::error::SettlementError;

const TOKEN_EXTENSION: &str = "token";
const LOCK_EXTENSION: &str = "lock";

type LockMap = Arc<Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>>;

/// A persisted token found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry {
    pub chain: String,
    pub progress_id: String,
    pub token: String,
}

/// File-backed progress token store
pub struct ProgressStore {
    base_path: PathBuf,
    locks: LockMap,
}

/// Exclusive hold on one progress key. Released on drop.
pub struct ProgressLock {
    key: (String, String),
    lock_file: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl Drop for ProgressLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_file) {
            warn!("Failed to remove lock file {}: {}", self.lock_file.display(), e);
        }
        self.guard.take();
        release_entry(&self.locks, &self.key);
    }
}

/// Drops the map entry for `key` once nobody else references its mutex.
fn release_entry(locks: &LockMap, key: &(String, String)) {
    let mut locks = match locks.lock() {
        Ok(locks) => locks,
        Err(poisoned) => poisoned.into_inner(),
    };
    if locks.get(key).map(|lock| Arc::strong_count(lock) == 1).unwrap_or(false) {
        locks.remove(key);
    }
}

/// Escapes a key component into a file name.
///
/// ASCII letters, digits, `-` and `_` are kept, as is `.` except in first
/// position. Every other byte becomes `%XX`, so the mapping is injective and
/// never yields a path separator or a `.`/`..` component.
fn encode_component(component: &str) -> String {
    let mut encoded = String::with_capacity(component.len());
    for (i, byte) in component.bytes().enumerate() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => encoded.push(byte as char),
            b'.' if i > 0 => encoded.push('.'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Reverses `encode_component`. Returns `None` for names it cannot produce.
fn decode_component(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let pair = name.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(pair, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

impl ProgressStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn encoded_key(chain: &str, progress_id: &str) -> (String, String) {
        (encode_component(chain), encode_component(progress_id))
    }

    fn key_path(&self, chain: &str, progress_id: &str, extension: &str) -> PathBuf {
        let (chain, progress_id) = Self::encoded_key(chain, progress_id);
        self.base_path
            .join(chain)
            .join(format!("{}.{}", progress_id, extension))
    }

    fn token_path(&self, chain: &str, progress_id: &str) -> PathBuf {
        self.key_path(chain, progress_id, TOKEN_EXTENSION)
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Acquires the exclusive lock for a key. Held for a whole settlement run.
    ///
    /// Waits for other runs of this process, but fails with
    /// `SettlementError::Locked` when another process holds the lock file.
    pub async fn lock(
        &self,
        chain: &str,
        progress_id: &str,
    ) -> Result<ProgressLock, SettlementError> {
        let key = Self::encoded_key(chain, progress_id);
        let key_lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = key_lock.lock_owned().await;

        let lock_file = self.key_path(chain, progress_id, LOCK_EXTENSION);
        if let Err(e) = create_lock_file(&lock_file).await {
            drop(guard);
            release_entry(&self.locks, &key);
            return Err(e);
        }

        Ok(ProgressLock {
            key,
            lock_file,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        })
    }

    /// Reads the token for a key, if one exists.
    pub async fn load(
        &self,
        chain: &str,
        progress_id: &str,
    ) -> Result<Option<String>, SettlementError> {
        let path = self.token_path(chain, progress_id);
        match fs::read_to_string(&path).await {
            Ok(token) => {
                let token = token.trim().to_string();
                Ok(if token.is_empty() { None } else { Some(token) })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SettlementError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Writes (or replaces) the token for a key.
    pub async fn save(
        &self,
        chain: &str,
        progress_id: &str,
        token: &str,
    ) -> Result<(), SettlementError> {
        let path = self.token_path(chain, progress_id);
        let storage_error = |e: std::io::Error| {
            SettlementError::Storage(format!("Failed to write {}: {}", path.display(), e))
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(storage_error)?;
        }

        // Write to a temporary file then rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, token).await.map_err(storage_error)?;
        fs::rename(&temp_path, &path).await.map_err(storage_error)?;
        Ok(())
    }

    /// Deletes the token for a key. Returns whether one existed.
    pub async fn delete(&self, chain: &str, progress_id: &str) -> Result<bool, SettlementError> {
        let path = self.token_path(chain, progress_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SettlementError::Storage(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Lists every persisted token, sorted by chain then progress id.
    pub async fn list(&self) -> Result<Vec<ProgressEntry>, SettlementError> {
        let storage_error = |e: std::io::Error| {
            SettlementError::Storage(format!("Failed to list {}: {}", self.base_path.display(), e))
        };

        let mut entries = Vec::new();
        let mut chains = match fs::read_dir(&self.base_path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(storage_error(e)),
        };

        while let Some(chain_dir) = chains.next_entry().await.map_err(storage_error)? {
            if !chain_dir.file_type().await.map_err(storage_error)?.is_dir() {
                continue;
            }
            let chain = match decode_component(&chain_dir.file_name().to_string_lossy()) {
                Some(chain) => chain,
                None => continue,
            };
            let mut files = fs::read_dir(chain_dir.path()).await.map_err(storage_error)?;
            while let Some(file) = files.next_entry().await.map_err(storage_error)? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some(TOKEN_EXTENSION) {
                    continue;
                }
                let progress_id = match path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(decode_component)
                {
                    Some(progress_id) => progress_id,
                    None => continue,
                };
                if let Some(token) = self.load(&chain, &progress_id).await? {
                    entries.push(ProgressEntry {
                        chain: chain.clone(),
                        progress_id,
                        token,
                    });
                }
            }
        }

        entries.sort_by(|a, b| (&a.chain, &a.progress_id).cmp(&(&b.chain, &b.progress_id)));
        Ok(entries)
    }
}

/// Creates the lock file, failing if it already exists.
async fn create_lock_file(path: &Path) -> Result<(), SettlementError> {
    let storage_error = |e: std::io::Error| {
        SettlementError::Storage(format!("Failed to create {}: {}", path.display(), e))
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(storage_error)?;
    }

    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(SettlementError::Locked(path.display().to_string()))
        }
        Err(e) => return Err(storage_error(e)),
    };
    // Owner pid, for whoever has to clean up after a crash
    writeln!(file, "{}", std::process::id()).map_err(storage_error)?;
    Ok(())
}
