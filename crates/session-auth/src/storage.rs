//! Durable key/value storage for client session state
//!
//! `FileStorage` keeps a JSON object on disk and mirrors it in memory. Reads
//! never touch the disk. Writes go to disk first (temp file + rename) and only
//! then to memory, so the in-memory view never holds a value the file lacks.
//! Operations are synchronous: a single write is one atomic rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Durable string storage keyed by fixed names.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Overwrite `key`. Writing the same value twice is a no-op in effect.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-backed storage.
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the storage file, creating an empty one (and its directory) if
    /// it does not exist yet.
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::Storage(format!("reading {}: {e}", path.display())))?;
            let state: BTreeMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Storage(format!("parsing {}: {e}", path.display())))?;
            info!(path = %path.display(), keys = state.len(), "loaded session storage");
            state
        } else {
            info!(path = %path.display(), "session storage not found, starting empty");
            let state = BTreeMap::new();
            write_atomic(&path, &state)?;
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.state.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        next.insert(key.to_owned(), value.to_owned());
        write_atomic(&self.path, &next)?;
        *state = next;
        debug!(key, "stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.contains_key(key) {
            return Ok(());
        }
        let mut next = state.clone();
        next.remove(key);
        write_atomic(&self.path, &next)?;
        *state = next;
        debug!(key, "removed value");
        Ok(())
    }
}

/// In-memory storage for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.state.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.state.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.state.lock().remove(key);
        Ok(())
    }
}

/// Serialize `data` and replace `path` with it atomically.
///
/// Writes a sibling temp file, restricts it to 0600 on unix (it holds
/// credentials), then renames it over the target.
pub(crate) fn write_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Storage(format!("serializing {}: {e}", path.display())))?;

    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::Storage(format!("creating {}: {e}", dir.display())))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".into());
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| Error::Storage(format!("writing {}: {e}", tmp_path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Storage(format!("setting permissions: {e}")))?;
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| Error::Storage(format!("renaming {}: {e}", tmp_path.display())))?;

    Ok(())
}
