use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{EnvaultError, Result};
use crate::core::models::key_record::KeyRecord;
use crate::core::traits::local_registry::LocalKeyRegistry;

/// Registry persisted as a JSON document, usually `.envault/keys.json`.
///
/// Every write replaces the whole file through a temp file in the same
/// directory, so a crash never leaves a half-written registry behind.
/// The file can hold private keys generated offline and is created
/// owner-readable only on Unix.
///
/// Each CLI invocation opens its own registry, so access is serialized
/// with an OS lock on `<file>.lock`: shared for reads, exclusive across
/// the read-check-write of `insert_new`.
///
/// Example `keys.json`:
/// ```text
/// {
///   "keys": [
///     { "name": "doc-key", "kind": "AES", "secret": "…", "size_bits": 256, … }
///   ]
/// }
/// ```
pub struct FileKeyRegistry {
    path: PathBuf,
}

#[derive(Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    keys: Vec<KeyRecord>,
}

impl FileKeyRegistry {
    /// Create a registry backed by the given file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Return the file path this registry reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, detail: impl Into<String>) -> EnvaultError {
        EnvaultError::RegistryError {
            path: self.path.clone(),
            detail: detail.into(),
        }
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Open the lock file and take the lock. Released when the handle drops.
    fn acquire(&self, exclusive: bool) -> Result<File> {
        std::fs::create_dir_all(self.dir())?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| self.error(format!("cannot open lock file: {e}")))?;
        let locked = if exclusive {
            file.lock()
        } else {
            file.lock_shared()
        };
        locked.map_err(|e| self.error(format!("cannot lock registry: {e}")))?;
        Ok(file)
    }

    /// Shared lock for readers, skipped while there is nothing to read.
    fn acquire_shared(&self) -> Result<Option<File>> {
        if !self.path.exists() {
            return Ok(None);
        }
        self.acquire(false).map(Some)
    }

    fn read(&self) -> Result<RegistryFile> {
        if !self.path.exists() {
            return Ok(RegistryFile::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| self.error(format!("cannot read: {e}")))?;
        if content.trim().is_empty() {
            return Ok(RegistryFile::default());
        }
        serde_json::from_str(&content).map_err(|e| self.error(format!("malformed registry: {e}")))
    }

    fn write(&self, file: &RegistryFile) -> Result<()> {
        let dir = self.dir();
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(file)
            .map_err(|e| self.error(format!("cannot serialize: {e}")))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| self.error(format!("cannot create temp file: {e}")))?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| self.error(format!("cannot replace registry: {e}")))?;
        debug!(path = %self.path.display(), keys = file.keys.len(), "registry written");
        Ok(())
    }
}

impl LocalKeyRegistry for FileKeyRegistry {
    fn get(&self, name: &str) -> Result<Option<KeyRecord>> {
        let _lock = self.acquire_shared()?;
        Ok(self.read()?.keys.into_iter().find(|r| r.name == name))
    }

    fn insert_new(&self, record: KeyRecord) -> Result<()> {
        let _lock = self.acquire(true)?;
        let mut file = self.read()?;

        if file.keys.iter().any(|r| r.name == record.name) {
            return Err(EnvaultError::KeyAlreadyExists { name: record.name });
        }

        file.keys.push(record);
        file.keys.sort_by(|a, b| a.name.cmp(&b.name));
        self.write(&file)
    }

    fn list(&self) -> Result<Vec<KeyRecord>> {
        let _lock = self.acquire_shared()?;
        let mut keys = self.read()?.keys;
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }
}
