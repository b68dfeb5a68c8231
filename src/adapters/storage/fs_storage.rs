use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::core::errors::{EnvaultError, Result};
use crate::core::models::stored_object::{DownloadedObject, StorageLocation, StoredObject};
use crate::core::traits::object_storage::ObjectStorage;

const META_SUFFIX: &str = ".meta.json";
pub const DEFAULT_LOCATION: &str = "default";

struct LocationDir {
    description: String,
    path: PathBuf,
}

/// Object storage on the local filesystem.
///
/// Each location code maps to its own directory. An object's metadata
/// lives next to it in `<name>.meta.json`.
pub struct FsObjectStorage {
    locations: BTreeMap<String, LocationDir>,
    default_code: String,
}

impl FsObjectStorage {
    /// Build a storage from `(location, directory)` pairs.
    ///
    /// `default_code` must name one of the locations.
    pub fn new(locations: Vec<(StorageLocation, PathBuf)>, default_code: &str) -> Result<Self> {
        let locations: BTreeMap<String, LocationDir> = locations
            .into_iter()
            .map(|(loc, path)| {
                (
                    loc.code,
                    LocationDir {
                        description: loc.description,
                        path,
                    },
                )
            })
            .collect();

        if !locations.contains_key(default_code) {
            return Err(EnvaultError::InvalidConfig {
                detail: format!("Default storage location '{default_code}' is not configured"),
            });
        }

        Ok(Self {
            locations,
            default_code: default_code.to_string(),
        })
    }

    /// A storage with just one location, `default`, rooted at `path`.
    pub fn single(path: PathBuf) -> Self {
        let mut locations = BTreeMap::new();
        locations.insert(
            DEFAULT_LOCATION.to_string(),
            LocationDir {
                description: "Local storage".to_string(),
                path,
            },
        );
        Self {
            locations,
            default_code: DEFAULT_LOCATION.to_string(),
        }
    }

    /// Pick a location; unknown codes fall back to the default.
    fn resolve(&self, location: Option<&str>) -> (&str, &LocationDir) {
        if let Some(code) = location {
            if let Some((code, dir)) = self.locations.get_key_value(code) {
                return (code.as_str(), dir);
            }
            warn!(location = %code, default = %self.default_code, "unknown storage location, using default");
        }
        let dir = &self.locations[&self.default_code];
        (self.default_code.as_str(), dir)
    }

    fn list_dir(&self, code: &str, dir: &LocationDir) -> Result<Vec<StoredObject>> {
        if !dir.path.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir.path).map_err(|e| unavailable(code, e))?;

        let mut objects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| unavailable(code, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(META_SUFFIX) {
                continue;
            }
            let meta = entry.metadata().map_err(|e| unavailable(code, e))?;
            if !meta.is_file() {
                continue;
            }

            let timestamp = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            objects.push(StoredObject {
                metadata: read_metadata(&dir.path, &name)?,
                name,
                size: meta.len(),
                timestamp,
                location: code.to_string(),
            });
        }
        Ok(objects)
    }
}

impl ObjectStorage for FsObjectStorage {
    fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        metadata: &BTreeMap<String, String>,
        location: Option<&str>,
    ) -> Result<StoredObject> {
        validate_object_name(name)?;
        let (code, dir) = self.resolve(location);
        fs::create_dir_all(&dir.path).map_err(|e| unavailable(code, e))?;

        fs::write(dir.path.join(name), bytes).map_err(|e| unavailable(code, e))?;
        let meta_json = serde_json::to_string_pretty(metadata).map_err(|e| {
            EnvaultError::StorageUnavailable {
                location: code.to_string(),
                reason: format!("cannot serialize metadata: {e}"),
            }
        })?;
        fs::write(meta_path(&dir.path, name), meta_json).map_err(|e| unavailable(code, e))?;

        debug!(object = %name, location = %code, size = bytes.len(), "object uploaded");
        Ok(StoredObject {
            name: name.to_string(),
            size: bytes.len() as u64,
            timestamp: Utc::now(),
            metadata: metadata.clone(),
            location: code.to_string(),
        })
    }

    fn download(&self, name: &str, location: Option<&str>) -> Result<DownloadedObject> {
        validate_object_name(name)?;
        let (code, dir) = self.resolve(location);
        let path = dir.path.join(name);

        if !path.is_file() {
            return Err(EnvaultError::ObjectNotFound {
                name: name.to_string(),
                location: code.to_string(),
            });
        }

        Ok(DownloadedObject {
            data: fs::read(&path).map_err(|e| unavailable(code, e))?,
            metadata: read_metadata(&dir.path, name)?,
            location: code.to_string(),
        })
    }

    fn list(&self, location: Option<&str>) -> Result<Vec<StoredObject>> {
        let mut objects = match location {
            Some(_) => {
                let (code, dir) = self.resolve(location);
                self.list_dir(code, dir)?
            }
            None => {
                let mut all = Vec::new();
                for (code, dir) in &self.locations {
                    all.extend(self.list_dir(code, dir)?);
                }
                all
            }
        };
        objects.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.name.cmp(&b.name)));
        Ok(objects)
    }

    fn locations(&self) -> Vec<StorageLocation> {
        self.locations
            .iter()
            .map(|(code, dir)| StorageLocation {
                code: code.clone(),
                description: dir.description.clone(),
            })
            .collect()
    }
}

/// Object names are plain file names: no separators, no dot segments.
fn validate_object_name(name: &str) -> Result<()> {
    let bad = name.trim().is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
        || name.ends_with(META_SUFFIX);
    if bad {
        return Err(EnvaultError::InvalidInput {
            detail: format!("Invalid object name: '{name}'"),
        });
    }
    Ok(())
}

fn meta_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{META_SUFFIX}"))
}

fn read_metadata(dir: &Path, name: &str) -> Result<BTreeMap<String, String>> {
    let path = meta_path(dir, name);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "ignoring unreadable metadata sidecar");
        BTreeMap::new()
    }))
}

fn unavailable(code: &str, err: std::io::Error) -> EnvaultError {
    EnvaultError::StorageUnavailable {
        location: code.to_string(),
        reason: err.to_string(),
    }
}
