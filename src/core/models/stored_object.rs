use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named storage location (one container per code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub code: String,
    pub description: String,
}

/// An object held by a storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub name: String,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
    pub location: String,
}

/// Bytes fetched from a storage backend with their metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedObject {
    pub data: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
    pub location: String,
}
