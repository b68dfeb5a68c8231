use std::collections::BTreeMap;

use crate::core::errors::Result;
use crate::core::models::stored_object::{DownloadedObject, StorageLocation, StoredObject};

/// Port for the blob store that keeps encrypted documents.
///
/// `location` selects a storage location by code; `None` means the
/// default location.
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous object.
    fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        metadata: &BTreeMap<String, String>,
        location: Option<&str>,
    ) -> Result<StoredObject>;

    /// Fetch an object and its metadata.
    fn download(&self, name: &str, location: Option<&str>) -> Result<DownloadedObject>;

    /// List objects in one location, or in all of them when `None`.
    fn list(&self, location: Option<&str>) -> Result<Vec<StoredObject>>;

    /// Configured locations.
    fn locations(&self) -> Vec<StorageLocation>;
}
