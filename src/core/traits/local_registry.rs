use crate::core::errors::Result;
use crate::core::models::key_record::KeyRecord;

/// Port for the process-local key registry.
pub trait LocalKeyRegistry: Send + Sync {
    /// Look up a record by key name.
    fn get(&self, name: &str) -> Result<Option<KeyRecord>>;

    /// Insert a record unless the name is taken.
    ///
    /// Check and insert happen under one lock; a taken name fails with
    /// `KeyAlreadyExists` and leaves the registry untouched.
    fn insert_new(&self, record: KeyRecord) -> Result<()>;

    /// All records, ordered by name.
    fn list(&self) -> Result<Vec<KeyRecord>>;

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.is_some())
    }
}
