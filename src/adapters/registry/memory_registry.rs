use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::core::errors::{EnvaultError, Result};
use crate::core::models::key_record::KeyRecord;
use crate::core::traits::local_registry::LocalKeyRegistry;

/// Process-local registry. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryKeyRegistry {
    records: Mutex<BTreeMap<String, KeyRecord>>,
}

impl MemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalKeyRegistry for MemoryKeyRegistry {
    fn get(&self, name: &str) -> Result<Option<KeyRecord>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(name).cloned())
    }

    fn insert_new(&self, record: KeyRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        if records.contains_key(&record.name) {
            return Err(EnvaultError::KeyAlreadyExists { name: record.name });
        }
        records.insert(record.name.clone(), record);
        Ok(())
    }

    fn list(&self) -> Result<Vec<KeyRecord>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::key::{KeyKind, StorageType};
    use chrono::Utc;

    fn record(name: &str) -> KeyRecord {
        KeyRecord {
            name: name.into(),
            kind: KeyKind::Symmetric,
            secret: Some("AAAAAAAAAAAAAAAAAAAAAA==".into()),
            public_key_pem: None,
            private_key_pem: None,
            size_bits: 128,
            curve: None,
            key_id: format!("local:{name}"),
            storage: StorageType::Local,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_then_get() {
        let registry = MemoryKeyRegistry::new();
        registry.insert_new(record("alpha")).unwrap();

        assert_eq!(registry.get("alpha").unwrap().unwrap().size_bits, 128);
        assert!(registry.get("beta").unwrap().is_none());
        assert!(registry.contains("alpha").unwrap());
    }

    #[test]
    fn second_insert_is_rejected_and_keeps_first() {
        let registry = MemoryKeyRegistry::new();
        registry.insert_new(record("alpha")).unwrap();

        let mut other = record("alpha");
        other.size_bits = 256;
        assert!(matches!(
            registry.insert_new(other),
            Err(EnvaultError::KeyAlreadyExists { .. })
        ));
        assert_eq!(registry.get("alpha").unwrap().unwrap().size_bits, 128);
    }

    #[test]
    fn list_is_sorted_by_name() {
        let registry = MemoryKeyRegistry::new();
        registry.insert_new(record("zeta")).unwrap();
        registry.insert_new(record("alpha")).unwrap();

        let names: Vec<String> = registry.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
