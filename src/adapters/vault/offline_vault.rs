use std::collections::BTreeMap;

use crate::core::errors::RemoteError;
use crate::core::models::key::KeyOperation;
use crate::core::models::remote::{RemoteKey, RemoteSecret};
use crate::core::traits::remote_vault::RemoteKeyVault;

/// A vault that is never reachable.
///
/// Used when no vault is configured; every key then lives in the local
/// registry only.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineVault;

impl OfflineVault {
    pub fn new() -> Self {
        Self
    }
}

const REASON: &str = "no key vault configured";

impl RemoteKeyVault for OfflineVault {
    fn is_available(&self) -> bool {
        false
    }

    fn create_secret(
        &self,
        _name: &str,
        _value: &str,
        _tags: &BTreeMap<String, String>,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::unavailable(REASON))
    }

    fn get_secret(&self, _name: &str) -> Result<RemoteSecret, RemoteError> {
        Err(RemoteError::unavailable(REASON))
    }

    fn create_asymmetric_key(
        &self,
        _name: &str,
        _size_bits: u32,
        _ops: &[KeyOperation],
        _tags: &BTreeMap<String, String>,
    ) -> Result<RemoteKey, RemoteError> {
        Err(RemoteError::unavailable(REASON))
    }

    fn get_asymmetric_key(&self, _name: &str) -> Result<RemoteKey, RemoteError> {
        Err(RemoteError::unavailable(REASON))
    }

    fn name(&self) -> &str {
        "offline"
    }
}
