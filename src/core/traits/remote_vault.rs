use std::collections::BTreeMap;

use crate::core::errors::RemoteError;
use crate::core::models::key::KeyOperation;
use crate::core::models::remote::{RemoteKey, RemoteSecret};

/// Port for the remote key-management service.
///
/// Implementations live in `adapters::vault` (e.g. AzureKeyVault, OfflineVault).
/// The vault has no unified lookup by name across key kinds, so secrets
/// and asymmetric keys are fetched through separate calls.
pub trait RemoteKeyVault: Send + Sync {
    /// Whether the vault was reachable when the adapter was set up.
    fn is_available(&self) -> bool;

    /// Store a secret value (symmetric key material, base64).
    fn create_secret(
        &self,
        name: &str,
        value: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), RemoteError>;

    /// Fetch a secret by name.
    fn get_secret(&self, name: &str) -> Result<RemoteSecret, RemoteError>;

    /// Create an RSA key pair inside the vault and return its public half.
    fn create_asymmetric_key(
        &self,
        name: &str,
        size_bits: u32,
        ops: &[KeyOperation],
        tags: &BTreeMap<String, String>,
    ) -> Result<RemoteKey, RemoteError>;

    /// Fetch the public half of an asymmetric key by name.
    fn get_asymmetric_key(&self, name: &str) -> Result<RemoteKey, RemoteError>;

    /// Human-readable name of this backend (e.g. "azure", "offline").
    fn name(&self) -> &str;
}

impl<T: RemoteKeyVault + ?Sized> RemoteKeyVault for Box<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn create_secret(
        &self,
        name: &str,
        value: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), RemoteError> {
        (**self).create_secret(name, value, tags)
    }

    fn get_secret(&self, name: &str) -> Result<RemoteSecret, RemoteError> {
        (**self).get_secret(name)
    }

    fn create_asymmetric_key(
        &self,
        name: &str,
        size_bits: u32,
        ops: &[KeyOperation],
        tags: &BTreeMap<String, String>,
    ) -> Result<RemoteKey, RemoteError> {
        (**self).create_asymmetric_key(name, size_bits, ops, tags)
    }

    fn get_asymmetric_key(&self, name: &str) -> Result<RemoteKey, RemoteError> {
        (**self).get_asymmetric_key(name)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
