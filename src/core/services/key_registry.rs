use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, info, warn};

use crate::core::errors::{EnvaultError, RemoteError, Result};
use crate::core::models::key::{
    Curve, Key, KeyKind, KeyMaterial, KeyOperation, NominalCurve, StorageType, SymmetricSecret,
};
use crate::core::models::key_record::KeyRecord;
use crate::core::models::remote::{RemoteKey, RemoteSecret};
use crate::core::services::block_cipher::random_bytes;
use crate::core::services::key_policy::{CURVE_MAPPED_BITS, KeyDefaults, KeySpec};
use crate::core::services::public_key_encoder::{self, PublicKeyCoordinates};
use crate::core::traits::local_registry::LocalKeyRegistry;
use crate::core::traits::remote_vault::RemoteKeyVault;

/// Longest key name the vault accepts.
const MAX_KEY_NAME_LEN: usize = 127;

const TAG_KEY_TYPE: &str = "keyType";
const TAG_KEY_LENGTH: &str = "keyLength";
const TAG_CURVE: &str = "curve";
const TAG_CREATED_BY: &str = "createdBy";
const CREATED_BY: &str = "envault";

/// Bounded retry for remote lookups: fixed attempt count, fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Outcome of one remote lookup round (asymmetric, then secret).
enum Lookup {
    Found(Key),
    Absent,
    Transient(String),
}

/// Owns key lifecycle across the remote vault and the local registry.
///
/// The remote vault is preferred; when it is unreachable the registry
/// keeps working from local state only. The local registry is the
/// source of truth for symmetric keys and for pairs generated locally.
pub struct KeyRegistry<V: RemoteKeyVault, R: LocalKeyRegistry> {
    vault: V,
    local: R,
    defaults: KeyDefaults,
    retry: RetryPolicy,
    in_flight: Mutex<HashSet<String>>,
}

/// Holds a key name for the duration of one `create_key` call.
struct Reservation<'a> {
    names: &'a Mutex<HashSet<String>>,
    name: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut names = self.names.lock().unwrap_or_else(|p| p.into_inner());
        names.remove(&self.name);
    }
}

impl<V: RemoteKeyVault, R: LocalKeyRegistry> KeyRegistry<V, R> {
    pub fn new(vault: V, local: R) -> Self {
        Self {
            vault,
            local,
            defaults: KeyDefaults::default(),
            retry: RetryPolicy::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_defaults(mut self, defaults: KeyDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn local(&self) -> &R {
        &self.local
    }

    /// Create a new named key.
    ///
    /// `key_type` and `size_or_curve` fall back to the configured
    /// defaults when absent. Fails with `KeyAlreadyExists` if the name is
    /// known to either backend, and with the retryable
    /// `KeyCreationInProgress` while another call holds the same name.
    pub fn create_key(
        &self,
        name: &str,
        key_type: Option<&str>,
        size_or_curve: Option<&str>,
    ) -> Result<Key> {
        validate_key_name(name)?;
        let spec = KeySpec::validate(key_type, size_or_curve, &self.defaults)?;
        info!(key = %name, kind = %spec.kind(), bits = spec.size_bits(), "creating key");

        let _reservation = self.reserve(name)?;
        if self.exists(name)? {
            return Err(EnvaultError::KeyAlreadyExists {
                name: name.to_string(),
            });
        }

        let (key, record) = match spec {
            KeySpec::Symmetric { bits } => self.create_symmetric(name, bits)?,
            KeySpec::Asymmetric { bits } => self.create_pair(name, bits, None)?,
            KeySpec::CurveMapped { curve } => {
                self.create_pair(name, CURVE_MAPPED_BITS, Some(curve))?
            }
        };

        self.local.insert_new(record)?;
        info!(key = %name, storage = ?key.storage, "key created");
        Ok(key)
    }

    /// Resolve a key by name: local registry first, then the vault.
    pub fn get_key(&self, name: &str) -> Result<Key> {
        info!(key = %name, "retrieving key");

        if let Some(record) = self.local.get(name)? {
            debug!(key = %name, "found key in local registry");
            return record.to_key();
        }

        if !self.vault.is_available() {
            warn!(key = %name, vault = self.vault.name(), "key not in local registry and vault unavailable");
            return Err(not_found(name));
        }

        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.lookup_remote(name)? {
                Lookup::Found(key) => {
                    debug!(key = %name, attempt, "found key in vault");
                    return Ok(key);
                }
                Lookup::Absent => {
                    debug!(key = %name, "vault reports key absent");
                    return Err(not_found(name));
                }
                Lookup::Transient(reason) => {
                    warn!(key = %name, attempt, attempts, %reason, "vault lookup failed");
                    if attempt < attempts {
                        std::thread::sleep(self.retry.delay);
                    }
                }
            }
        }

        Err(not_found(name))
    }

    /// Every key in the local registry.
    pub fn list_local(&self) -> Result<Vec<Key>> {
        self.local.list()?.iter().map(KeyRecord::to_key).collect()
    }

    fn reserve(&self, name: &str) -> Result<Reservation<'_>> {
        let mut names = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !names.insert(name.to_string()) {
            warn!(key = %name, "concurrent creation of the same key name");
            return Err(EnvaultError::KeyCreationInProgress {
                name: name.to_string(),
            });
        }
        Ok(Reservation {
            names: &self.in_flight,
            name: name.to_string(),
        })
    }

    /// Whether `name` is taken locally or in the vault.
    ///
    /// A vault outage is logged and treated as "not taken".
    fn exists(&self, name: &str) -> Result<bool> {
        if self.local.contains(name)? {
            return Ok(true);
        }
        if !self.vault.is_available() {
            return Ok(false);
        }

        match self.vault.get_asymmetric_key(name) {
            Ok(_) => return Ok(true),
            Err(RemoteError::NotFound) => {}
            Err(e) => warn!(key = %name, error = %e, "existence check against vault failed"),
        }
        match self.vault.get_secret(name) {
            Ok(_) => Ok(true),
            Err(RemoteError::NotFound) => Ok(false),
            Err(e) => {
                warn!(key = %name, error = %e, "existence check against vault failed");
                Ok(false)
            }
        }
    }

    fn create_symmetric(&self, name: &str, bits: u32) -> Result<(Key, KeyRecord)> {
        let secret = SymmetricSecret::new(random_bytes(bits as usize / 8).to_vec());
        let encoded = secret.to_base64();

        let mut storage = StorageType::Local;
        if self.vault.is_available() {
            let tags = BTreeMap::from([
                (TAG_KEY_TYPE.to_string(), KeyKind::Symmetric.tag().to_string()),
                (TAG_KEY_LENGTH.to_string(), bits.to_string()),
                (TAG_CREATED_BY.to_string(), CREATED_BY.to_string()),
            ]);
            match self.vault.create_secret(name, &encoded, &tags) {
                Ok(()) => storage = StorageType::Secret,
                Err(e) => warn!(key = %name, error = %e, "mirroring secret to vault failed, keeping it local"),
            }
        } else {
            debug!(key = %name, "vault unavailable, symmetric key stays local");
        }

        let created_at = Utc::now();
        let record = KeyRecord {
            name: name.to_string(),
            kind: KeyKind::Symmetric,
            secret: Some(encoded),
            public_key_pem: None,
            private_key_pem: None,
            size_bits: bits,
            curve: None,
            key_id: local_key_id(name),
            storage,
            created_at,
        };
        let key = Key {
            name: name.to_string(),
            created_at,
            storage,
            enabled: true,
            material: KeyMaterial::Symmetric { secret },
        };
        Ok((key, record))
    }

    fn create_pair(
        &self,
        name: &str,
        bits: u32,
        curve: Option<NominalCurve>,
    ) -> Result<(Key, KeyRecord)> {
        let kind = if curve.is_some() {
            KeyKind::CurveMapped
        } else {
            KeyKind::Asymmetric
        };

        if self.vault.is_available() {
            let mut tags = BTreeMap::from([
                (TAG_KEY_TYPE.to_string(), kind.tag().to_string()),
                (TAG_CREATED_BY.to_string(), CREATED_BY.to_string()),
            ]);
            if let Some(c) = &curve {
                tags.insert(TAG_CURVE.to_string(), c.to_string());
            }

            match self
                .vault
                .create_asymmetric_key(name, bits, &KeyOperation::ALL, &tags)
            {
                Ok(remote) => {
                    let key = key_from_remote(name, remote, curve)?;
                    let record = cached_record(&key, kind);
                    return Ok((key, record));
                }
                Err(e) => {
                    warn!(key = %name, error = %e, "vault key creation failed, generating pair locally");
                }
            }
        } else {
            debug!(key = %name, "vault unavailable, generating pair locally");
        }

        self.generate_local_pair(name, bits, curve, kind)
    }

    fn generate_local_pair(
        &self,
        name: &str,
        bits: u32,
        curve: Option<NominalCurve>,
        kind: KeyKind,
    ) -> Result<(Key, KeyRecord)> {
        let private = RsaPrivateKey::new(&mut OsRng, bits as usize).map_err(|e| {
            EnvaultError::KeyGeneration {
                reason: format!("RSA-{bits} generation failed: {e}"),
            }
        })?;
        let public = RsaPublicKey::from(&private);

        let public_key_pem = public_key_encoder::encode(&PublicKeyCoordinates::Rsa {
            modulus: public.n().to_bytes_be(),
            exponent: public.e().to_bytes_be(),
        })?;
        let private_key_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| EnvaultError::KeyGeneration {
                reason: format!("Private key encoding failed: {e}"),
            })?;

        let created_at = Utc::now();
        let key_id = local_key_id(name);
        let record = KeyRecord {
            name: name.to_string(),
            kind,
            secret: None,
            public_key_pem: Some(public_key_pem.clone()),
            private_key_pem: Some(private_key_pem.to_string()),
            size_bits: bits,
            curve: curve.clone(),
            key_id: key_id.clone(),
            storage: StorageType::Local,
            created_at,
        };
        let key = Key {
            name: name.to_string(),
            created_at,
            storage: StorageType::Local,
            enabled: true,
            material: KeyMaterial::Asymmetric {
                key_id,
                size_bits: bits,
                key_ops: KeyOperation::ALL.to_vec(),
                public_key_pem,
                curve,
            },
        };
        Ok((key, record))
    }

    fn lookup_remote(&self, name: &str) -> Result<Lookup> {
        let asymmetric_error = match self.vault.get_asymmetric_key(name) {
            Ok(remote) => return Ok(Lookup::Found(key_from_remote(name, remote, None)?)),
            Err(e) => e,
        };

        match self.vault.get_secret(name) {
            Ok(secret) => Ok(Lookup::Found(key_from_secret(name, secret)?)),
            Err(RemoteError::NotFound) if asymmetric_error == RemoteError::NotFound => {
                Ok(Lookup::Absent)
            }
            Err(secret_error) => Ok(Lookup::Transient(format!(
                "key lookup: {asymmetric_error}; secret lookup: {secret_error}"
            ))),
        }
    }
}

/// Vault names: 1-127 characters of `[A-Za-z0-9-]`.
pub fn validate_key_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EnvaultError::InvalidInput {
            detail: "Key name is required".into(),
        });
    }
    if name.len() > MAX_KEY_NAME_LEN {
        return Err(EnvaultError::InvalidInput {
            detail: format!("Key name is longer than {MAX_KEY_NAME_LEN} characters"),
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(EnvaultError::InvalidInput {
            detail: format!("Key name '{name}' may only contain letters, digits and '-'"),
        });
    }
    Ok(())
}

fn not_found(name: &str) -> EnvaultError {
    EnvaultError::KeyNotFound {
        name: name.to_string(),
    }
}

fn local_key_id(name: &str) -> String {
    format!("local:{name}")
}

fn key_from_remote(
    name: &str,
    remote: RemoteKey,
    requested_curve: Option<NominalCurve>,
) -> Result<Key> {
    let coordinates = PublicKeyCoordinates::from_jwk(&remote.jwk)?;
    let public_key_pem = public_key_encoder::encode(&coordinates)?;

    let curve = requested_curve
        .or_else(|| nominal_curve(&remote.tags))
        .or(match &coordinates {
            PublicKeyCoordinates::Ec { curve, .. } => Some(NominalCurve::from(*curve)),
            PublicKeyCoordinates::Rsa { .. } => None,
        });

    let mut key_ops: Vec<KeyOperation> = remote
        .jwk
        .key_ops
        .iter()
        .filter_map(|op| {
            KeyOperation::ALL
                .into_iter()
                .find(|known| known.as_str() == op)
        })
        .collect();
    if key_ops.is_empty() {
        key_ops = KeyOperation::ALL.to_vec();
    }

    Ok(Key {
        name: name.to_string(),
        created_at: remote.created.unwrap_or_else(Utc::now),
        storage: StorageType::Key,
        enabled: remote.enabled,
        material: KeyMaterial::Asymmetric {
            key_id: remote.id,
            size_bits: coordinates.size_bits(),
            key_ops,
            public_key_pem,
            curve,
        },
    })
}

/// Curve-type keys are RSA in the vault; the tags remember the curve.
fn nominal_curve(tags: &BTreeMap<String, String>) -> Option<NominalCurve> {
    if tags.get(TAG_KEY_TYPE).map(String::as_str) != Some(KeyKind::CurveMapped.tag()) {
        return None;
    }
    match tags.get(TAG_CURVE) {
        Some(name) => name.parse().ok(),
        None => Some(Curve::P256.into()),
    }
}

fn key_from_secret(name: &str, secret: RemoteSecret) -> Result<Key> {
    let value = SymmetricSecret::from_base64(&secret.value)?;
    if value.len() != 16 && value.len() != 32 {
        return Err(EnvaultError::InvalidKeyFormat {
            detail: format!(
                "Secret '{name}' holds {} bytes; symmetric keys are 16 or 32 bytes",
                value.len()
            ),
        });
    }
    Ok(Key {
        name: name.to_string(),
        created_at: secret.created.unwrap_or_else(Utc::now),
        storage: StorageType::Secret,
        enabled: secret.enabled,
        material: KeyMaterial::Symmetric { secret: value },
    })
}

/// Local cache row for a pair that lives in the vault.
fn cached_record(key: &Key, kind: KeyKind) -> KeyRecord {
    let (key_id, size_bits, public_key_pem, curve) = match &key.material {
        KeyMaterial::Asymmetric {
            key_id,
            size_bits,
            public_key_pem,
            curve,
            ..
        } => (
            key_id.clone(),
            *size_bits,
            Some(public_key_pem.clone()),
            curve.clone(),
        ),
        KeyMaterial::Symmetric { .. } => (local_key_id(&key.name), 0, None, None),
    };
    KeyRecord {
        name: key.name.clone(),
        kind,
        secret: None,
        public_key_pem,
        private_key_pem: None,
        size_bits,
        curve,
        key_id,
        storage: StorageType::Key,
        created_at: key.created_at,
    }
}
