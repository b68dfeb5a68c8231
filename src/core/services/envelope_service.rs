use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::core::errors::{EnvaultError, Result};
use crate::core::models::envelope::{
    Decrypted, EPHEMERAL_KEY_LEN, EncryptionType, Envelope, RetrievedDocument,
};
use crate::core::models::key::{Key, KeyMaterial};
use crate::core::models::stored_object::StoredObject;
use crate::core::services::block_cipher;
use crate::core::services::key_registry::KeyRegistry;
use crate::core::traits::local_registry::LocalKeyRegistry;
use crate::core::traits::object_storage::ObjectStorage;
use crate::core::traits::remote_vault::RemoteKeyVault;

/// Default payload cap: 100 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 100 * 1024 * 1024;

static TRAILING_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d{13,14}$").expect("valid timestamp pattern"));
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\s().\-_]").expect("valid character class"));

/// Encrypts and decrypts payloads with keys resolved through a `KeyRegistry`.
pub struct EnvelopeService<V: RemoteKeyVault, R: LocalKeyRegistry> {
    pub registry: KeyRegistry<V, R>,
    pub max_payload_bytes: usize,
}

impl<V: RemoteKeyVault, R: LocalKeyRegistry> EnvelopeService<V, R> {
    pub fn new(registry: KeyRegistry<V, R>) -> Self {
        Self {
            registry,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn with_max_payload(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    /// Encrypt `payload` under the key called `key_name`.
    ///
    /// Symmetric keys encrypt directly. Asymmetric keys get a fresh
    /// ephemeral key which travels in the envelope's `tempKey` member.
    pub fn encrypt(
        &self,
        payload: &[u8],
        key_name: &str,
        is_file: bool,
        original_file_name: Option<&str>,
    ) -> Result<Envelope> {
        if payload.len() > self.max_payload_bytes {
            return Err(EnvaultError::payload_too_large(
                payload.len(),
                self.max_payload_bytes,
            ));
        }
        if key_name.trim().is_empty() {
            return Err(EnvaultError::InvalidInput {
                detail: "Key name is required".into(),
            });
        }

        let key = self.registry.get_key(key_name)?;
        let (encryption_type, cipher_key, temp_key) = match &key.material {
            KeyMaterial::Symmetric { secret } => (
                EncryptionType::Symmetric,
                Zeroizing::new(secret.as_bytes().to_vec()),
                None,
            ),
            KeyMaterial::Asymmetric { .. } => {
                let ephemeral = block_cipher::random_bytes(EPHEMERAL_KEY_LEN);
                let encoded = STANDARD.encode(ephemeral.as_slice());
                (EncryptionType::AsymmetricEnvelope, ephemeral, Some(encoded))
            }
        };

        let iv = block_cipher::random_iv();
        let ciphertext = block_cipher::encrypt_cbc(&cipher_key, &iv, payload)?;
        let mac = block_cipher::envelope_tag(&cipher_key, encryption_type.as_str(), &iv, &ciphertext);

        let original_file_name = original_file_name.unwrap_or_default().to_string();
        let original_extension = if is_file {
            extension_with_dot(&original_file_name)
        } else {
            String::new()
        };

        info!(
            key = %key_name,
            kind = %key.kind(),
            encryption_type = encryption_type.as_str(),
            size = payload.len(),
            "payload encrypted"
        );

        Ok(Envelope {
            encryption_type,
            encrypted_size: ciphertext.len(),
            encrypted_data: STANDARD.encode(&ciphertext),
            iv: hex::encode(iv),
            key_name: key_name.to_string(),
            temp_key,
            is_file,
            original_file_name,
            original_extension,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            original_size: payload.len(),
            mac: Some(hex::encode(mac)),
        })
    }

    /// Decrypt an envelope.
    ///
    /// `key_name` overrides the envelope's own `keyName` for symmetric
    /// envelopes; asymmetric envelopes need no key lookup at all.
    pub fn decrypt(&self, envelope: &Envelope, key_name: Option<&str>) -> Result<Decrypted> {
        let parts = envelope.parts()?;

        let cipher_key = match envelope.encryption_type {
            EncryptionType::AsymmetricEnvelope => {
                let temp_key = parts.temp_key.ok_or_else(|| EnvaultError::EnvelopeMalformed {
                    detail: "missing 'tempKey' for asymmetric-envelope".into(),
                })?;
                Zeroizing::new(temp_key)
            }
            EncryptionType::Symmetric => {
                let name = key_name
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(envelope.key_name.as_str());
                if name.is_empty() {
                    return Err(EnvaultError::InvalidInput {
                        detail: "No key given and the envelope names none".into(),
                    });
                }
                symmetric_bytes(&self.registry.get_key(name)?)?
            }
        };

        match &parts.mac {
            Some(tag) => block_cipher::verify_envelope_tag(
                &cipher_key,
                envelope.encryption_type.as_str(),
                &parts.iv,
                &parts.ciphertext,
                tag,
            )?,
            None => debug!("envelope carries no integrity tag, relying on padding check"),
        }

        let data = block_cipher::decrypt_cbc(&cipher_key, &parts.iv, &parts.ciphertext)?;
        info!(
            key = %envelope.key_name,
            encryption_type = envelope.encryption_type.as_str(),
            size = data.len(),
            "envelope decrypted"
        );

        Ok(Decrypted {
            decrypted_size: data.len(),
            data,
            is_file: envelope.is_file,
            original_file_name: envelope.original_file_name.clone(),
            original_extension: envelope.original_extension.clone(),
            original_size: envelope.original_size,
            timestamp: envelope.timestamp.clone(),
            encryption_type: envelope.encryption_type,
        })
    }

    /// Fetch a stored envelope and decrypt it.
    pub fn retrieve_document(
        &self,
        storage: &dyn ObjectStorage,
        name: &str,
        key_name: Option<&str>,
        location: Option<&str>,
    ) -> Result<RetrievedDocument> {
        info!(object = %name, location = ?location, "retrieving document");
        let object = storage.download(name, location)?;
        let envelope = Envelope::from_slice(&object.data)?;
        let decrypted = self.decrypt(&envelope, key_name)?;

        Ok(RetrievedDocument {
            decrypted,
            location: object.location,
            metadata: object.metadata,
        })
    }

    /// Upload an envelope under a name derived from its original file name.
    pub fn store_envelope(
        &self,
        envelope: &Envelope,
        storage: &dyn ObjectStorage,
        location: Option<&str>,
    ) -> Result<StoredObject> {
        let source = if envelope.original_file_name.trim().is_empty() {
            warn!(key = %envelope.key_name, "envelope has no file name, naming object after its key");
            format!("{}-data", envelope.key_name)
        } else {
            envelope.original_file_name.clone()
        };
        let name = clean_encrypted_filename(&source);

        let metadata = BTreeMap::from([
            ("keyName".to_string(), envelope.key_name.clone()),
            ("originalFileName".to_string(), envelope.original_file_name.clone()),
            ("originalExtension".to_string(), envelope.original_extension.clone()),
            ("timestamp".to_string(), envelope.timestamp.clone()),
            ("encryptionType".to_string(), envelope.encryption_type.as_str().to_string()),
        ]);

        let stored = storage.upload(&name, envelope.to_json()?.as_bytes(), &metadata, location)?;
        info!(object = %stored.name, location = %stored.location, "envelope stored");
        Ok(stored)
    }
}

/// Storage name for an encrypted upload of `original`.
///
/// `reports/Q1 Plan-1700000000000.pdf` becomes `Q1 Plan.enc`.
pub fn clean_encrypted_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = TRAILING_TIMESTAMP.replace(&stem, "");
    let cleaned = UNSAFE_CHARS.replace_all(&stem, "_");
    format!("{cleaned}.enc")
}

fn extension_with_dot(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

fn symmetric_bytes(key: &Key) -> Result<Zeroizing<Vec<u8>>> {
    match key.secret() {
        Some(secret) => Ok(Zeroizing::new(secret.as_bytes().to_vec())),
        None => Err(EnvaultError::DecryptionFailure {
            reason: format!(
                "key '{}' is {} but the envelope is symmetric",
                key.name,
                key.kind()
            ),
        }),
    }
}
