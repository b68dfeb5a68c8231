use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::core::errors::{EnvaultError, Result};

/// Length of the CBC initialization vector, in bytes.
pub const IV_LEN: usize = 16;

/// Length of the per-envelope ephemeral key, in bytes.
pub const EPHEMERAL_KEY_LEN: usize = 32;

/// How the payload key of an envelope is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionType {
    /// Cipher key is the referenced symmetric key itself.
    #[default]
    #[serde(rename = "symmetric", alias = "AES")]
    Symmetric,
    /// Cipher key is an ephemeral key carried in `tempKey`.
    #[serde(rename = "asymmetric-envelope", alias = "RSA")]
    AsymmetricEnvelope,
}

impl EncryptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionType::Symmetric => "symmetric",
            EncryptionType::AsymmetricEnvelope => "asymmetric-envelope",
        }
    }
}

/// The portable encrypted record produced by `envault encrypt`.
///
/// Serialized as a flat JSON object with camelCase members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub encryption_type: EncryptionType,
    /// Base64 ciphertext.
    pub encrypted_data: String,
    /// Hex IV.
    pub iv: String,
    #[serde(default)]
    pub key_name: String,
    /// Base64 ephemeral key; only for `asymmetric-envelope`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_key: Option<String>,
    #[serde(default)]
    pub is_file: bool,
    #[serde(default)]
    pub original_file_name: String,
    #[serde(default)]
    pub original_extension: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub original_size: usize,
    #[serde(default)]
    pub encrypted_size: usize,
    /// Hex HMAC-SHA256 tag. Absent on envelopes from older writers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

/// Decoded binary fields of an envelope, validated for shape.
pub struct EnvelopeParts {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub temp_key: Option<Vec<u8>>,
    pub mac: Option<Vec<u8>>,
}

impl Envelope {
    /// Parse an envelope from raw bytes.
    ///
    /// Accepts the JSON document itself or a base64 encoding of it.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Envelope>(bytes) {
            Ok(envelope) => Ok(envelope),
            Err(json_err) => {
                let text = std::str::from_utf8(bytes).map_err(|_| malformed(json_err.to_string()))?;
                let decoded = STANDARD
                    .decode(text.trim())
                    .map_err(|_| malformed(json_err.to_string()))?;
                serde_json::from_slice(&decoded).map_err(|e| malformed(e.to_string()))
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| malformed(e.to_string()))
    }

    /// Decode and check every binary member needed for decryption.
    pub fn parts(&self) -> Result<EnvelopeParts> {
        if self.encrypted_data.trim().is_empty() {
            return Err(malformed("missing 'encryptedData'"));
        }
        if self.iv.trim().is_empty() {
            return Err(malformed("missing 'iv'"));
        }

        let ciphertext = STANDARD
            .decode(self.encrypted_data.trim())
            .map_err(|e| malformed(format!("'encryptedData' is not base64: {e}")))?;
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(malformed(format!(
                "'encryptedData' must be a non-empty multiple of 16 bytes, got {}",
                ciphertext.len()
            )));
        }

        let iv_bytes =
            hex::decode(self.iv.trim()).map_err(|e| malformed(format!("'iv' is not hex: {e}")))?;
        let iv: [u8; IV_LEN] = iv_bytes
            .try_into()
            .map_err(|v: Vec<u8>| malformed(format!("'iv' must be {IV_LEN} bytes, got {}", v.len())))?;

        let temp_key = match self.encryption_type {
            EncryptionType::Symmetric => None,
            EncryptionType::AsymmetricEnvelope => {
                let encoded = self
                    .temp_key
                    .as_deref()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| malformed("missing 'tempKey' for asymmetric-envelope"))?;
                let key = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| malformed(format!("'tempKey' is not base64: {e}")))?;
                if key.len() != EPHEMERAL_KEY_LEN {
                    return Err(malformed(format!(
                        "'tempKey' must be {EPHEMERAL_KEY_LEN} bytes, got {}",
                        key.len()
                    )));
                }
                Some(key)
            }
        };

        let mac = self
            .mac
            .as_deref()
            .map(|m| hex::decode(m.trim()).map_err(|e| malformed(format!("'mac' is not hex: {e}"))))
            .transpose()?;

        Ok(EnvelopeParts {
            ciphertext,
            iv,
            temp_key,
            mac,
        })
    }
}

fn malformed(detail: impl Into<String>) -> EnvaultError {
    EnvaultError::EnvelopeMalformed {
        detail: detail.into(),
    }
}

/// Plaintext and metadata recovered from an envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Decrypted {
    pub data: Vec<u8>,
    pub is_file: bool,
    pub original_file_name: String,
    pub original_extension: String,
    pub original_size: usize,
    pub decrypted_size: usize,
    pub timestamp: String,
    pub encryption_type: EncryptionType,
}

/// Result of fetching and decrypting a stored envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub decrypted: Decrypted,
    pub location: String,
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            encryption_type: EncryptionType::Symmetric,
            encrypted_data: STANDARD.encode([0u8; 16]),
            iv: hex::encode([1u8; 16]),
            key_name: "doc-key".into(),
            temp_key: None,
            is_file: false,
            original_file_name: String::new(),
            original_extension: String::new(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            original_size: 11,
            encrypted_size: 16,
            mac: None,
        }
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"encryptionType\": \"symmetric\""));
        assert!(json.contains("\"encryptedData\""));
        assert!(json.contains("\"originalSize\": 11"));
        assert!(!json.contains("tempKey"));
    }

    #[test]
    fn legacy_type_tags_are_accepted() {
        let json = r#"{"encryptionType":"RSA","encryptedData":"AAAAAAAAAAAAAAAAAAAAAA==","iv":"00000000000000000000000000000000","tempKey":"x"}"#;
        let env = Envelope::from_slice(json.as_bytes()).unwrap();
        assert_eq!(env.encryption_type, EncryptionType::AsymmetricEnvelope);

        let json = r#"{"encryptionType":"AES","encryptedData":"x","iv":"y"}"#;
        let env = Envelope::from_slice(json.as_bytes()).unwrap();
        assert_eq!(env.encryption_type, EncryptionType::Symmetric);
    }

    #[test]
    fn base64_wrapped_json_is_accepted() {
        let json = serde_json::to_string(&sample()).unwrap();
        let wrapped = STANDARD.encode(json);
        let env = Envelope::from_slice(wrapped.as_bytes()).unwrap();
        assert_eq!(env, sample());
    }

    #[test]
    fn garbage_is_malformed() {
        let err = Envelope::from_slice(b"not an envelope").unwrap_err();
        assert!(matches!(err, EnvaultError::EnvelopeMalformed { .. }));
    }

    #[test]
    fn missing_iv_is_malformed() {
        let err = Envelope::from_slice(br#"{"encryptedData":"AAAA"}"#).unwrap_err();
        assert!(matches!(err, EnvaultError::EnvelopeMalformed { .. }));
    }

    #[test]
    fn parts_rejects_short_iv() {
        let mut env = sample();
        env.iv = "abcd".into();
        assert!(matches!(
            env.parts(),
            Err(EnvaultError::EnvelopeMalformed { .. })
        ));
    }

    #[test]
    fn parts_rejects_partial_block() {
        let mut env = sample();
        env.encrypted_data = STANDARD.encode([0u8; 15]);
        assert!(env.parts().is_err());
    }

    #[test]
    fn parts_requires_temp_key_for_asymmetric() {
        let mut env = sample();
        env.encryption_type = EncryptionType::AsymmetricEnvelope;
        assert!(env.parts().is_err());

        env.temp_key = Some(STANDARD.encode([9u8; 32]));
        let parts = env.parts().unwrap();
        assert_eq!(parts.temp_key.unwrap().len(), 32);
        assert_eq!(parts.iv, [1u8; 16]);
    }
}
