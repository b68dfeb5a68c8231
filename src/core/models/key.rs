use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::core::errors::{EnvaultError, Result};

/// The three key kinds a caller can ask for.
///
/// Serialized with the short tags the vault tags and the local
/// registry use (`AES`, `RSA`, `EC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    #[serde(rename = "AES")]
    Symmetric,
    #[serde(rename = "RSA")]
    Asymmetric,
    #[serde(rename = "EC")]
    CurveMapped,
}

impl KeyKind {
    pub fn tag(&self) -> &'static str {
        match self {
            KeyKind::Symmetric => "AES",
            KeyKind::Asymmetric => "RSA",
            KeyKind::CurveMapped => "EC",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for KeyKind {
    type Err = EnvaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes" | "symmetric" => Ok(KeyKind::Symmetric),
            "rsa" | "asymmetric" => Ok(KeyKind::Asymmetric),
            "ec" | "curve" => Ok(KeyKind::CurveMapped),
            _ => Err(EnvaultError::UnsupportedKeyType {
                key_type: s.to_string(),
            }),
        }
    }
}

/// Named curves accepted for curve-type keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Curve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
    #[serde(rename = "P-256K")]
    P256K,
}

impl Curve {
    pub const ALL: [Curve; 4] = [Curve::P256, Curve::P384, Curve::P521, Curve::P256K];

    pub fn name(&self) -> &'static str {
        match self {
            Curve::P256 => "P-256",
            Curve::P384 => "P-384",
            Curve::P521 => "P-521",
            Curve::P256K => "P-256K",
        }
    }

    /// DER-encoded OID body (without tag and length).
    pub fn oid(&self) -> &'static [u8] {
        match self {
            // 1.2.840.10045.3.1.7
            Curve::P256 => &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07],
            // 1.3.132.0.34
            Curve::P384 => &[0x2B, 0x81, 0x04, 0x00, 0x22],
            // 1.3.132.0.35
            Curve::P521 => &[0x2B, 0x81, 0x04, 0x00, 0x23],
            // 1.3.132.0.10
            Curve::P256K => &[0x2B, 0x81, 0x04, 0x00, 0x0A],
        }
    }

    /// Byte length of one affine coordinate.
    pub fn coordinate_len(&self) -> usize {
        match self {
            Curve::P256 | Curve::P256K => 32,
            Curve::P384 => 48,
            Curve::P521 => 66,
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Curve {
    type Err = EnvaultError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Curve::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| EnvaultError::UnsupportedKeyType {
                key_type: format!("EC curve '{wanted}'"),
            })
    }
}

/// Curve label of a curve-type key.
///
/// Curve-type keys are RSA pairs, so the label is never used for
/// cryptography and any non-empty name is kept as given. Names of
/// supported curves are normalized to their canonical spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NominalCurve(String);

impl NominalCurve {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Curve> for NominalCurve {
    fn from(curve: Curve) -> Self {
        Self(curve.name().to_string())
    }
}

impl fmt::Display for NominalCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NominalCurve {
    type Err = EnvaultError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        if name.is_empty() {
            return Err(EnvaultError::UnsupportedKeyType {
                key_type: "EC curve ''".into(),
            });
        }
        Ok(match name.parse::<Curve>() {
            Ok(curve) => curve.into(),
            Err(_) => Self(name.to_string()),
        })
    }
}

/// Operations an asymmetric key is allowed to perform in the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyOperation {
    Encrypt,
    Decrypt,
    Sign,
    Verify,
}

impl KeyOperation {
    pub const ALL: [KeyOperation; 4] = [
        KeyOperation::Encrypt,
        KeyOperation::Decrypt,
        KeyOperation::Sign,
        KeyOperation::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyOperation::Encrypt => "encrypt",
            KeyOperation::Decrypt => "decrypt",
            KeyOperation::Sign => "sign",
            KeyOperation::Verify => "verify",
        }
    }
}

/// Where a key descriptor was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    /// Remote vault, stored as a secret (symmetric keys).
    Secret,
    /// Remote vault, stored as a key object (asymmetric pairs).
    Key,
    /// Local registry only.
    Local,
}

/// Raw secret bytes of a symmetric key. Wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricSecret(Zeroizing<Vec<u8>>);

impl SymmetricSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| EnvaultError::InvalidKeyFormat {
                detail: format!("Symmetric secret is not valid base64: {e}"),
            })?;
        Ok(Self::new(bytes))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0.as_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for SymmetricSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricSecret({} bytes)", self.0.len())
    }
}

impl Serialize for SymmetricSecret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

/// Key material handed to callers. Private halves have no field here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "material", rename_all = "snake_case")]
pub enum KeyMaterial {
    Symmetric {
        secret: SymmetricSecret,
    },
    Asymmetric {
        key_id: String,
        size_bits: u32,
        key_ops: Vec<KeyOperation>,
        public_key_pem: String,
        /// Nominal curve for curve-type keys, which are backed by RSA.
        curve: Option<NominalCurve>,
    },
}

/// Descriptor of a named key, as returned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Key {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub storage: StorageType,
    pub enabled: bool,
    #[serde(flatten)]
    pub material: KeyMaterial,
}

impl Key {
    pub fn kind(&self) -> KeyKind {
        match &self.material {
            KeyMaterial::Symmetric { .. } => KeyKind::Symmetric,
            KeyMaterial::Asymmetric { curve: None, .. } => KeyKind::Asymmetric,
            KeyMaterial::Asymmetric { curve: Some(_), .. } => KeyKind::CurveMapped,
        }
    }

    /// The secret bytes, if this is a symmetric key.
    pub fn secret(&self) -> Option<&SymmetricSecret> {
        match &self.material {
            KeyMaterial::Symmetric { secret } => Some(secret),
            KeyMaterial::Asymmetric { .. } => None,
        }
    }

    pub fn public_key_pem(&self) -> Option<&str> {
        match &self.material {
            KeyMaterial::Asymmetric { public_key_pem, .. } => Some(public_key_pem),
            KeyMaterial::Symmetric { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kind_accepts_both_vocabularies() {
        assert_eq!("AES".parse::<KeyKind>().unwrap(), KeyKind::Symmetric);
        assert_eq!("symmetric".parse::<KeyKind>().unwrap(), KeyKind::Symmetric);
        assert_eq!("rsa".parse::<KeyKind>().unwrap(), KeyKind::Asymmetric);
        assert_eq!("Curve".parse::<KeyKind>().unwrap(), KeyKind::CurveMapped);
        assert!("DES".parse::<KeyKind>().is_err());
    }

    #[test]
    fn curve_parse_is_case_insensitive() {
        assert_eq!("p-384".parse::<Curve>().unwrap(), Curve::P384);
        assert_eq!("P-256K".parse::<Curve>().unwrap(), Curve::P256K);
        assert!("P-192".parse::<Curve>().is_err());
    }

    #[test]
    fn nominal_curve_keeps_any_name() {
        assert_eq!("p-384".parse::<NominalCurve>().unwrap().as_str(), "P-384");
        assert_eq!("secp256r1".parse::<NominalCurve>().unwrap().as_str(), "secp256r1");
        assert!("  ".parse::<NominalCurve>().is_err());
    }

    #[test]
    fn secret_debug_does_not_leak_bytes() {
        let secret = SymmetricSecret::new(vec![0xAB; 32]);
        let shown = format!("{secret:?}");
        assert_eq!(shown, "SymmetricSecret(32 bytes)");
    }

    #[test]
    fn secret_base64_round_trip() {
        let secret = SymmetricSecret::new((0u8..16).collect());
        let decoded = SymmetricSecret::from_base64(&secret.to_base64()).unwrap();
        assert_eq!(decoded, secret);
    }

    #[test]
    fn kind_reflects_nominal_curve() {
        let key = Key {
            name: "k".into(),
            created_at: Utc::now(),
            storage: StorageType::Local,
            enabled: true,
            material: KeyMaterial::Asymmetric {
                key_id: "local:k".into(),
                size_bits: 2048,
                key_ops: KeyOperation::ALL.to_vec(),
                public_key_pem: String::new(),
                curve: Some(Curve::P384.into()),
            },
        };
        assert_eq!(key.kind(), KeyKind::CurveMapped);
        assert!(key.secret().is_none());
    }
}
