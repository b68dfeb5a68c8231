use crate::core::errors::{EnvaultError, Result};
use crate::core::models::key::{Curve, KeyKind, NominalCurve};

/// Allowed symmetric key lengths, in bits.
pub const SYMMETRIC_BITS: [u32; 2] = [128, 256];

/// Allowed RSA modulus sizes, in bits.
pub const ASYMMETRIC_BITS: [u32; 3] = [2048, 3072, 4096];

/// Modulus size used for every curve-type key.
pub const CURVE_MAPPED_BITS: u32 = 2048;

/// Fallbacks used when a create request omits type or size.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDefaults {
    pub key_type: KeyKind,
    pub symmetric_bits: u32,
    pub asymmetric_bits: u32,
    pub curve: NominalCurve,
}

impl Default for KeyDefaults {
    fn default() -> Self {
        Self {
            key_type: KeyKind::Symmetric,
            symmetric_bits: 256,
            asymmetric_bits: 2048,
            curve: Curve::P256.into(),
        }
    }
}

/// A validated key creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    Symmetric { bits: u32 },
    Asymmetric { bits: u32 },
    /// Backed by a `CURVE_MAPPED_BITS` RSA pair whatever curve was asked
    /// for; the curve is only a label.
    CurveMapped { curve: NominalCurve },
}

impl KeySpec {
    /// Validate a requested key type and size (or curve name).
    pub fn validate(
        key_type: Option<&str>,
        size_or_curve: Option<&str>,
        defaults: &KeyDefaults,
    ) -> Result<Self> {
        let kind = match key_type.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.parse::<KeyKind>()?,
            None => defaults.key_type,
        };
        let requested = size_or_curve.map(str::trim).filter(|s| !s.is_empty());

        match kind {
            KeyKind::Symmetric => {
                let bits = parse_bits(kind, requested, defaults.symmetric_bits)?;
                check_allowed(kind, bits, &SYMMETRIC_BITS)?;
                Ok(KeySpec::Symmetric { bits })
            }
            KeyKind::Asymmetric => {
                let bits = parse_bits(kind, requested, defaults.asymmetric_bits)?;
                check_allowed(kind, bits, &ASYMMETRIC_BITS)?;
                Ok(KeySpec::Asymmetric { bits })
            }
            KeyKind::CurveMapped => {
                let curve = match requested {
                    Some(name) => name.parse::<NominalCurve>()?,
                    None => defaults.curve.clone(),
                };
                Ok(KeySpec::CurveMapped { curve })
            }
        }
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            KeySpec::Symmetric { .. } => KeyKind::Symmetric,
            KeySpec::Asymmetric { .. } => KeyKind::Asymmetric,
            KeySpec::CurveMapped { .. } => KeyKind::CurveMapped,
        }
    }

    /// Key size in bits as it is actually generated.
    pub fn size_bits(&self) -> u32 {
        match self {
            KeySpec::Symmetric { bits } | KeySpec::Asymmetric { bits } => *bits,
            KeySpec::CurveMapped { .. } => CURVE_MAPPED_BITS,
        }
    }
}

fn parse_bits(kind: KeyKind, requested: Option<&str>, default: u32) -> Result<u32> {
    match requested {
        None => Ok(default),
        Some(raw) => raw.parse::<u32>().map_err(|_| EnvaultError::InvalidKeyLength {
            key_type: kind.to_string(),
            length: raw.to_string(),
            allowed: allowed_list(kind),
        }),
    }
}

fn check_allowed(kind: KeyKind, bits: u32, allowed: &[u32]) -> Result<()> {
    if allowed.contains(&bits) {
        Ok(())
    } else {
        Err(EnvaultError::InvalidKeyLength {
            key_type: kind.to_string(),
            length: bits.to_string(),
            allowed: allowed_list(kind),
        })
    }
}

fn allowed_list(kind: KeyKind) -> String {
    let values: Vec<String> = match kind {
        KeyKind::Symmetric => SYMMETRIC_BITS.iter().map(u32::to_string).collect(),
        KeyKind::Asymmetric => ASYMMETRIC_BITS.iter().map(u32::to_string).collect(),
        KeyKind::CurveMapped => Curve::ALL.iter().map(|c| c.name().to_string()).collect(),
    };
    values.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(t: &str, s: &str) -> Result<KeySpec> {
        KeySpec::validate(Some(t), Some(s), &KeyDefaults::default())
    }

    #[test]
    fn symmetric_lengths() {
        assert_eq!(validate("AES", "128").unwrap(), KeySpec::Symmetric { bits: 128 });
        assert_eq!(validate("AES", "256").unwrap(), KeySpec::Symmetric { bits: 256 });
        assert!(matches!(
            validate("AES", "192"),
            Err(EnvaultError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn asymmetric_sizes() {
        for bits in ASYMMETRIC_BITS {
            assert_eq!(
                validate("RSA", &bits.to_string()).unwrap(),
                KeySpec::Asymmetric { bits }
            );
        }
        assert!(validate("RSA", "1024").is_err());
    }

    #[test]
    fn non_numeric_length_is_invalid_length() {
        assert!(matches!(
            validate("symmetric", "big"),
            Err(EnvaultError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn curve_maps_to_fixed_rsa_size() {
        let spec = validate("curve", "P-384").unwrap();
        assert_eq!(spec, KeySpec::CurveMapped { curve: Curve::P384.into() });
        assert_eq!(spec.size_bits(), 2048);
        assert_eq!(spec.kind(), KeyKind::CurveMapped);
    }

    #[test]
    fn any_curve_name_maps_to_the_same_pair() {
        let spec = validate("EC", "secp256r1").unwrap();
        assert_eq!(spec.size_bits(), 2048);
        match spec {
            KeySpec::CurveMapped { curve } => assert_eq!(curve.as_str(), "secp256r1"),
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_unsupported() {
        assert!(matches!(
            validate("DSA", "1024"),
            Err(EnvaultError::UnsupportedKeyType { .. })
        ));
    }

    #[test]
    fn defaults_fill_missing_values() {
        let defaults = KeyDefaults::default();
        assert_eq!(
            KeySpec::validate(None, None, &defaults).unwrap(),
            KeySpec::Symmetric { bits: 256 }
        );
        assert_eq!(
            KeySpec::validate(Some("RSA"), None, &defaults).unwrap(),
            KeySpec::Asymmetric { bits: 2048 }
        );
        assert_eq!(
            KeySpec::validate(Some("EC"), Some(""), &defaults).unwrap(),
            KeySpec::CurveMapped { curve: Curve::P256.into() }
        );
    }
}
