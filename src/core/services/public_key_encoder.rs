//! Hand-built SubjectPublicKeyInfo encoder.
//!
//! Vault keys arrive as raw JWK coordinates. Callers want a PEM that any
//! standard loader can read, so the DER is assembled byte by byte here.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

use crate::core::errors::{EnvaultError, Result};
use crate::core::models::key::Curve;
use crate::core::models::remote::JsonWebKey;

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;

/// 1.2.840.113549.1.1.1
const RSA_ENCRYPTION_OID: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];

/// 1.2.840.10045.2.1
const EC_PUBLIC_KEY_OID: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];

const PEM_LINE_WIDTH: usize = 64;
const PEM_LABEL: &str = "PUBLIC KEY";

/// Raw public key coordinates, big-endian unsigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyCoordinates {
    Rsa { modulus: Vec<u8>, exponent: Vec<u8> },
    Ec { curve: Curve, x: Vec<u8>, y: Vec<u8> },
}

impl PublicKeyCoordinates {
    /// Extract coordinates from a vault JSON Web Key.
    pub fn from_jwk(jwk: &JsonWebKey) -> Result<Self> {
        match jwk.kty.as_str() {
            "RSA" | "RSA-HSM" => Ok(Self::Rsa {
                modulus: decode_member(jwk.n.as_deref(), "n")?,
                exponent: decode_member(jwk.e.as_deref(), "e")?,
            }),
            "EC" | "EC-HSM" => {
                let crv = jwk.crv.as_deref().ok_or_else(|| invalid("EC key has no 'crv'"))?;
                let curve = crv
                    .parse::<Curve>()
                    .map_err(|_| invalid(format!("Unsupported curve: {crv}")))?;
                Ok(Self::Ec {
                    curve,
                    x: decode_member(jwk.x.as_deref(), "x")?,
                    y: decode_member(jwk.y.as_deref(), "y")?,
                })
            }
            other => Err(invalid(format!("Unsupported key type '{other}' from vault"))),
        }
    }

    /// Modulus size in bits (RSA) or curve field size in bits (EC).
    pub fn size_bits(&self) -> u32 {
        match self {
            Self::Rsa { modulus, .. } => {
                let trimmed = strip_leading_zeros(modulus);
                match trimmed.first() {
                    Some(first) => {
                        (trimmed.len() as u32 - 1) * 8 + (8 - first.leading_zeros())
                    }
                    None => 0,
                }
            }
            Self::Ec { curve, .. } => match curve {
                Curve::P256 | Curve::P256K => 256,
                Curve::P384 => 384,
                Curve::P521 => 521,
            },
        }
    }
}

fn decode_member(value: Option<&str>, member: &str) -> Result<Vec<u8>> {
    let raw = value.ok_or_else(|| invalid(format!("Missing '{member}' in vault key")))?;
    URL_SAFE_NO_PAD
        .decode(raw.trim().trim_end_matches('='))
        .map_err(|e| invalid(format!("'{member}' is not base64url: {e}")))
}

fn invalid(detail: impl Into<String>) -> EnvaultError {
    EnvaultError::InvalidKeyFormat {
        detail: detail.into(),
    }
}

/// Encode coordinates as a PEM `PUBLIC KEY` block.
pub fn encode(coordinates: &PublicKeyCoordinates) -> Result<String> {
    Ok(to_pem(&encode_der(coordinates)?))
}

/// Encode coordinates as DER SubjectPublicKeyInfo.
pub fn encode_der(coordinates: &PublicKeyCoordinates) -> Result<Vec<u8>> {
    match coordinates {
        PublicKeyCoordinates::Rsa { modulus, exponent } => {
            if strip_leading_zeros(modulus).is_empty() {
                return Err(invalid("Invalid RSA key: missing modulus"));
            }
            if strip_leading_zeros(exponent).is_empty() {
                return Err(invalid("Invalid RSA key: missing exponent"));
            }

            let mut body = integer(modulus);
            body.extend(integer(exponent));
            let rsa_public_key = tlv(TAG_SEQUENCE, &body);

            let mut algorithm = tlv(TAG_OID, RSA_ENCRYPTION_OID);
            algorithm.extend(tlv(TAG_NULL, &[]));

            Ok(subject_public_key_info(&algorithm, &rsa_public_key))
        }
        PublicKeyCoordinates::Ec { curve, x, y } => {
            let size = curve.coordinate_len();
            if x.len() != size || y.len() != size {
                return Err(invalid(format!(
                    "Invalid EC point for {curve}: expected {size}-byte coordinates, got x={} y={}",
                    x.len(),
                    y.len()
                )));
            }

            let mut point = Vec::with_capacity(1 + 2 * size);
            point.push(0x04);
            point.extend_from_slice(x);
            point.extend_from_slice(y);

            let mut algorithm = tlv(TAG_OID, EC_PUBLIC_KEY_OID);
            algorithm.extend(tlv(TAG_OID, curve.oid()));

            Ok(subject_public_key_info(&algorithm, &point))
        }
    }
}

fn subject_public_key_info(algorithm_body: &[u8], key_bytes: &[u8]) -> Vec<u8> {
    let mut bit_string = Vec::with_capacity(key_bytes.len() + 1);
    bit_string.push(0x00); // no unused bits
    bit_string.extend_from_slice(key_bytes);

    let mut body = tlv(TAG_SEQUENCE, algorithm_body);
    body.extend(tlv(TAG_BIT_STRING, &bit_string));
    tlv(TAG_SEQUENCE, &body)
}

/// DER length octets: short form below 128, long form otherwise.
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes: Vec<u8> = len
        .to_be_bytes()
        .into_iter()
        .skip_while(|b| *b == 0)
        .collect();
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(0x80 | bytes.len() as u8);
    out.extend(bytes);
    out
}

fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 6);
    out.push(tag);
    out.extend(encode_length(value.len()));
    out.extend_from_slice(value);
    out
}

/// Unsigned big-endian bytes as a minimal positive DER INTEGER.
fn integer(unsigned: &[u8]) -> Vec<u8> {
    let trimmed = strip_leading_zeros(unsigned);
    let mut value = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.first().is_some_and(|b| b & 0x80 != 0) {
        value.push(0x00);
    }
    value.extend_from_slice(trimmed);
    tlv(TAG_INTEGER, &value)
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Wrap DER in PEM armor with 64-character lines.
pub fn to_pem(der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut lines = Vec::with_capacity(encoded.len() / PEM_LINE_WIDTH + 3);
    lines.push(format!("-----BEGIN {PEM_LABEL}-----"));
    // base64 output is ASCII, so byte chunks are valid str slices
    for chunk in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
        lines.push(String::from_utf8_lossy(chunk).into_owned());
    }
    lines.push(format!("-----END {PEM_LABEL}-----"));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
    use rsa::traits::PublicKeyParts;
    use rsa::{RsaPrivateKey, RsaPublicKey};

    #[test]
    fn length_short_and_long_forms() {
        assert_eq!(encode_length(0), vec![0x00]);
        assert_eq!(encode_length(127), vec![0x7F]);
        assert_eq!(encode_length(128), vec![0x81, 0x80]);
        assert_eq!(encode_length(255), vec![0x81, 0xFF]);
        assert_eq!(encode_length(256), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode_length(65_536), vec![0x83, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn integer_adds_sign_byte_and_strips_padding() {
        assert_eq!(integer(&[0x80]), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(integer(&[0x00, 0x00, 0x7F]), vec![0x02, 0x01, 0x7F]);
        assert_eq!(integer(&[0x01, 0x00, 0x01]), vec![0x02, 0x03, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn small_rsa_key_known_vector() {
        // n = 0xC3 (high bit set, needs a sign byte), e = 3
        let der = encode_der(&PublicKeyCoordinates::Rsa {
            modulus: vec![0xC3],
            exponent: vec![0x03],
        })
        .unwrap();
        let expected: Vec<u8> = vec![
            0x30, 0x1B, // SubjectPublicKeyInfo
            0x30, 0x0D, 0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01, 0x05,
            0x00, // AlgorithmIdentifier
            0x03, 0x0A, 0x00, // BIT STRING, 0 unused bits
            0x30, 0x07, 0x02, 0x02, 0x00, 0xC3, 0x02, 0x01, 0x03, // RSAPublicKey
        ];
        assert_eq!(der, expected);
    }

    #[test]
    fn rsa_output_matches_standard_encoder() {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = RsaPublicKey::from(&private);

        let pem = encode(&PublicKeyCoordinates::Rsa {
            modulus: public.n().to_bytes_be(),
            exponent: public.e().to_bytes_be(),
        })
        .unwrap();

        let reference = public.to_public_key_pem(LineEnding::LF).unwrap();
        assert_eq!(pem.trim_end(), reference.trim_end());

        let parsed = RsaPublicKey::from_public_key_pem(&pem).unwrap();
        assert_eq!(parsed.n(), public.n());
        assert_eq!(parsed.e(), public.e());
    }

    #[test]
    fn rsa_pem_lines_are_64_chars() {
        let modulus = vec![0xE1; 256];
        let pem = encode(&PublicKeyCoordinates::Rsa {
            modulus,
            exponent: vec![0x01, 0x00, 0x01],
        })
        .unwrap();

        let lines: Vec<&str> = pem.lines().collect();
        assert_eq!(lines.first(), Some(&"-----BEGIN PUBLIC KEY-----"));
        assert_eq!(lines.last(), Some(&"-----END PUBLIC KEY-----"));
        let body = &lines[1..lines.len() - 1];
        assert!(body[..body.len() - 1].iter().all(|l| l.len() == 64));
        assert!(body.last().unwrap().len() <= 64);
    }

    #[test]
    fn ec_point_round_trips_through_p256() {
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        use p256::pkcs8::{DecodePublicKey as _, EncodePublicKey as _};

        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key();
        let point = public.to_encoded_point(false);

        let pem = encode(&PublicKeyCoordinates::Ec {
            curve: Curve::P256,
            x: point.x().unwrap().to_vec(),
            y: point.y().unwrap().to_vec(),
        })
        .unwrap();

        let parsed = p256::PublicKey::from_public_key_pem(&pem).unwrap();
        assert_eq!(parsed, public);

        let reference = public
            .to_public_key_pem(p256::pkcs8::LineEnding::LF)
            .unwrap();
        assert_eq!(pem.trim_end(), reference.trim_end());
    }

    #[test]
    fn ec_point_round_trips_through_p384() {
        use p384::elliptic_curve::sec1::ToEncodedPoint;
        use p384::pkcs8::{DecodePublicKey as _, EncodePublicKey as _};

        let secret = p384::SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key();
        let point = public.to_encoded_point(false);

        let pem = encode(&PublicKeyCoordinates::Ec {
            curve: Curve::P384,
            x: point.x().unwrap().to_vec(),
            y: point.y().unwrap().to_vec(),
        })
        .unwrap();

        let parsed = p384::PublicKey::from_public_key_pem(&pem).unwrap();
        assert_eq!(parsed, public);

        let reference = public
            .to_public_key_pem(p384::pkcs8::LineEnding::LF)
            .unwrap();
        assert_eq!(pem.trim_end(), reference.trim_end());
    }

    #[test]
    fn p521_uses_long_form_lengths() {
        let x = vec![0x01; 66];
        let y = vec![0x02; 66];
        let der = encode_der(&PublicKeyCoordinates::Ec {
            curve: Curve::P521,
            x: x.clone(),
            y: y.clone(),
        })
        .unwrap();

        let mut expected: Vec<u8> = vec![
            0x30, 0x81, 0x9B, // SubjectPublicKeyInfo, 155 bytes
            0x30, 0x10, // AlgorithmIdentifier
            0x06, 0x07, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01, // id-ecPublicKey
            0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x23, // secp521r1
            0x03, 0x81, 0x86, 0x00, // BIT STRING, 134 bytes
            0x04, // uncompressed point
        ];
        expected.extend_from_slice(&x);
        expected.extend_from_slice(&y);
        assert_eq!(der.len(), 158);
        assert_eq!(der, expected);
    }

    #[test]
    fn missing_modulus_is_invalid() {
        let err = encode(&PublicKeyCoordinates::Rsa {
            modulus: vec![],
            exponent: vec![0x03],
        })
        .unwrap_err();
        assert!(matches!(err, EnvaultError::InvalidKeyFormat { .. }));
    }

    #[test]
    fn short_ec_coordinate_is_invalid() {
        let err = encode(&PublicKeyCoordinates::Ec {
            curve: Curve::P384,
            x: vec![1; 32],
            y: vec![2; 48],
        })
        .unwrap_err();
        assert!(matches!(err, EnvaultError::InvalidKeyFormat { .. }));
    }

    #[test]
    fn jwk_decoding() {
        let jwk = JsonWebKey {
            kty: "RSA".into(),
            n: Some(URL_SAFE_NO_PAD.encode([0xC3, 0x01])),
            e: Some("AQAB".into()),
            ..JsonWebKey::default()
        };
        let coords = PublicKeyCoordinates::from_jwk(&jwk).unwrap();
        assert_eq!(
            coords,
            PublicKeyCoordinates::Rsa {
                modulus: vec![0xC3, 0x01],
                exponent: vec![0x01, 0x00, 0x01],
            }
        );
        assert_eq!(coords.size_bits(), 16);

        let missing = JsonWebKey {
            kty: "RSA".into(),
            e: Some("AQAB".into()),
            ..JsonWebKey::default()
        };
        assert!(PublicKeyCoordinates::from_jwk(&missing).is_err());
    }

    #[test]
    fn jwk_ec_requires_known_curve() {
        let jwk = JsonWebKey {
            kty: "EC".into(),
            crv: Some("P-192".into()),
            x: Some("AA".into()),
            y: Some("AA".into()),
            ..JsonWebKey::default()
        };
        assert!(matches!(
            PublicKeyCoordinates::from_jwk(&jwk),
            Err(EnvaultError::InvalidKeyFormat { .. })
        ));
    }
}
