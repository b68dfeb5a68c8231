use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::core::errors::{EnvaultError, Result};
use crate::core::models::envelope::IV_LEN;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const MAC_KEY_INFO: &[u8] = b"envault envelope mac v1";

/// Fill a fresh buffer with OS randomness.
pub fn random_bytes(len: usize) -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(buf.as_mut_slice());
    buf
}

pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// AES-CBC with PKCS#7 padding. Key length selects AES-128 or AES-256.
pub fn encrypt_cbc(key: &[u8], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|e| bad_key(key.len(), e))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|e| bad_key(key.len(), e))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        other => return Err(bad_key(other, "expected 16 or 32 bytes")),
    };
    Ok(ciphertext)
}

/// Inverse of `encrypt_cbc`. Bad padding is a `DecryptionFailure`.
pub fn decrypt_cbc(key: &[u8], iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let result = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| bad_key(key.len(), e))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|e| bad_key(key.len(), e))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        other => return Err(bad_key(other, "expected 16 or 32 bytes")),
    };
    result.map_err(|_| EnvaultError::DecryptionFailure {
        reason: "invalid padding".into(),
    })
}

fn bad_key(len: usize, detail: impl std::fmt::Display) -> EnvaultError {
    EnvaultError::DecryptionFailure {
        reason: format!("unusable cipher key of {len} bytes: {detail}"),
    }
}

/// HMAC-SHA256 over `label ‖ 0x00 ‖ iv ‖ ciphertext`.
///
/// The MAC key is derived from the cipher key with HKDF so the same
/// bytes never serve two primitives.
pub fn envelope_tag(cipher_key: &[u8], label: &str, iv: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    tag_mac(cipher_key, label, iv, ciphertext)
        .finalize()
        .into_bytes()
        .to_vec()
}

/// Constant-time check of a tag produced by `envelope_tag`.
pub fn verify_envelope_tag(
    cipher_key: &[u8],
    label: &str,
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<()> {
    tag_mac(cipher_key, label, iv, ciphertext)
        .verify_slice(tag)
        .map_err(|_| EnvaultError::DecryptionFailure {
            reason: "integrity check failed".into(),
        })
}

fn tag_mac(cipher_key: &[u8], label: &str, iv: &[u8], ciphertext: &[u8]) -> HmacSha256 {
    let mut mac_key = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(None, cipher_key)
        .expand(MAC_KEY_INFO, &mut mac_key[..])
        .expect("32 bytes is a valid HKDF-SHA256 output length");

    let mut mac =
        HmacSha256::new_from_slice(&mac_key[..]).expect("HMAC accepts keys of any length");
    mac.update(label.as_bytes());
    mac.update(&[0x00]);
    mac.update(iv);
    mac.update(ciphertext);
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes256_round_trip_block_multiples() {
        let key = random_bytes(32);
        for len in [0usize, 1, 15, 16, 32, 33] {
            let plaintext = vec![0x5A; len];
            let iv = random_iv();
            let ct = encrypt_cbc(&key, &iv, &plaintext).unwrap();
            assert_eq!(ct.len(), (len / 16 + 1) * 16);
            assert_eq!(decrypt_cbc(&key, &iv, &ct).unwrap(), plaintext);
        }
    }

    #[test]
    fn aes128_round_trip() {
        let key = random_bytes(16);
        let iv = random_iv();
        let ct = encrypt_cbc(&key, &iv, b"sixteen byte key").unwrap();
        assert_eq!(decrypt_cbc(&key, &iv, &ct).unwrap(), b"sixteen byte key");
    }

    #[test]
    fn known_vector_aes256_cbc() {
        // NIST SP 800-38A F.2.5, first block, followed by one PKCS#7 pad block
        let key = hex::decode("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4")
            .unwrap();
        let iv: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f")
            .unwrap()
            .try_into()
            .unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();

        let ct = encrypt_cbc(&key, &iv, &plaintext).unwrap();
        assert_eq!(hex::encode(&ct[..16]), "f58c4c04d6e5f1ba779eabfb5f7bfbd6");
        assert_eq!(ct.len(), 32);
    }

    #[test]
    fn unsupported_key_length_fails() {
        let iv = random_iv();
        assert!(encrypt_cbc(&[0u8; 24], &iv, b"x").is_err());
    }

    #[test]
    fn tag_detects_any_change() {
        let key = random_bytes(32);
        let iv = random_iv();
        let tag = envelope_tag(&key, "symmetric", &iv, b"ciphertext");

        assert!(verify_envelope_tag(&key, "symmetric", &iv, b"ciphertext", &tag).is_ok());
        assert!(verify_envelope_tag(&key, "symmetric", &iv, b"Ciphertext", &tag).is_err());
        assert!(verify_envelope_tag(&key, "asymmetric-envelope", &iv, b"ciphertext", &tag).is_err());

        let other = random_bytes(32);
        assert!(verify_envelope_tag(&other, "symmetric", &iv, b"ciphertext", &tag).is_err());
    }

    #[test]
    fn random_iv_differs_between_calls() {
        assert_ne!(random_iv(), random_iv());
    }
}
