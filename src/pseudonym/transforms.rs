//! The four pseudonymization transform families
//!
//! Pure helpers over key material and per-key salts. Reversibility is a
//! property of the family, not of the call site: only
//! [`decrypt_value`] has an inverse here.

use crate::error::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Nonce size for AES-GCM
pub const NONCE_SIZE: usize = 12;

/// Output length of the one-way derivation, in bytes
const DERIVED_LEN: usize = 32;

/// HKDF context string binding derived pseudonyms to this use
const DERIVE_CONTEXT: &[u8] = b"dataguard pseudonym v1";

/// Irreversible salted derivation of a value. Deterministic for equal
/// (value, salt) pairs, never reversible.
pub fn one_way_hash(value: &str, salt: &[u8]) -> Result<String> {
    let hk = Hkdf::<Sha256>::new(Some(salt), value.as_bytes());
    let mut out = [0u8; DERIVED_LEN];
    hk.expand(DERIVE_CONTEXT, &mut out)
        .map_err(|e| Error::Crypto(format!("key derivation failed: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(out))
}

/// Salted SHA-256 lookup hash. Lets callers search for equal plaintexts
/// without decrypting, and is independent of the ciphertext.
pub fn lookup_hash(value: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.update(salt);
    hex::encode(hasher.finalize())
}

/// Encrypt a value with AES-256-GCM. The random nonce is prepended to the
/// ciphertext before encoding.
pub fn encrypt_value(key: &[u8], value: &str) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| Error::Crypto(format!("entropy source failed: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, value.as_bytes())
        .map_err(|e| Error::Crypto(format!("encryption failed: {}", e)))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(combined))
}

/// Decrypt a value produced by [`encrypt_value`].
pub fn decrypt_value(key: &[u8], encoded: &str) -> Result<String> {
    let combined = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::Crypto(format!("failed to decode ciphertext: {}", e)))?;

    if combined.len() < NONCE_SIZE {
        return Err(Error::Crypto("ciphertext too short".to_string()));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("failed to create cipher: {}", e)))?;

    let nonce = Nonce::from_slice(&combined[..NONCE_SIZE]);
    let plaintext = cipher
        .decrypt(nonce, &combined[NONCE_SIZE..])
        .map_err(|e| Error::Crypto(format!("decryption failed: {}", e)))?;

    String::from_utf8(plaintext)
        .map_err(|e| Error::Crypto(format!("decrypted value is not UTF-8: {}", e)))
}

/// Deterministic shape-preserving masking for values with a recognized
/// structure. Returns `None` for shapes without a masking rule, so callers
/// can fall back to reversible encryption.
///
/// One-way by design: no reverse mapping is kept.
pub fn format_preserving(value: &str, salt: &[u8]) -> Option<String> {
    if let Some((local, domain)) = split_email(value) {
        let local_mask = short_digest(local, salt);
        let domain_mask = short_digest(domain, salt);
        return Some(format!("{}@{}.example", local_mask, domain_mask));
    }

    if is_ipv4(value) {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hasher.update(salt);
        let digest = hasher.finalize();
        // Masked addresses land in the 10.0.0.0/8 private range.
        return Some(format!("10.{}.{}.{}", digest[0], digest[1], digest[2]));
    }

    None
}

/// Generate a random, unrelated 16-byte token.
pub fn random_token() -> Result<String> {
    let mut token = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut token)
        .map_err(|e| Error::Crypto(format!("entropy source failed: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(token))
}

fn split_email(value: &str) -> Option<(&str, &str)> {
    let (local, domain) = value.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some((local, domain))
}

fn is_ipv4(value: &str) -> bool {
    value.parse::<std::net::Ipv4Addr>().is_ok()
}

fn short_digest(part: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(part.as_bytes());
    hasher.update(salt);
    hex::encode(hasher.finalize())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8] = b"0123456789abcdef";
    const KEY: &[u8] = &[7u8; 32];

    #[test]
    fn test_one_way_hash_deterministic() {
        let a = one_way_hash("a@b.com", SALT).unwrap();
        let b = one_way_hash("a@b.com", SALT).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_one_way_hash_salt_sensitive() {
        let a = one_way_hash("a@b.com", SALT).unwrap();
        let b = one_way_hash("a@b.com", b"another salt 123").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let ciphertext = encrypt_value(KEY, "sensitive value").unwrap();
        let plaintext = decrypt_value(KEY, &ciphertext).unwrap();
        assert_eq!(plaintext, "sensitive value");
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let ciphertext = encrypt_value(KEY, "sensitive value").unwrap();
        let err = decrypt_value(&[8u8; 32], &ciphertext).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_encryption_is_randomized() {
        let a = encrypt_value(KEY, "same input").unwrap();
        let b = encrypt_value(KEY, "same input").unwrap();
        assert_ne!(a, b); // fresh nonce per call
    }

    #[test]
    fn test_lookup_hash_independent_of_ciphertext() {
        let ciphertext = encrypt_value(KEY, "hello").unwrap();
        let hash = lookup_hash("hello", SALT);
        assert_ne!(ciphertext, hash);
        assert_eq!(hash, lookup_hash("hello", SALT));
    }

    #[test]
    fn test_format_preserving_email_shape() {
        let masked = format_preserving("alice@example.org", SALT).unwrap();
        let (local, domain) = masked.split_once('@').unwrap();
        assert_eq!(local.len(), 8);
        assert!(domain.ends_with(".example"));
        assert_ne!(masked, "alice@example.org");
        // Deterministic under the same salt
        assert_eq!(masked, format_preserving("alice@example.org", SALT).unwrap());
    }

    #[test]
    fn test_format_preserving_ipv4_shape() {
        let masked = format_preserving("192.168.1.77", SALT).unwrap();
        assert!(masked.starts_with("10."));
        assert!(masked.parse::<std::net::Ipv4Addr>().is_ok());
    }

    #[test]
    fn test_format_preserving_unknown_shape() {
        assert!(format_preserving("free-form text", SALT).is_none());
        assert!(format_preserving("@", SALT).is_none());
    }

    #[test]
    fn test_random_tokens_unrelated() {
        let a = random_token().unwrap();
        let b = random_token().unwrap();
        assert_ne!(a, b);
    }
}
