//! # Secret Cipher
//!
//! Purpose: Derive storage keys from secrets and encrypt messages for the
//! vault.
//!
//! A secret never reaches the store. The store key is `hex(sha256(secret))`
//! and the stored value is `hex(AES-256-CTR(message))` keyed by the raw
//! SHA-256 digest of the secret with an all-zero IV.

use aes::cipher::{KeyIvInit, StreamCipher};
use sha2::{Digest, Sha256};

use crate::error::{VaultError, VaultResult};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Prefix of every generated secret.
pub const SECRET_PREFIX: &str = "vero_";

const IV: [u8; 16] = [0u8; 16];

/// Generates `vero_` followed by 32 lowercase hex characters.
pub fn generate_secret() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("{SECRET_PREFIX}{}", hex::encode(bytes))
}

/// Store key for a secret: lowercase hex of its SHA-256 digest.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Encrypts `message` under `secret`, returning lowercase hex.
pub fn encrypt_message(secret: &str, message: &str) -> VaultResult<String> {
    let mut buf = message.as_bytes().to_vec();
    apply_keystream(secret, &mut buf)?;
    Ok(hex::encode(buf))
}

/// Reverses [`encrypt_message`].
pub fn decrypt_message(secret: &str, encrypted: &str) -> VaultResult<String> {
    let mut buf = hex::decode(encrypted).map_err(|err| VaultError::Cipher(format!("invalid hex: {err}")))?;
    apply_keystream(secret, &mut buf)?;
    String::from_utf8(buf).map_err(|err| VaultError::Cipher(format!("invalid utf-8: {err}")))
}

fn apply_keystream(secret: &str, buf: &mut [u8]) -> VaultResult<()> {
    let key = Sha256::digest(secret.as_bytes());
    let mut cipher = Aes256Ctr::new_from_slices(&key, &IV).map_err(|err| VaultError::Cipher(err.to_string()))?;
    cipher.apply_keystream(buf);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_has_prefix_and_hex_body() {
        let secret = generate_secret();
        let body = secret.strip_prefix(SECRET_PREFIX).expect("prefix");
        assert_eq!(body.len(), 32);
        assert!(body.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash_secret("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn ciphertext_is_hex_without_whitespace() {
        let encrypted = encrypt_message("vero_test", "hello vault").unwrap();
        assert_eq!(encrypted.len(), "hello vault".len() * 2);
        assert!(encrypted.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(decrypt_message("vero_test", &encrypted).unwrap(), "hello vault");
    }

    #[test]
    fn wrong_secret_does_not_reveal_message() {
        let encrypted = encrypt_message("vero_right", "top secret").unwrap();
        let decrypted = decrypt_message("vero_wrong", &encrypted);
        assert_ne!(decrypted.ok().as_deref(), Some("top secret"));
    }

    #[test]
    fn rejects_non_hex_ciphertext() {
        assert!(matches!(decrypt_message("s", "zz"), Err(VaultError::Cipher(_))));
    }
}
