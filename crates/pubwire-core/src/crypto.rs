//! Message payload encryption.
//!
//! Payloads are encrypted with AES-256-CBC and PKCS#7 padding. The AES key is
//! derived from the configured cipher key: the first 32 characters of the
//! lowercase hex SHA-256 digest, taken as raw bytes.
//!
//! Two IV modes exist:
//!
//! - fixed (default): the IV is always `0123456789012345`; output is the bare
//!   ciphertext
//! - random: a fresh 16-byte IV per message, prepended to the ciphertext
//!
//! The ciphertext is base64-encoded and, for publishing, wrapped as a JSON
//! string literal so the wire payload stays valid JSON.

use std::fmt;

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// IV used when random IVs are disabled.
pub const FIXED_IV: &[u8; IV_LEN] = b"0123456789012345";

const IV_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors from encrypting or decrypting payloads.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The configured cipher key is empty.
    #[error("cipher key is empty")]
    EmptyKey,

    /// The payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The payload is shorter than one IV plus one block.
    #[error("ciphertext too short: {0} bytes")]
    TooShort(usize),

    /// Padding check failed, usually because the key is wrong.
    #[error("decryption failed: bad padding or wrong key")]
    BadPadding,

    /// The plaintext is not UTF-8.
    #[error("decrypted payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The encrypted payload was expected to be a JSON string literal.
    #[error("encrypted payload is not a JSON string literal: {0}")]
    NotStringLiteral(#[from] serde_json::Error),
}

/// A keyed AES-256-CBC cipher.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; KEY_LEN],
    random_iv: bool,
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("key", &"<redacted>")
            .field("random_iv", &self.random_iv)
            .finish()
    }
}

impl Cipher {
    /// Creates a cipher from a configured cipher key, using the fixed IV.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EmptyKey`] for an empty key.
    pub fn new(cipher_key: &str) -> CryptoResult<Self> {
        if cipher_key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }

        Ok(Self {
            key: derive_key(cipher_key),
            random_iv: false,
        })
    }

    /// Builder: switch between the fixed IV and a random per-message IV.
    #[must_use]
    pub fn with_random_iv(mut self, random_iv: bool) -> Self {
        self.random_iv = random_iv;
        self
    }

    /// Returns true if a random IV is prepended to every ciphertext.
    pub fn uses_random_iv(&self) -> bool {
        self.random_iv
    }

    /// Encrypts `plaintext` and returns the base64 encoding of the result.
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let iv = if self.random_iv {
            let mut iv = [0u8; IV_LEN];
            rand::rng().fill_bytes(&mut iv);
            iv
        } else {
            *FIXED_IV
        };

        let ciphertext = Aes256CbcEnc::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(&iv),
        )
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        if self.random_iv {
            let mut framed = Vec::with_capacity(IV_LEN + ciphertext.len());
            framed.extend_from_slice(&iv);
            framed.extend_from_slice(&ciphertext);
            STANDARD.encode(framed)
        } else {
            STANDARD.encode(ciphertext)
        }
    }

    /// Decrypts a base64 payload produced by [`Cipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Fails on invalid base64, truncated input, or a padding mismatch.
    pub fn decrypt(&self, encoded: &str) -> CryptoResult<Vec<u8>> {
        let data = STANDARD.decode(encoded.trim())?;

        let (iv, ciphertext) = if self.random_iv {
            if data.len() < IV_LEN * 2 {
                return Err(CryptoError::TooShort(data.len()));
            }
            data.split_at(IV_LEN)
        } else {
            if data.len() < IV_LEN {
                return Err(CryptoError::TooShort(data.len()));
            }
            (&FIXED_IV[..], data.as_slice())
        };

        Aes256CbcDec::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(iv),
        )
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::BadPadding)
    }
}

/// Derives the AES key: first 32 hex characters of SHA-256(cipher_key).
fn derive_key(cipher_key: &str) -> [u8; KEY_LEN] {
    let digest = format!("{:x}", Sha256::digest(cipher_key.as_bytes()));
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest.as_bytes()[..KEY_LEN]);
    key
}

/// Transforms serialized message JSON for the wire.
///
/// Without a cipher this is the identity. With one, the JSON text is
/// encrypted and the base64 result is returned as a JSON string literal.
pub fn encrypt_payload(json: &str, cipher: Option<&Cipher>) -> String {
    match cipher {
        None => json.to_string(),
        Some(cipher) => serde_json::Value::String(cipher.encrypt(json.as_bytes())).to_string(),
    }
}

/// Reverses [`encrypt_payload`] for a payload that was encrypted.
///
/// # Errors
///
/// Fails if `payload` is not a JSON string literal or does not decrypt to UTF-8.
pub fn decrypt_payload(payload: &str, cipher: &Cipher) -> CryptoResult<String> {
    let encoded: String = serde_json::from_str(payload)?;
    let plaintext = cipher.decrypt(&encoded)?;
    Ok(String::from_utf8(plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_derivation_uses_hex_digest_prefix() {
        assert_eq!(
            &derive_key("testCipher"),
            b"a3f048a8c23f505f4d4224a2433fbd88"
        );
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(Cipher::new(""), Err(CryptoError::EmptyKey)));
    }

    #[test]
    fn fixed_iv_known_vectors() {
        let cipher = Cipher::new("testCipher").unwrap();
        assert_eq!(cipher.encrypt(br#"["m1","m2"]"#), "HFP7V6bDwBLrwc1t8Rnrog==");
        assert_eq!(cipher.encrypt(br#""hi""#), "2KMtMyWObi4pOKdoq6CYIA==");

        let other = Cipher::new("enigma").unwrap();
        assert_eq!(
            other.encrypt(br#"{"a":10,"z":"test"}"#),
            "bBzPXKMHRt6q3Z+WKZiclzG9b5UTs8QPjhAQtCHfbFg="
        );
    }

    #[test]
    fn payload_is_json_string_literal() {
        let cipher = Cipher::new("testCipher").unwrap();
        let payload = encrypt_payload(r#"["m1","m2"]"#, Some(&cipher));
        assert_eq!(payload, r#""HFP7V6bDwBLrwc1t8Rnrog==""#);

        let decrypted = decrypt_payload(&payload, &cipher).unwrap();
        assert_eq!(decrypted, r#"["m1","m2"]"#);
    }

    #[test]
    fn no_cipher_is_identity() {
        assert_eq!(encrypt_payload(r#"{"a":1}"#, None), r#"{"a":1}"#);
    }

    #[test]
    fn random_iv_round_trip_and_differs_per_call() {
        let cipher = Cipher::new("testCipher").unwrap().with_random_iv(true);
        let first = cipher.encrypt(b"hello");
        let second = cipher.encrypt(b"hello");
        assert_ne!(first, second);

        assert_eq!(cipher.decrypt(&first).unwrap(), b"hello");
        assert_eq!(cipher.decrypt(&second).unwrap(), b"hello");
    }

    #[test]
    fn wrong_key_fails_or_garbles() {
        let cipher = Cipher::new("testCipher").unwrap();
        let other = Cipher::new("anotherKey").unwrap();
        let encoded = cipher.encrypt(br#"["m1","m2"]"#);

        match other.decrypt(&encoded) {
            Err(CryptoError::BadPadding) => {}
            Ok(plaintext) => assert_ne!(plaintext, br#"["m1","m2"]"#),
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn truncated_input_is_rejected() {
        let cipher = Cipher::new("testCipher").unwrap().with_random_iv(true);
        let short = STANDARD.encode([0u8; 8]);
        assert!(matches!(cipher.decrypt(&short), Err(CryptoError::TooShort(8))));
        assert!(matches!(
            cipher.decrypt("not base64!"),
            Err(CryptoError::Base64(_))
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let cipher = Cipher::new("testCipher").unwrap();
        let debug = format!("{:?}", cipher);
        assert!(debug.contains("redacted"));
        assert!(!debug.contains("a3f048"));
    }
}
