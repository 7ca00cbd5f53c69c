// src/platform/cipher.rs - Encryption at rest for the disk box

//! Values written to an encrypted box are sealed with ChaCha20-Poly1305.
//!
//! Each stored record is laid out as `nonce (12 bytes) || ciphertext`, with a
//! fresh random nonce per write. The key name is bound as associated data so
//! a record copied under a different key fails to open.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{CipherOperation, Error, Result};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

const PROBE_KEY: &str = "__statebox_cipher_probe";
const PROBE_PAYLOAD: &[u8] = b"statebox";

/// Cipher applied to every value stored in a disk box.
pub trait BoxCipher: Send + Sync + std::fmt::Debug {
    fn encrypt(&self, key: &str, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, key: &str, sealed: &[u8]) -> Result<Vec<u8>>;
}

/// Round-trips a probe value so a broken cipher is caught at open time
/// instead of on the first write.
pub fn verify_cipher(cipher: &dyn BoxCipher) -> Result<()> {
    let sealed = cipher.encrypt(PROBE_KEY, PROBE_PAYLOAD)?;
    let opened = cipher.decrypt(PROBE_KEY, &sealed)?;
    if opened != PROBE_PAYLOAD {
        return Err(Error::encryption(
            CipherOperation::Setup,
            "cipher self-check returned a different payload",
        ));
    }
    Ok(())
}

pub struct ChaChaBoxCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for ChaChaBoxCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaChaBoxCipher").finish_non_exhaustive()
    }
}

impl ChaChaBoxCipher {
    /// Creates a cipher from a raw 32-byte key
    pub fn from_key(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(Error::encryption(
                CipherOperation::Setup,
                format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
            ));
        }

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        })
    }

    /// Derives the key as SHA-256 of the passphrase
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(Error::encryption(
                CipherOperation::Setup,
                "encryption passphrase must not be empty",
            ));
        }

        let digest = Sha256::digest(passphrase.as_bytes());
        Self::from_key(digest.as_slice())
    }
}

impl BoxCipher for ChaChaBoxCipher {
    fn encrypt(&self, key: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad: key.as_bytes(),
        };

        let ciphertext = self.cipher.encrypt(nonce, payload).map_err(|e| {
            Error::encryption(CipherOperation::Encrypt, format!("encryption failed: {}", e))
        })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, key: &str, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(Error::encryption(
                CipherOperation::Decrypt,
                "sealed value shorter than nonce",
            ));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let payload = Payload {
            msg: ciphertext,
            aad: key.as_bytes(),
        };

        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), payload)
            .map_err(|e| {
                Error::encryption(CipherOperation::Decrypt, format!("decryption failed: {}", e))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let cipher = ChaChaBoxCipher::from_key(&[7u8; KEY_LEN]).unwrap();
        let sealed = cipher.encrypt("settings", b"{\"dark\":true}").unwrap();

        assert_ne!(&sealed[NONCE_LEN..], b"{\"dark\":true}");
        assert_eq!(cipher.decrypt("settings", &sealed).unwrap(), b"{\"dark\":true}");
    }

    #[test]
    fn test_record_bound_to_key() {
        let cipher = ChaChaBoxCipher::from_passphrase("hunter2").unwrap();
        let sealed = cipher.encrypt("a", b"1").unwrap();
        assert!(cipher.decrypt("b", &sealed).is_err());
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let writer = ChaChaBoxCipher::from_passphrase("one").unwrap();
        let reader = ChaChaBoxCipher::from_passphrase("two").unwrap();
        let sealed = writer.encrypt("k", b"v").unwrap();
        assert!(reader.decrypt("k", &sealed).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(ChaChaBoxCipher::from_key(&[0u8; 16]).is_err());
        assert!(ChaChaBoxCipher::from_passphrase("").is_err());
    }

    #[test]
    fn test_verify_cipher() {
        let cipher = ChaChaBoxCipher::from_passphrase("probe").unwrap();
        assert!(verify_cipher(&cipher).is_ok());
    }
}
