// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! At-rest keystore format.
//!
//! The 32-byte private scalar is encrypted with AES-256-GCM under a key
//! derived from the passphrase by Argon2id. Salt, nonce and ciphertext are
//! stored base64-encoded next to the KDF parameters, so a blob stays
//! decryptable after the default cost changes.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{KeyMaterial, Passphrase};
use crate::error::{Result, WalletError};

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Iterations
    pub t_cost: u32,
    /// Parallelism
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536, // 64 MiB
            t_cost: 3,
            p_cost: 4,
        }
    }
}

impl KdfParams {
    pub fn new(m_cost: u32, t_cost: u32, p_cost: u32) -> Self {
        Self {
            m_cost,
            t_cost,
            p_cost,
        }
    }

    fn derive_key(&self, passphrase: &Passphrase, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|e| WalletError::CryptoBackend(format!("invalid KDF parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(passphrase.expose().as_bytes(), salt, &mut key[..])
            .map_err(|e| WalletError::CryptoBackend(format!("key derivation failed: {e}")))?;
        Ok(key)
    }
}

/// Encrypted keystore as written to durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeystoreBlob {
    pub version: u32,
    /// Checksummed address, readable without the passphrase.
    pub address: String,
    pub kdf: KdfParams,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
    pub created_at: DateTime<Utc>,
}

impl EncryptedKeystoreBlob {
    pub const CURRENT_VERSION: u32 = 1;

    /// Encrypt a key under a passphrase.
    pub fn seal(key: &KeyMaterial, passphrase: &Passphrase, kdf: &KdfParams) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut rng = rand::rngs::OsRng;
        rng.try_fill_bytes(&mut salt)
            .and_then(|_| rng.try_fill_bytes(&mut nonce))
            .map_err(|e| WalletError::CryptoBackend(format!("entropy source failed: {e}")))?;

        let enc_key = kdf.derive_key(passphrase, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&enc_key[..])
            .map_err(|e| WalletError::CryptoBackend(format!("cipher init failed: {e}")))?;
        let secret = key.secret_bytes();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret.as_slice())
            .map_err(|_| WalletError::CryptoBackend("keystore encryption failed".into()))?;

        Ok(Self {
            version: Self::CURRENT_VERSION,
            address: key.address_string(),
            kdf: *kdf,
            salt: Base64::encode_string(&salt),
            nonce: Base64::encode_string(&nonce),
            ciphertext: Base64::encode_string(&ciphertext),
            created_at: Utc::now(),
        })
    }

    /// Decrypt the key.
    ///
    /// A failed authentication tag means the passphrase is wrong. A key that
    /// decrypts but does not reproduce the stored address means the blob was
    /// altered, which is reported as a backend failure.
    pub fn open(&self, passphrase: &Passphrase) -> Result<KeyMaterial> {
        if self.version != Self::CURRENT_VERSION {
            return Err(WalletError::CryptoBackend(format!(
                "unsupported keystore version {}",
                self.version
            )));
        }

        let salt = decode_field("salt", &self.salt)?;
        let nonce = decode_field("nonce", &self.nonce)?;
        let ciphertext = decode_field("ciphertext", &self.ciphertext)?;
        if nonce.len() != NONCE_LEN {
            return Err(WalletError::CryptoBackend("corrupt keystore nonce".into()));
        }

        let enc_key = self.kdf.derive_key(passphrase, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&enc_key[..])
            .map_err(|e| WalletError::CryptoBackend(format!("cipher init failed: {e}")))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
                .map_err(|_| WalletError::WrongPassphrase)?,
        );

        let key = KeyMaterial::from_slice(&plaintext)?;
        if !key.address_string().eq_ignore_ascii_case(&self.address) {
            return Err(WalletError::CryptoBackend(
                "keystore address does not match decrypted key".into(),
            ));
        }
        Ok(key)
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    Base64::decode_vec(value)
        .map_err(|_| WalletError::CryptoBackend(format!("corrupt keystore {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_kdf() -> KdfParams {
        KdfParams::new(256, 1, 1)
    }

    fn key() -> KeyMaterial {
        KeyMaterial::from_slice(&[0x42; 32]).unwrap()
    }

    #[test]
    fn seal_then_open() {
        let key = key();
        let blob = EncryptedKeystoreBlob::seal(&key, &"pw1".into(), &cheap_kdf()).unwrap();

        assert_eq!(blob.version, EncryptedKeystoreBlob::CURRENT_VERSION);
        assert_eq!(blob.address, key.address_string());
        assert!(!blob.ciphertext.is_empty());

        let opened = blob.open(&"pw1".into()).unwrap();
        assert_eq!(opened.address(), key.address());
    }

    #[test]
    fn wrong_passphrase() {
        let blob = EncryptedKeystoreBlob::seal(&key(), &"pw1".into(), &cheap_kdf()).unwrap();
        assert!(matches!(
            blob.open(&"pw2".into()),
            Err(WalletError::WrongPassphrase)
        ));
    }

    #[test]
    fn salts_differ_between_blobs() {
        let key = key();
        let a = EncryptedKeystoreBlob::seal(&key, &"pw".into(), &cheap_kdf()).unwrap();
        let b = EncryptedKeystoreBlob::seal(&key, &"pw".into(), &cheap_kdf()).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn tampered_address_is_detected() {
        let mut blob = EncryptedKeystoreBlob::seal(&key(), &"pw".into(), &cheap_kdf()).unwrap();
        blob.address = "0x0000000000000000000000000000000000000001".into();
        assert!(matches!(
            blob.open(&"pw".into()),
            Err(WalletError::CryptoBackend(_))
        ));
    }

    #[test]
    fn corrupt_fields_are_backend_errors() {
        let mut blob = EncryptedKeystoreBlob::seal(&key(), &"pw".into(), &cheap_kdf()).unwrap();
        blob.nonce = "not base64!".into();
        assert!(matches!(
            blob.open(&"pw".into()),
            Err(WalletError::CryptoBackend(_))
        ));
    }

    #[test]
    fn blob_serializes_without_secrets() {
        let key = key();
        let blob = EncryptedKeystoreBlob::seal(&key, &"pw".into(), &cheap_kdf()).unwrap();
        let json = serde_json::to_string(&blob).unwrap();
        assert!(!json.contains(&alloy::hex::encode([0x42u8; 32])));

        let back: EncryptedKeystoreBlob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.open(&"pw".into()).unwrap().address(), key.address());
    }
}
