// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cryptographic Backend
//!
//! Everything that touches secret material goes through [`CryptoBackend`]:
//! mnemonic generation, key derivation, keystore encryption and signing.
//! The rest of the crate only ever holds a [`KeyMaterial`] for the duration
//! of one operation.
//!
//! ## Security Model
//!
//! - [`KeyMaterial`], [`Mnemonic`] and [`Passphrase`] are zeroized on drop
//! - Their `Debug` output is redacted, so they can't leak through logs
//! - The address is computed from the private key when the key is loaded,
//!   never trusted from storage alone

pub mod keystore_blob;
pub mod local;
pub mod mnemonic;

use std::fmt;

use alloy::dyn_abi::TypedData;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use k256::SecretKey;
use zeroize::{Zeroize, Zeroizing};

use crate::chain::{SignedTransaction, UnsignedTransaction};
use crate::error::{Result, WalletError};

pub use alloy::primitives::Signature;
pub use keystore_blob::{EncryptedKeystoreBlob, KdfParams};
pub use local::LocalBackend;
pub use mnemonic::Mnemonic;

/// Cryptographic capability consumed by the keystore and authorizer.
///
/// Implementations must not panic on attacker-influenced input: every failure
/// is reported as a [`WalletError`].
pub trait CryptoBackend: Send + Sync {
    /// Generate a fresh mnemonic from `entropy_bits` of OS entropy.
    fn generate_mnemonic(&self, entropy_bits: usize) -> Result<Mnemonic>;

    /// Validate and normalize a user-supplied phrase.
    fn parse_mnemonic(&self, phrase: &str) -> Result<Mnemonic>;

    /// Derive the wallet key from a mnemonic.
    fn derive_key(&self, mnemonic: &Mnemonic) -> Result<KeyMaterial>;

    /// Load a key from its raw 32-byte scalar.
    fn key_from_bytes(&self, bytes: &[u8]) -> Result<KeyMaterial>;

    fn encrypt_keystore(
        &self,
        key: &KeyMaterial,
        passphrase: &Passphrase,
        kdf: &KdfParams,
    ) -> Result<EncryptedKeystoreBlob>;

    fn decrypt_keystore(
        &self,
        blob: &EncryptedKeystoreBlob,
        passphrase: &Passphrase,
    ) -> Result<KeyMaterial>;

    /// EIP-191 personal message signature.
    fn sign_message(&self, key: &KeyMaterial, message: &[u8]) -> Result<Signature>;

    /// EIP-712 typed data signature.
    fn sign_typed_data(&self, key: &KeyMaterial, typed_data: &TypedData) -> Result<Signature>;

    fn sign_transaction(
        &self,
        key: &KeyMaterial,
        tx: UnsignedTransaction,
    ) -> Result<SignedTransaction>;

    /// Check an EIP-191 signature against an address.
    fn verify_message(&self, message: &[u8], signature: &Signature, address: Address)
        -> Result<bool>;
}

/// Decrypted signing key of one wallet.
///
/// Not `Clone`: a decrypted key has exactly one owner and is dropped
/// (and zeroized) when the operation that needed it completes.
pub struct KeyMaterial {
    secret: SecretKey,
    address: Address,
}

impl KeyMaterial {
    /// Wrap a secret key, computing its address.
    pub fn new(secret: SecretKey) -> Self {
        let address = PrivateKeySigner::from_signing_key(secret.clone().into()).address();
        Self { secret, address }
    }

    /// Load a key from a raw 32-byte big-endian scalar.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        SecretKey::from_slice(bytes)
            .map(Self::new)
            .map_err(|_| WalletError::CryptoBackend("invalid secp256k1 private key".into()))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Checksummed hex form of the address.
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    /// Raw scalar bytes, zeroized when the returned buffer drops.
    pub(crate) fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = self.secret.to_bytes();
        let out = Zeroizing::new(bytes.to_vec());
        bytes.as_mut_slice().zeroize();
        out
    }

    /// Short-lived alloy signer over this key.
    pub(crate) fn signer(&self) -> PrivateKeySigner {
        PrivateKeySigner::from_signing_key(self.secret.clone().into())
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("address", &self.address)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Passphrase protecting the keystore blob.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(Zeroizing::new(passphrase.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

/// 0x-prefixed 65-byte `r || s || v` encoding of a signature.
pub fn signature_hex(signature: &Signature) -> String {
    alloy::hex::encode_prefixed(signature.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_material_debug_is_redacted() {
        let key = KeyMaterial::from_slice(&[7u8; 32]).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("0707"));
    }

    #[test]
    fn address_is_computed_from_key() {
        let a = KeyMaterial::from_slice(&[7u8; 32]).unwrap();
        let b = KeyMaterial::from_slice(&[7u8; 32]).unwrap();
        let c = KeyMaterial::from_slice(&[8u8; 32]).unwrap();
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
        assert_eq!(a.secret_bytes().as_slice(), &[7u8; 32]);
    }

    #[test]
    fn invalid_scalar_is_rejected() {
        assert!(matches!(
            KeyMaterial::from_slice(&[0u8; 32]),
            Err(WalletError::CryptoBackend(_))
        ));
        assert!(KeyMaterial::from_slice(&[1u8; 31]).is_err());
    }

    #[test]
    fn passphrase_debug_is_redacted() {
        let p = Passphrase::from("hunter2");
        assert_eq!(format!("{p:?}"), "Passphrase([REDACTED])");
        assert_eq!(p.expose(), "hunter2");
    }
}
