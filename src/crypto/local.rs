// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process cryptographic backend built on alloy's local signers.
//!
//! Keys are derived at the standard Ethereum path `m/44'/60'/0'/0/0`, so a
//! phrase restored here yields the same address as other wallets.

use alloy::consensus::{SignableTransaction, TxEnvelope};
use alloy::dyn_abi::TypedData;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::Address;
use alloy::signers::local::{coins_bip39::English, MnemonicBuilder};
use alloy::signers::SignerSync;
use zeroize::Zeroize;

use super::{
    CryptoBackend, EncryptedKeystoreBlob, KdfParams, KeyMaterial, Mnemonic, Passphrase, Signature,
};
use crate::chain::{SignedTransaction, UnsignedTransaction};
use crate::error::{Result, WalletError};

/// Account index within the derivation path.
const ACCOUNT_INDEX: u32 = 0;

/// Default cryptographic backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoBackend for LocalBackend {
    fn generate_mnemonic(&self, entropy_bits: usize) -> Result<Mnemonic> {
        Mnemonic::generate(entropy_bits)
    }

    fn parse_mnemonic(&self, phrase: &str) -> Result<Mnemonic> {
        Mnemonic::parse(phrase)
    }

    fn derive_key(&self, mnemonic: &Mnemonic) -> Result<KeyMaterial> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(mnemonic.phrase())
            .index(ACCOUNT_INDEX)
            .map_err(|e| WalletError::CryptoBackend(format!("derivation path: {e}")))?
            .build()
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

        let mut bytes = signer.credential().to_bytes();
        let key = KeyMaterial::from_slice(&bytes);
        bytes.as_mut_slice().zeroize();
        key
    }

    fn key_from_bytes(&self, bytes: &[u8]) -> Result<KeyMaterial> {
        KeyMaterial::from_slice(bytes)
    }

    fn encrypt_keystore(
        &self,
        key: &KeyMaterial,
        passphrase: &Passphrase,
        kdf: &KdfParams,
    ) -> Result<EncryptedKeystoreBlob> {
        EncryptedKeystoreBlob::seal(key, passphrase, kdf)
    }

    fn decrypt_keystore(
        &self,
        blob: &EncryptedKeystoreBlob,
        passphrase: &Passphrase,
    ) -> Result<KeyMaterial> {
        blob.open(passphrase)
    }

    fn sign_message(&self, key: &KeyMaterial, message: &[u8]) -> Result<Signature> {
        key.signer()
            .sign_message_sync(message)
            .map_err(|e| WalletError::CryptoBackend(format!("message signing failed: {e}")))
    }

    fn sign_typed_data(&self, key: &KeyMaterial, typed_data: &TypedData) -> Result<Signature> {
        let hash = typed_data
            .eip712_signing_hash()
            .map_err(|e| WalletError::MalformedRequest(format!("typed data: {e}")))?;
        key.signer()
            .sign_hash_sync(&hash)
            .map_err(|e| WalletError::CryptoBackend(format!("typed data signing failed: {e}")))
    }

    fn sign_transaction(
        &self,
        key: &KeyMaterial,
        tx: UnsignedTransaction,
    ) -> Result<SignedTransaction> {
        let UnsignedTransaction { chain, mut tx } = tx;
        let signature = key
            .signer()
            .sign_transaction_sync(&mut tx)
            .map_err(|e| WalletError::CryptoBackend(format!("transaction signing failed: {e}")))?;

        let envelope = TxEnvelope::from(tx.into_signed(signature));
        Ok(SignedTransaction {
            chain,
            raw: envelope.encoded_2718().into(),
            hash: *envelope.tx_hash(),
        })
    }

    fn verify_message(
        &self,
        message: &[u8],
        signature: &Signature,
        address: Address,
    ) -> Result<bool> {
        let recovered = signature
            .recover_address_from_msg(message)
            .map_err(|e| WalletError::CryptoBackend(format!("signature recovery failed: {e}")))?;
        Ok(recovered == address)
    }
}
