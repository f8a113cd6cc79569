// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Keystore
//!
//! Sole owner of the wallet secret. Lifecycle:
//!
//! ```text
//! NoWallet -> Created (unpersisted) -> Persisted (locked) <-> Unlocked
//! ```
//!
//! `Unlocked` only exists for the duration of one operation. The decrypted
//! key is never cached: every signature re-reads and re-decrypts the blob,
//! and [`Keystore::with_unlocked`] keeps the key inside a closure so it
//! cannot outlive the operation that needed it.
//!
//! Creation and persistence are separate steps, so a failed write never
//! leaves a wallet that is believed to exist but cannot be unlocked.
//!
//! All crypto and storage work runs on the blocking pool and is serialized
//! by an internal lock.

use std::sync::Arc;

use alloy::primitives::Address;
use tokio::sync::Mutex;

use crate::crypto::{
    CryptoBackend, EncryptedKeystoreBlob, KdfParams, KeyMaterial, Mnemonic, Passphrase, Signature,
};
use crate::error::{Result, WalletError};
use crate::storage::{AuditEvent, AuditEventType, AuditLog, BlobStore};

/// Default logical wallet slot.
pub const DEFAULT_SLOT: &str = "default";

pub struct Keystore {
    backend: Arc<dyn CryptoBackend>,
    store: Arc<dyn BlobStore>,
    slot: String,
    kdf: KdfParams,
    op_lock: Mutex<()>,
    audit: Option<AuditLog>,
}

impl Keystore {
    pub fn new(backend: Arc<dyn CryptoBackend>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            backend,
            store,
            slot: DEFAULT_SLOT.to_string(),
            kdf: KdfParams::default(),
            op_lock: Mutex::new(()),
            audit: None,
        }
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = slot.into();
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn backend(&self) -> &dyn CryptoBackend {
        self.backend.as_ref()
    }

    /// Generate a new wallet. Nothing is persisted.
    pub async fn create_wallet(&self, entropy_bits: usize) -> Result<(Mnemonic, KeyMaterial)> {
        let _guard = self.op_lock.lock().await;

        let (mnemonic, key) = self
            .blocking(move |backend| {
                let mnemonic = backend.generate_mnemonic(entropy_bits)?;
                let key = backend.derive_key(&mnemonic)?;
                Ok((mnemonic, key))
            })
            .await?;

        tracing::info!(address = %key.address(), "Wallet created");
        self.audit(AuditEvent::new(AuditEventType::WalletCreated).with_address(key.address_string()));
        Ok((mnemonic, key))
    }

    /// Derive the wallet key from a user-supplied phrase. Nothing is persisted.
    pub async fn import_wallet(&self, phrase: &str) -> Result<KeyMaterial> {
        let _guard = self.op_lock.lock().await;

        let phrase = zeroize::Zeroizing::new(phrase.to_string());
        let key = self
            .blocking(move |backend| {
                let mnemonic = backend.parse_mnemonic(&phrase)?;
                backend.derive_key(&mnemonic)
            })
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Wallet import failed"))?;

        tracing::info!(address = %key.address(), "Wallet imported");
        self.audit(AuditEvent::new(AuditEventType::WalletImported).with_address(key.address_string()));
        Ok(key)
    }

    /// Encrypt a key and write it to the slot, replacing any previous blob.
    pub async fn persist(
        &self,
        key: &KeyMaterial,
        passphrase: &Passphrase,
    ) -> Result<EncryptedKeystoreBlob> {
        let _guard = self.op_lock.lock().await;

        let secret = key.secret_bytes();
        let passphrase = Passphrase::new(passphrase.expose());
        let kdf = self.kdf;
        let blob = self
            .blocking(move |backend| {
                let key = backend.key_from_bytes(&secret)?;
                backend.encrypt_keystore(&key, &passphrase, &kdf)
            })
            .await?;

        self.store.write_blob(&self.slot, &blob).await.map_err(|e| match e {
            WalletError::Persistence(_) => e,
            other => WalletError::Persistence(other.to_string()),
        })?;

        tracing::info!(slot = %self.slot, address = %blob.address, "Keystore persisted");
        self.audit(AuditEvent::new(AuditEventType::KeystorePersisted).with_address(blob.address.clone()));
        Ok(blob)
    }

    /// Decrypt the persisted key.
    ///
    /// Prefer [`Keystore::with_unlocked`], which bounds the key's lifetime to
    /// one operation.
    pub async fn unlock(&self, passphrase: &Passphrase) -> Result<KeyMaterial> {
        self.with_unlocked(passphrase, |backend, key| backend.key_from_bytes(&key.secret_bytes()))
            .await
    }

    /// Decrypt the persisted key, run `op` with it, then drop it.
    pub async fn with_unlocked<T, F>(&self, passphrase: &Passphrase, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CryptoBackend, &KeyMaterial) -> Result<T> + Send + 'static,
    {
        let _guard = self.op_lock.lock().await;

        let blob = self.store.read_blob(&self.slot).await?.ok_or(WalletError::NoWallet)?;
        let address = blob.address.clone();
        let passphrase = Passphrase::new(passphrase.expose());

        let result = self
            .blocking(move |backend| {
                let key = backend.decrypt_keystore(&blob, &passphrase)?;
                op(backend, &key)
            })
            .await;

        if matches!(result, Err(WalletError::WrongPassphrase)) {
            tracing::warn!(slot = %self.slot, "Keystore unlock failed: wrong passphrase");
            self.audit(
                AuditEvent::new(AuditEventType::UnlockFailed)
                    .with_address(address)
                    .failed("wrong passphrase"),
            );
        }
        result
    }

    /// Address of the persisted wallet, read without decryption.
    pub async fn current_address(&self) -> Result<Option<Address>> {
        let Some(blob) = self.store.read_blob(&self.slot).await? else {
            return Ok(None);
        };
        blob.address
            .parse::<Address>()
            .map(Some)
            .map_err(|_| WalletError::CryptoBackend("corrupt keystore address".into()))
    }

    pub async fn has_wallet(&self) -> Result<bool> {
        Ok(self.store.read_blob(&self.slot).await?.is_some())
    }

    /// Sign a personal message with an unlocked key.
    pub async fn sign(&self, key: &KeyMaterial, message: &[u8]) -> Result<Signature> {
        let _guard = self.op_lock.lock().await;
        self.backend.sign_message(key, message)
    }

    /// Unlock, sign a personal message, and drop the key.
    pub async fn sign_with_passphrase(
        &self,
        passphrase: &Passphrase,
        message: Vec<u8>,
    ) -> Result<Signature> {
        self.with_unlocked(passphrase, move |backend, key| {
            backend.sign_message(key, &message)
        })
        .await
    }

    pub fn verify(&self, message: &[u8], signature: &Signature, address: Address) -> Result<bool> {
        self.backend.verify_message(message, signature, address)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CryptoBackend) -> Result<T> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || op(backend.as_ref()))
            .await
            .map_err(|e| WalletError::CryptoBackend(format!("crypto task failed: {e}")))?
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }
}

/// Case-insensitive comparison of a peer-supplied address with ours.
pub fn address_matches(claimed: &str, address: &Address) -> bool {
    let claimed = claimed.trim();
    let claimed = claimed
        .strip_prefix("0x")
        .or_else(|| claimed.strip_prefix("0X"))
        .unwrap_or(claimed);
    claimed.eq_ignore_ascii_case(&alloy::hex::encode(address))
}
