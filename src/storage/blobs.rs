// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable storage for encrypted keystore blobs.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/keystore/{b64url(slot)}.json   # EncryptedKeystoreBlob (never plaintext)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{FileStorage, StorageError};
use crate::crypto::EncryptedKeystoreBlob;
use crate::error::{Result, WalletError};

/// Secret durable storage for keystore blobs, keyed by wallet slot.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the blob of a slot, `None` if the slot is empty.
    async fn read_blob(&self, slot: &str) -> Result<Option<EncryptedKeystoreBlob>>;

    /// Write the blob of a slot, replacing any previous blob.
    async fn write_blob(&self, slot: &str, blob: &EncryptedKeystoreBlob) -> Result<()>;
}

/// Blob store backed by JSON files under the data directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    storage: FileStorage,
}

impl FileBlobStore {
    pub fn new(storage: FileStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn read_blob(&self, slot: &str) -> Result<Option<EncryptedKeystoreBlob>> {
        let storage = self.storage.clone();
        let path = storage.paths().keystore_blob(slot);

        tokio::task::spawn_blocking(move || match storage.read_json(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(WalletError::from(e)),
        })
        .await
        .map_err(|e| WalletError::Persistence(format!("blob read task failed: {e}")))?
    }

    async fn write_blob(&self, slot: &str, blob: &EncryptedKeystoreBlob) -> Result<()> {
        let storage = self.storage.clone();
        let path = storage.paths().keystore_blob(slot);
        let blob = blob.clone();

        tokio::task::spawn_blocking(move || storage.write_json(&path, &blob))
            .await
            .map_err(|e| WalletError::Persistence(format!("blob write task failed: {e}")))?
            .map_err(WalletError::from)
    }
}

/// In-memory blob store for tests and ephemeral wallets.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, EncryptedKeystoreBlob>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read_blob(&self, slot: &str) -> Result<Option<EncryptedKeystoreBlob>> {
        Ok(self.blobs.read().await.get(slot).cloned())
    }

    async fn write_blob(&self, slot: &str, blob: &EncryptedKeystoreBlob) -> Result<()> {
        self.blobs
            .write()
            .await
            .insert(slot.to_string(), blob.clone());
        Ok(())
    }
}
