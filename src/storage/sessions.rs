// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistence of connected dApp sessions across restarts.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/sessions/{b64url(peer_id)}.json   # PeerSession (no secrets)
//! ```

use async_trait::async_trait;

use super::FileStorage;
use crate::error::{Result, WalletError};
use crate::session::PeerSession;

/// Durable record of connected peer sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the record of a session.
    async fn save(&self, session: &PeerSession) -> Result<()>;

    /// Remove the record of a session. Removing an unknown peer is not an error.
    async fn remove(&self, peer_id: &str) -> Result<()>;

    /// Load every recorded session.
    async fn load_all(&self) -> Result<Vec<PeerSession>>;
}

/// Session store backed by one JSON file per peer.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    storage: FileStorage,
}

impl FileSessionStore {
    pub fn new(storage: FileStorage) -> Self {
        Self { storage }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(FileStorage) -> Result<T> + Send + 'static,
    {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || op(storage))
            .await
            .map_err(|e| WalletError::Persistence(format!("session store task failed: {e}")))?
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &PeerSession) -> Result<()> {
        let session = session.clone();
        self.blocking(move |storage| {
            let path = storage.paths().session(&session.peer_id);
            storage.write_json(path, &session).map_err(WalletError::from)
        })
        .await
    }

    async fn remove(&self, peer_id: &str) -> Result<()> {
        let peer_id = peer_id.to_string();
        self.blocking(move |storage| {
            let path = storage.paths().session(&peer_id);
            storage.remove(path).map_err(WalletError::from)
        })
        .await
    }

    async fn load_all(&self) -> Result<Vec<PeerSession>> {
        self.blocking(|storage| {
            let dir = storage.paths().sessions_dir();
            let mut sessions = Vec::new();
            for name in storage.list_stems(&dir, "json")? {
                match storage.read_json::<PeerSession>(dir.join(format!("{name}.json"))) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        tracing::warn!(file = %name, error = %e, "Skipping unreadable session record");
                    }
                }
            }
            Ok(sessions)
        })
        .await
    }
}
