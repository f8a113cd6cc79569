// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Service
//!
//! Composition root: builds the keystore, authorizer and router around one
//! shared [`WalletState`] and exposes the operations the embedding
//! application calls.
//!
//! Collaborators are injected. [`WalletService::open`] wires the file-backed
//! defaults under `DATA_DIR`; tests and embedders can pass their own through
//! [`WalletService::new`].

use std::sync::Arc;

use alloy::primitives::Address;
use tokio::sync::watch;
use uuid::Uuid;

use crate::authorizer::{Approved, AuthorizationRequest, TransactionAuthorizer};
use crate::chain::{ChainClient, ChainNetwork, GasPriceMonitor, RpcChainClient};
use crate::config::WalletConfig;
use crate::crypto::{
    CryptoBackend, EncryptedKeystoreBlob, KeyMaterial, LocalBackend, Mnemonic, Passphrase,
    Signature,
};
use crate::error::Result;
use crate::keystore::Keystore;
use crate::router::{PeerRequestRouter, Routed};
use crate::rpc::{InboundRequest, PeerTransport};
use crate::session::{PeerMetadata, PeerSession};
use crate::state::{self, SharedState, WalletState};
use crate::storage::{
    AuditEvent, AuditEventType, AuditLog, BlobStore, FileBlobStore, FileSessionStore,
    FileStorage, SessionStore, StoragePaths,
};

/// External collaborators of the wallet core.
pub struct Collaborators {
    pub backend: Arc<dyn CryptoBackend>,
    pub blobs: Arc<dyn BlobStore>,
    pub chain: Arc<dyn ChainClient>,
    pub transport: Arc<dyn PeerTransport>,
    pub sessions: Option<Arc<dyn SessionStore>>,
    pub audit: Option<AuditLog>,
}

pub struct WalletService {
    config: WalletConfig,
    state: SharedState,
    keystore: Arc<Keystore>,
    authorizer: Arc<TransactionAuthorizer>,
    router: PeerRequestRouter,
    chain: Arc<dyn ChainClient>,
    session_store: Option<Arc<dyn SessionStore>>,
    audit: Option<AuditLog>,
}

impl WalletService {
    pub fn new(config: WalletConfig, parts: Collaborators) -> Self {
        let state = state::shared(WalletState::new(config.max_queued_requests));

        let mut keystore = Keystore::new(parts.backend, parts.blobs)
            .with_slot(config.slot.clone())
            .with_kdf(config.kdf);
        if let Some(audit) = &parts.audit {
            keystore = keystore.with_audit(audit.clone());
        }
        let keystore = Arc::new(keystore);

        let mut authorizer = TransactionAuthorizer::new(
            state.clone(),
            keystore.clone(),
            parts.chain.clone(),
            parts.transport.clone(),
            config.wallet_meta.clone(),
        );
        if let Some(store) = &parts.sessions {
            authorizer = authorizer.with_session_store(store.clone());
        }
        if let Some(audit) = &parts.audit {
            authorizer = authorizer.with_audit(audit.clone());
        }
        let authorizer = Arc::new(authorizer);

        let router = PeerRequestRouter::new(
            state.clone(),
            authorizer.clone(),
            keystore.clone(),
            parts.transport,
        )
        .with_default_chain(config.default_chain);

        Self {
            config,
            state,
            keystore,
            authorizer,
            router,
            chain: parts.chain,
            session_store: parts.sessions,
            audit: parts.audit,
        }
    }

    /// File-backed service under `config.data_dir`, with persisted sessions
    /// restored.
    pub async fn open(config: WalletConfig, transport: Arc<dyn PeerTransport>) -> Result<Self> {
        let storage = FileStorage::open(StoragePaths::new(&config.data_dir))?;
        tracing::info!(data_dir = %config.data_dir.display(), "Wallet storage initialized");

        let chain = RpcChainClient::new(&config.rpc_urls)?;
        let parts = Collaborators {
            backend: Arc::new(LocalBackend::new()),
            blobs: Arc::new(FileBlobStore::new(storage.clone())),
            chain: Arc::new(chain),
            transport,
            sessions: Some(Arc::new(FileSessionStore::new(storage.clone()))),
            audit: Some(AuditLog::new(storage)),
        };

        let service = Self::new(config, parts);
        let restored = service.restore_sessions().await?;
        tracing::info!(restored, "Wallet service ready");
        Ok(service)
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn keystore(&self) -> &Arc<Keystore> {
        &self.keystore
    }

    // ========== Wallet ==========

    /// Generate a wallet with the configured entropy. Nothing is persisted.
    pub async fn create_wallet(&self) -> Result<(Mnemonic, KeyMaterial)> {
        self.keystore.create_wallet(self.config.entropy_bits).await
    }

    pub async fn import_wallet(&self, phrase: &str) -> Result<KeyMaterial> {
        self.keystore.import_wallet(phrase).await
    }

    pub async fn persist(
        &self,
        key: &KeyMaterial,
        passphrase: &Passphrase,
    ) -> Result<EncryptedKeystoreBlob> {
        self.keystore.persist(key, passphrase).await
    }

    pub async fn unlock(&self, passphrase: &Passphrase) -> Result<KeyMaterial> {
        self.keystore.unlock(passphrase).await
    }

    pub async fn current_address(&self) -> Result<Option<Address>> {
        self.keystore.current_address().await
    }

    /// Sign a personal message on the user's own behalf.
    pub async fn sign_message(&self, passphrase: &Passphrase, message: &[u8]) -> Result<Signature> {
        self.keystore
            .sign_with_passphrase(passphrase, message.to_vec())
            .await
    }

    pub fn verify_message(
        &self,
        message: &[u8],
        signature: &Signature,
        address: Address,
    ) -> Result<bool> {
        self.keystore.verify(message, signature, address)
    }

    // ========== Peer Requests ==========

    pub async fn handle(&self, request: InboundRequest) -> Routed {
        self.router.handle(request).await
    }

    pub async fn handle_raw(&self, peer_id: &str, raw: &str) -> Routed {
        self.router.handle_raw(peer_id, raw).await
    }

    // ========== Sessions ==========

    /// Register a peer whose session was established by the transport.
    ///
    /// Repeated calls for the same peer update it in place. `chain` defaults
    /// to the configured chain.
    pub async fn on_connected(
        &self,
        peer_id: &str,
        metadata: PeerMetadata,
        chain: Option<ChainNetwork>,
    ) -> Result<PeerSession> {
        let chain = chain.unwrap_or(self.config.default_chain);
        let session = self
            .state
            .lock()
            .await
            .sessions
            .on_connected(peer_id, metadata, chain)
            .clone();

        if let Some(store) = &self.session_store {
            store.save(&session).await?;
        }
        tracing::info!(peer_id = %peer_id, domain = %session.origin_domain, "Peer connected");
        if let Some(audit) = &self.audit {
            audit.record(
                AuditEvent::new(AuditEventType::SessionConnected)
                    .with_peer(peer_id)
                    .with_details(serde_json::json!({
                        "domain": session.origin_domain,
                        "chain": session.chain.as_str(),
                    })),
            );
        }
        Ok(session)
    }

    /// Remove a peer and decline its outstanding requests.
    pub async fn on_disconnected(&self, peer_id: &str) -> Option<PeerSession> {
        self.authorizer.end_session(peer_id).await
    }

    pub async fn lookup(&self, peer_id: &str) -> Option<PeerSession> {
        self.state.lock().await.sessions.lookup(peer_id).cloned()
    }

    pub async fn session_for_origin(&self, origin: &str) -> Option<PeerSession> {
        self.state.lock().await.sessions.session_for_origin(origin).cloned()
    }

    pub async fn sessions(&self) -> Vec<PeerSession> {
        self.state.lock().await.sessions.sessions().cloned().collect()
    }

    pub async fn switch_chain(&self, peer_id: &str, chain: ChainNetwork) -> Result<PeerSession> {
        self.authorizer.switch_chain(peer_id, chain).await
    }

    /// Reload persisted sessions into the registry. Returns how many.
    pub async fn restore_sessions(&self) -> Result<usize> {
        let Some(store) = &self.session_store else {
            return Ok(0);
        };
        let sessions = store.load_all().await?;
        let count = sessions.len();

        let mut state = self.state.lock().await;
        for session in sessions {
            tracing::debug!(peer_id = %session.peer_id, "Restoring peer session");
            state.sessions.restore(session);
        }
        Ok(count)
    }

    // ========== Approval Surface ==========

    /// Receiver carrying the request the human should decide on.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthorizationRequest>> {
        self.authorizer.subscribe()
    }

    pub async fn active_request(&self) -> Option<AuthorizationRequest> {
        self.authorizer.active_request().await
    }

    pub async fn pending_count(&self) -> usize {
        self.authorizer.pending_count().await
    }

    pub async fn approve(&self, id: Uuid, passphrase: Option<&Passphrase>) -> Result<Approved> {
        self.authorizer.approve(id, passphrase).await
    }

    pub async fn reject(&self, id: Uuid) -> Result<()> {
        self.authorizer.reject(id).await
    }

    // ========== Chain ==========

    /// Gas price poller for a network. Run it with
    /// [`GasPriceMonitor::run`] on a spawned task.
    pub fn gas_monitor(
        &self,
        chain: ChainNetwork,
    ) -> (GasPriceMonitor, watch::Receiver<Option<u128>>) {
        GasPriceMonitor::new(self.chain.clone(), chain)
    }
}
