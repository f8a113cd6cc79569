// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Authorizer
//!
//! Turns validated peer requests into [`AuthorizationRequest`]s awaiting a
//! human decision, and carries out an approved action exactly once.
//!
//! ## Admission Policy
//!
//! - At most one request is active (shown to the human) at a time
//! - Further requests wait in a bounded FIFO queue, in arrival order
//! - When the queue overflows, the oldest queued request is declined
//! - Approving, rejecting or disconnecting resolves a request once; later
//!   calls on it return [`WalletError::RequestNotFound`] and have no effect
//!
//! While an approval is being carried out the request stays in the active
//! slot (marked in flight), so nothing else is surfaced until it completes.
//! The approval runs on its own task and finishes even if the caller stops
//! waiting for it. A disconnect during that window marks the request
//! cancelled; the pending side effect is then skipped and the peer declined.

use std::collections::VecDeque;
use std::sync::Arc;

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::chain::{ChainClient, ChainNetwork, TransactionIntent};
use crate::crypto::{signature_hex, KeyMaterial, Passphrase, Signature};
use crate::error::{Result, WalletError, CODE_LIMIT_EXCEEDED, CODE_USER_REJECTED};
use crate::keystore::Keystore;
use crate::rpc::{PeerResponse, PeerTransport, RequestId};
use crate::session::{PeerMetadata, PeerSession};
use crate::state::{SharedState, WalletState};
use crate::storage::{AuditEvent, AuditEventType, AuditLog, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    ConnectSession,
    SignMessage,
    SignTypedData,
    SendTransaction,
}

/// The action carried out on approval.
#[derive(Debug, Clone)]
pub enum PendingAction {
    ConnectSession { metadata: PeerMetadata },
    SignMessage { message: Vec<u8> },
    SignTypedData { typed_data: Box<TypedData> },
    SendTransaction { intent: TransactionIntent },
}

/// A pending action awaiting human approval.
///
/// Holds no secrets. The peer is referenced by id; the metadata is a display
/// snapshot taken when the request was created.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub id: Uuid,
    pub peer_id: String,
    pub peer: PeerMetadata,
    /// JSON-RPC id the outcome is delivered to.
    pub reply_to: RequestId,
    pub chain: ChainNetwork,
    /// Wallet account the peer addressed. `None` for session proposals.
    pub account: Option<Address>,
    pub summary: String,
    pub action: PendingAction,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationRequest {
    fn build(
        peer_id: &str,
        peer: PeerMetadata,
        reply_to: RequestId,
        chain: ChainNetwork,
        account: Option<Address>,
        summary: String,
        action: PendingAction,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_id: peer_id.to_string(),
            peer,
            reply_to,
            chain,
            account,
            summary,
            action,
            created_at: Utc::now(),
        }
    }

    /// Session proposal from a peer that is not connected yet.
    pub fn connect_session(
        peer_id: &str,
        reply_to: RequestId,
        metadata: PeerMetadata,
        chain: ChainNetwork,
    ) -> Self {
        let summary = format!("{} ({}) wants to connect on {chain}", metadata.name, metadata.url);
        Self::build(
            peer_id,
            metadata.clone(),
            reply_to,
            chain,
            None,
            summary,
            PendingAction::ConnectSession { metadata },
        )
    }

    pub fn sign_message(
        session: &PeerSession,
        reply_to: RequestId,
        account: Address,
        message: Vec<u8>,
    ) -> Self {
        let summary = String::from_utf8_lossy(&message).into_owned();
        Self::build(
            &session.peer_id,
            session.metadata.clone(),
            reply_to,
            session.chain,
            Some(account),
            summary,
            PendingAction::SignMessage { message },
        )
    }

    pub fn sign_typed_data(
        session: &PeerSession,
        reply_to: RequestId,
        account: Address,
        typed_data: TypedData,
    ) -> Self {
        let summary = format!("Sign typed data: {}", typed_data.primary_type);
        Self::build(
            &session.peer_id,
            session.metadata.clone(),
            reply_to,
            session.chain,
            Some(account),
            summary,
            PendingAction::SignTypedData {
                typed_data: Box::new(typed_data),
            },
        )
    }

    pub fn send_transaction(
        session: &PeerSession,
        reply_to: RequestId,
        intent: TransactionIntent,
    ) -> Self {
        let summary = intent.summary(session.chain);
        Self::build(
            &session.peer_id,
            session.metadata.clone(),
            reply_to,
            session.chain,
            Some(intent.from),
            summary,
            PendingAction::SendTransaction { intent },
        )
    }

    pub fn kind(&self) -> RequestKind {
        match self.action {
            PendingAction::ConnectSession { .. } => RequestKind::ConnectSession,
            PendingAction::SignMessage { .. } => RequestKind::SignMessage,
            PendingAction::SignTypedData { .. } => RequestKind::SignTypedData,
            PendingAction::SendTransaction { .. } => RequestKind::SendTransaction,
        }
    }

    /// Response sent when the human rejects the request.
    pub fn decline(&self) -> PeerResponse {
        match self.kind() {
            RequestKind::ConnectSession => PeerResponse::SessionRejected,
            _ => PeerResponse::user_rejected(),
        }
    }

    /// Response sent when the approved action failed.
    pub fn failure_response(&self, err: &WalletError) -> PeerResponse {
        match self.kind() {
            RequestKind::ConnectSession => PeerResponse::SessionRejected,
            _ => PeerResponse::from_error(err),
        }
    }

    fn auto_decline(&self, code: i64, message: &str) -> PeerResponse {
        match self.kind() {
            RequestKind::ConnectSession => PeerResponse::SessionRejected,
            _ => PeerResponse::Rejected {
                code,
                message: message.to_string(),
            },
        }
    }
}

/// Where a submitted request ended up.
#[derive(Debug)]
pub enum Admission {
    Active,
    Queued {
        position: usize,
        /// Oldest queued request, pushed out by the bound.
        evicted: Option<AuthorizationRequest>,
    },
}

/// Active slot plus bounded FIFO of waiting requests.
#[derive(Debug)]
pub struct RequestQueue {
    active: Option<AuthorizationRequest>,
    in_flight: bool,
    /// Set when the in-flight request's peer disconnected.
    cancelled: bool,
    queued: VecDeque<AuthorizationRequest>,
    max_queued: usize,
}

impl RequestQueue {
    pub fn new(max_queued: usize) -> Self {
        Self {
            active: None,
            in_flight: false,
            cancelled: false,
            queued: VecDeque::new(),
            max_queued,
        }
    }

    pub fn admit(&mut self, request: AuthorizationRequest) -> Admission {
        if self.active.is_none() {
            self.active = Some(request);
            return Admission::Active;
        }

        self.queued.push_back(request);
        let evicted = if self.queued.len() > self.max_queued {
            self.queued.pop_front()
        } else {
            None
        };
        Admission::Queued {
            position: self.queued.len(),
            evicted,
        }
    }

    pub fn active(&self) -> Option<&AuthorizationRequest> {
        self.active.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Whether `id` is in flight and its peer has since disconnected.
    pub fn is_cancelled(&self, id: Uuid) -> bool {
        self.in_flight && self.cancelled && self.active.as_ref().is_some_and(|a| a.id == id)
    }

    /// Active request plus queued ones.
    pub fn pending_count(&self) -> usize {
        usize::from(self.active.is_some()) + self.queued.len()
    }

    pub fn queued(&self) -> impl Iterator<Item = &AuthorizationRequest> {
        self.queued.iter()
    }

    /// Mark the active request as being carried out.
    pub fn begin(&mut self, id: Uuid) -> Result<AuthorizationRequest> {
        match &self.active {
            Some(active) if active.id == id && !self.in_flight => {
                self.in_flight = true;
                Ok(active.clone())
            }
            Some(active) if active.id == id => Err(WalletError::RequestNotFound(format!(
                "{id} is already being resolved"
            ))),
            _ if self.queued.iter().any(|r| r.id == id) => {
                Err(WalletError::NotActive(id.to_string()))
            }
            _ => Err(WalletError::RequestNotFound(id.to_string())),
        }
    }

    /// Clear the in-flight active request and promote the next one.
    pub fn finish(&mut self, id: Uuid) -> bool {
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            self.active = None;
            self.in_flight = false;
            self.cancelled = false;
            self.promote();
            true
        } else {
            false
        }
    }

    /// Remove a request that is not in flight, promoting if it was active.
    pub fn take(&mut self, id: Uuid) -> Option<AuthorizationRequest> {
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            if self.in_flight {
                return None;
            }
            let taken = self.active.take();
            self.promote();
            return taken;
        }

        let position = self.queued.iter().position(|r| r.id == id)?;
        self.queued.remove(position)
    }

    /// Remove every request of a peer that is not in flight.
    ///
    /// An in-flight request of the peer stays active but is marked
    /// cancelled; its approval declines instead of acting.
    pub fn drain_peer(&mut self, peer_id: &str) -> Vec<AuthorizationRequest> {
        let mut drained = Vec::new();

        if self.active.as_ref().is_some_and(|a| a.peer_id == peer_id) {
            if self.in_flight {
                self.cancelled = true;
            } else {
                drained.extend(self.active.take());
            }
        }

        let (theirs, others): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut self.queued)
            .into_iter()
            .partition(|r| r.peer_id == peer_id);
        self.queued = others;
        drained.extend(theirs);

        self.promote();
        drained
    }

    fn promote(&mut self) {
        if self.active.is_none() {
            self.active = self.queued.pop_front();
        }
    }
}

/// Result of a successful approval.
#[derive(Debug, Clone)]
pub enum Approved {
    Signature(Signature),
    TransactionHash(B256),
    SessionConnected { session: PeerSession, account: Address },
}

#[derive(Clone)]
pub struct TransactionAuthorizer {
    state: SharedState,
    keystore: Arc<Keystore>,
    chain: Arc<dyn ChainClient>,
    transport: Arc<dyn PeerTransport>,
    session_store: Option<Arc<dyn SessionStore>>,
    audit: Option<AuditLog>,
    wallet_meta: PeerMetadata,
    active_tx: Arc<watch::Sender<Option<AuthorizationRequest>>>,
}

impl TransactionAuthorizer {
    pub fn new(
        state: SharedState,
        keystore: Arc<Keystore>,
        chain: Arc<dyn ChainClient>,
        transport: Arc<dyn PeerTransport>,
        wallet_meta: PeerMetadata,
    ) -> Self {
        let (active_tx, _) = watch::channel(None);
        Self {
            state,
            keystore,
            chain,
            transport,
            session_store: None,
            audit: None,
            wallet_meta,
            active_tx: Arc::new(active_tx),
        }
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Receiver carrying the currently active request.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthorizationRequest>> {
        self.active_tx.subscribe()
    }

    pub async fn active_request(&self) -> Option<AuthorizationRequest> {
        self.state.lock().await.requests.active().cloned()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.requests.pending_count()
    }

    // ========== Request Creation ==========

    /// Queue a request for approval.
    ///
    /// Requests other than session proposals are refused with
    /// `PeerMismatch` if their peer is no longer connected.
    pub async fn submit(&self, request: AuthorizationRequest) -> Result<AuthorizationRequest> {
        let admission = {
            let mut state = self.state.lock().await;
            if request.kind() != RequestKind::ConnectSession
                && state.sessions.lookup(&request.peer_id).is_none()
            {
                return Err(WalletError::PeerMismatch(format!(
                    "peer {} is not connected",
                    request.peer_id
                )));
            }
            let admission = state.requests.admit(request.clone());
            self.publish(&state);
            admission
        };

        match admission {
            Admission::Active => {
                tracing::info!(
                    request_id = %request.id,
                    peer_id = %request.peer_id,
                    kind = ?request.kind(),
                    "Authorization request active"
                );
            }
            Admission::Queued { position, evicted } => {
                tracing::info!(
                    request_id = %request.id,
                    peer_id = %request.peer_id,
                    kind = ?request.kind(),
                    position,
                    "Authorization request queued"
                );
                if let Some(evicted) = evicted {
                    tracing::warn!(
                        request_id = %evicted.id,
                        peer_id = %evicted.peer_id,
                        "Authorization queue full, declining oldest queued request"
                    );
                    let response =
                        evicted.auto_decline(CODE_LIMIT_EXCEEDED, "Too many pending requests");
                    self.deliver(&evicted, response).await;
                    self.record(
                        AuditEvent::new(AuditEventType::RequestAutoRejected)
                            .with_peer(evicted.peer_id.clone())
                            .with_request(evicted.id)
                            .with_details(serde_json::json!({ "reason": "queue_full" })),
                    );
                }
            }
        }

        Ok(request)
    }

    pub async fn request_session(
        &self,
        peer_id: &str,
        reply_to: RequestId,
        metadata: PeerMetadata,
        chain: ChainNetwork,
    ) -> Result<AuthorizationRequest> {
        self.submit(AuthorizationRequest::connect_session(
            peer_id, reply_to, metadata, chain,
        ))
        .await
    }

    pub async fn request_signature(
        &self,
        session: &PeerSession,
        reply_to: RequestId,
        account: Address,
        message: Vec<u8>,
    ) -> Result<AuthorizationRequest> {
        self.submit(AuthorizationRequest::sign_message(
            session, reply_to, account, message,
        ))
        .await
    }

    pub async fn request_typed_signature(
        &self,
        session: &PeerSession,
        reply_to: RequestId,
        account: Address,
        typed_data: TypedData,
    ) -> Result<AuthorizationRequest> {
        self.submit(AuthorizationRequest::sign_typed_data(
            session, reply_to, account, typed_data,
        ))
        .await
    }

    pub async fn request_transaction(
        &self,
        session: &PeerSession,
        reply_to: RequestId,
        intent: TransactionIntent,
    ) -> Result<AuthorizationRequest> {
        self.submit(AuthorizationRequest::send_transaction(
            session, reply_to, intent,
        ))
        .await
    }

    // ========== Decisions ==========

    /// Carry out the active request.
    ///
    /// The passphrase unlocks the keystore for this one operation; session
    /// proposals don't need it. Whether it succeeds or fails, the peer gets
    /// exactly one response and the request is resolved.
    ///
    /// The action runs on a spawned task: dropping the returned future does
    /// not abandon the request, it still completes and the queue advances.
    pub async fn approve(&self, id: Uuid, passphrase: Option<&Passphrase>) -> Result<Approved> {
        let request = self.state.lock().await.requests.begin(id)?;
        tracing::info!(
            request_id = %id,
            peer_id = %request.peer_id,
            kind = ?request.kind(),
            "Authorization request approved"
        );

        let this = self.clone();
        let passphrase = passphrase.cloned();
        let task_request = request.clone();
        let task = tokio::spawn(async move { this.resolve(task_request, passphrase).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = WalletError::CryptoBackend(format!("approval task failed: {e}"));
                tracing::error!(request_id = %id, error = %e, "Approval task aborted");
                let still_active = {
                    let mut state = self.state.lock().await;
                    let finished = state.requests.finish(id);
                    self.publish(&state);
                    finished
                };
                if still_active {
                    self.deliver(&request, request.failure_response(&err)).await;
                }
                Err(err)
            }
        }
    }

    async fn resolve(
        &self,
        request: AuthorizationRequest,
        passphrase: Option<Passphrase>,
    ) -> Result<Approved> {
        let id = request.id;
        let outcome = self.execute(&request, passphrase.as_ref()).await;
        let response = match &outcome {
            Ok(approved) => self.response_for(approved),
            Err(e @ WalletError::Disconnected(_)) => {
                tracing::info!(
                    request_id = %id,
                    peer_id = %request.peer_id,
                    "Approved request cancelled by disconnect"
                );
                request.failure_response(e)
            }
            Err(e) => {
                tracing::warn!(request_id = %id, error = %e, "Approved request failed");
                request.failure_response(e)
            }
        };
        self.deliver(&request, response).await;

        {
            let mut state = self.state.lock().await;
            state.requests.finish(id);
            self.publish(&state);
        }

        self.record_outcome(&request, &outcome);
        outcome
    }

    /// Decline a request, active or queued.
    pub async fn reject(&self, id: Uuid) -> Result<()> {
        let request = {
            let mut state = self.state.lock().await;
            let request = state
                .requests
                .take(id)
                .ok_or_else(|| WalletError::RequestNotFound(id.to_string()))?;
            self.publish(&state);
            request
        };

        tracing::info!(request_id = %id, peer_id = %request.peer_id, "Authorization request rejected");
        self.deliver(&request, request.decline()).await;
        self.record(
            AuditEvent::new(AuditEventType::RequestRejected)
                .with_peer(request.peer_id.clone())
                .with_request(request.id),
        );
        Ok(())
    }

    /// Decline every unresolved request of a peer. Returns how many.
    pub async fn cancel_on_disconnect(&self, peer_id: &str) -> usize {
        let cancelled = {
            let mut state = self.state.lock().await;
            self.cancel_locked(&mut state, peer_id)
        };
        self.deliver_cancelled(cancelled).await
    }

    /// Remove a peer's requests while the caller holds the state lock.
    pub(crate) fn cancel_locked(
        &self,
        state: &mut WalletState,
        peer_id: &str,
    ) -> Vec<AuthorizationRequest> {
        let cancelled = state.requests.drain_peer(peer_id);
        if !cancelled.is_empty() {
            self.publish(state);
        }
        cancelled
    }

    pub(crate) async fn deliver_cancelled(&self, cancelled: Vec<AuthorizationRequest>) -> usize {
        let count = cancelled.len();
        for request in cancelled {
            tracing::info!(
                request_id = %request.id,
                peer_id = %request.peer_id,
                "Authorization request cancelled by disconnect"
            );
            let response = request.auto_decline(CODE_USER_REJECTED, "Session disconnected");
            self.deliver(&request, response).await;
            self.record(
                AuditEvent::new(AuditEventType::RequestAutoRejected)
                    .with_peer(request.peer_id.clone())
                    .with_request(request.id)
                    .with_details(serde_json::json!({ "reason": "disconnected" })),
            );
        }
        count
    }

    // ========== Session Lifecycle ==========

    /// Disconnect a peer: drop its session and decline its requests.
    ///
    /// Session removal and request cancellation happen under one lock, so no
    /// request of the peer can be admitted in between.
    pub async fn end_session(&self, peer_id: &str) -> Option<PeerSession> {
        let (session, cancelled) = {
            let mut state = self.state.lock().await;
            let session = state.sessions.on_disconnected(peer_id);
            let cancelled = self.cancel_locked(&mut state, peer_id);
            (session, cancelled)
        };
        let cancelled = self.deliver_cancelled(cancelled).await;

        if let Some(store) = &self.session_store {
            if let Err(e) = store.remove(peer_id).await {
                tracing::warn!(peer_id = %peer_id, error = %e, "Failed to remove persisted session");
            }
        }
        if session.is_some() {
            tracing::info!(peer_id = %peer_id, cancelled, "Peer session ended");
            self.record(
                AuditEvent::new(AuditEventType::SessionDisconnected)
                    .with_peer(peer_id)
                    .with_details(serde_json::json!({ "cancelled_requests": cancelled })),
            );
        }
        session
    }

    /// Rebind a connected session to another network.
    pub async fn switch_chain(&self, peer_id: &str, chain: ChainNetwork) -> Result<PeerSession> {
        let session = self
            .state
            .lock()
            .await
            .sessions
            .switch_chain(peer_id, chain)?
            .clone();

        if let Some(store) = &self.session_store {
            store.save(&session).await?;
        }
        tracing::info!(peer_id = %peer_id, chain = %chain, "Session chain switched");
        Ok(session)
    }

    pub fn wallet_meta(&self) -> &PeerMetadata {
        &self.wallet_meta
    }

    // ========== Internals ==========

    async fn execute(
        &self,
        request: &AuthorizationRequest,
        passphrase: Option<&Passphrase>,
    ) -> Result<Approved> {
        let account = request.account;
        self.ensure_live(request).await?;
        match &request.action {
            PendingAction::ConnectSession { metadata } => {
                let address = self
                    .keystore
                    .current_address()
                    .await?
                    .ok_or(WalletError::NoWallet)?;

                let session = {
                    let mut state = self.state.lock().await;
                    if state.requests.is_cancelled(request.id) {
                        return Err(WalletError::Disconnected(request.peer_id.clone()));
                    }
                    state
                        .sessions
                        .on_connected(&request.peer_id, metadata.clone(), request.chain)
                        .clone()
                };

                if let Some(store) = &self.session_store {
                    if let Err(e) = store.save(&session).await {
                        tracing::warn!(peer_id = %session.peer_id, error = %e, "Failed to persist session");
                    }
                    // A disconnect may have removed the record before it was saved.
                    if self.ensure_live(request).await.is_err() {
                        if let Err(e) = store.remove(&session.peer_id).await {
                            tracing::warn!(peer_id = %session.peer_id, error = %e, "Failed to remove persisted session");
                        }
                        return Err(WalletError::Disconnected(request.peer_id.clone()));
                    }
                }
                Ok(Approved::SessionConnected {
                    session,
                    account: address,
                })
            }
            PendingAction::SignMessage { message } => {
                let passphrase = passphrase.ok_or(WalletError::WrongPassphrase)?;
                let message = message.clone();
                let signature = self
                    .keystore
                    .with_unlocked(passphrase, move |backend, key| {
                        ensure_account(key, account)?;
                        backend.sign_message(key, &message)
                    })
                    .await?;
                self.ensure_live(request).await?;
                Ok(Approved::Signature(signature))
            }
            PendingAction::SignTypedData { typed_data } => {
                let passphrase = passphrase.ok_or(WalletError::WrongPassphrase)?;
                let typed_data = typed_data.clone();
                let signature = self
                    .keystore
                    .with_unlocked(passphrase, move |backend, key| {
                        ensure_account(key, account)?;
                        backend.sign_typed_data(key, &typed_data)
                    })
                    .await?;
                self.ensure_live(request).await?;
                Ok(Approved::Signature(signature))
            }
            PendingAction::SendTransaction { intent } => {
                let passphrase = passphrase.ok_or(WalletError::WrongPassphrase)?;
                let unsigned = self.chain.prepare(intent, request.chain).await?;
                let signed = self
                    .keystore
                    .with_unlocked(passphrase, move |backend, key| {
                        ensure_account(key, account)?;
                        backend.sign_transaction(key, unsigned)
                    })
                    .await?;
                self.ensure_live(request).await?;
                let hash = self.chain.broadcast(&signed).await?;
                Ok(Approved::TransactionHash(hash))
            }
        }
    }

    /// Fails with `Disconnected` once the request's peer has gone.
    async fn ensure_live(&self, request: &AuthorizationRequest) -> Result<()> {
        if self.state.lock().await.requests.is_cancelled(request.id) {
            return Err(WalletError::Disconnected(request.peer_id.clone()));
        }
        Ok(())
    }

    fn response_for(&self, approved: &Approved) -> PeerResponse {
        match approved {
            Approved::Signature(signature) => PeerResponse::Signature(signature_hex(signature)),
            Approved::TransactionHash(hash) => PeerResponse::TransactionHash(hash.to_string()),
            Approved::SessionConnected { session, account } => PeerResponse::SessionApproved {
                accounts: vec![account.to_checksum(None)],
                chain_id: session.chain.chain_id(),
                wallet_meta: self.wallet_meta.clone(),
            },
        }
    }

    /// Best-effort delivery: a failure to reach the peer is logged only.
    async fn deliver(&self, request: &AuthorizationRequest, response: PeerResponse) {
        if let Err(e) = self
            .transport
            .send_response(&request.peer_id, &request.reply_to, response)
            .await
        {
            tracing::warn!(
                request_id = %request.id,
                peer_id = %request.peer_id,
                error = %e,
                "Failed to deliver response to peer"
            );
        }
    }

    fn publish(&self, state: &WalletState) {
        self.active_tx.send_replace(state.requests.active().cloned());
    }

    fn record_outcome(&self, request: &AuthorizationRequest, outcome: &Result<Approved>) {
        if let Err(WalletError::Disconnected(_)) = outcome {
            self.record(
                AuditEvent::new(AuditEventType::RequestAutoRejected)
                    .with_peer(request.peer_id.clone())
                    .with_request(request.id)
                    .with_details(serde_json::json!({ "reason": "disconnected" })),
            );
            return;
        }
        let event_type = match request.kind() {
            RequestKind::ConnectSession => AuditEventType::SessionConnected,
            RequestKind::SignMessage => AuditEventType::MessageSigned,
            RequestKind::SignTypedData => AuditEventType::TypedDataSigned,
            RequestKind::SendTransaction => AuditEventType::TransactionBroadcast,
        };
        let mut event = AuditEvent::new(event_type)
            .with_peer(request.peer_id.clone())
            .with_request(request.id);
        if let Some(account) = request.account {
            event = event.with_address(account.to_checksum(None));
        }
        event = match outcome {
            Ok(Approved::TransactionHash(hash)) => {
                event.with_details(serde_json::json!({ "tx_hash": hash.to_string() }))
            }
            Ok(_) => event,
            Err(e) => event.failed(e.to_string()),
        };
        self.record(event);
    }

    fn record(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }
}

fn ensure_account(key: &KeyMaterial, account: Option<Address>) -> Result<()> {
    match account {
        Some(account) if account != key.address() => Err(WalletError::PeerMismatch(
            "request addresses a different account".into(),
        )),
        _ => Ok(()),
    }
}
