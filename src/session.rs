// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connected dApp sessions.
//!
//! The registry is owned by [`crate::state::WalletState`] and only mutated
//! under its lock. Disconnecting goes through the authorizer so the session
//! removal and the cancellation of its requests happen atomically.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::ChainNetwork;
use crate::error::{Result, WalletError};

/// Display metadata announced by a peer during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Origin URL of the dApp.
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

impl PeerMetadata {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            url: url.into(),
            icons: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// One connected remote counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSession {
    pub peer_id: String,
    pub metadata: PeerMetadata,
    /// Base domain of `metadata.url`, empty when the URL has no host.
    pub origin_domain: String,
    /// Network the session is bound to.
    pub chain: ChainNetwork,
    pub state: ConnectionState,
    pub connected_at: DateTime<Utc>,
}

impl PeerSession {
    pub fn new(peer_id: impl Into<String>, metadata: PeerMetadata, chain: ChainNetwork) -> Self {
        let origin_domain = base_domain(&metadata.url).unwrap_or_default();
        Self {
            peer_id: peer_id.into(),
            metadata,
            origin_domain,
            chain,
            state: ConnectionState::Connected,
            connected_at: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Registry of connected peers, keyed by peer id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, PeerSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a session.
    ///
    /// Repeated calls for the same peer refresh its metadata and chain but
    /// keep the original connection time.
    pub fn on_connected(
        &mut self,
        peer_id: &str,
        metadata: PeerMetadata,
        chain: ChainNetwork,
    ) -> &PeerSession {
        let fresh = PeerSession::new(peer_id, metadata, chain);
        let session = self
            .sessions
            .entry(peer_id.to_string())
            .and_modify(|existing| {
                existing.origin_domain = fresh.origin_domain.clone();
                existing.metadata = fresh.metadata.clone();
                existing.chain = fresh.chain;
                existing.state = ConnectionState::Connected;
            })
            .or_insert(fresh);

        tracing::debug!(
            peer_id = %session.peer_id,
            domain = %session.origin_domain,
            "Peer session connected"
        );
        session
    }

    /// Restore a previously persisted session as-is.
    pub fn restore(&mut self, mut session: PeerSession) {
        session.state = ConnectionState::Connected;
        self.sessions.insert(session.peer_id.clone(), session);
    }

    /// Remove a session, returning it marked disconnected.
    pub fn on_disconnected(&mut self, peer_id: &str) -> Option<PeerSession> {
        let mut session = self.sessions.remove(peer_id)?;
        session.state = ConnectionState::Disconnected;
        tracing::debug!(peer_id = %peer_id, "Peer session disconnected");
        Some(session)
    }

    pub fn lookup(&self, peer_id: &str) -> Option<&PeerSession> {
        self.sessions.get(peer_id)
    }

    /// Session whose origin shares a base domain with `origin`.
    ///
    /// `origin` may be a bare host (`app.example.com`) or a full URL. When
    /// several sessions match, the most recently connected one wins.
    pub fn session_for_origin(&self, origin: &str) -> Option<&PeerSession> {
        let domain = base_domain(origin)?;
        self.sessions
            .values()
            .filter(|s| !s.origin_domain.is_empty() && s.origin_domain == domain)
            .max_by_key(|s| s.connected_at)
    }

    /// Rebind a session to another network.
    pub fn switch_chain(&mut self, peer_id: &str, chain: ChainNetwork) -> Result<&PeerSession> {
        let session = self
            .sessions
            .get_mut(peer_id)
            .ok_or_else(|| WalletError::PeerMismatch(format!("unknown peer {peer_id}")))?;
        session.chain = chain;
        Ok(session)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &PeerSession> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Registrable domain of a URL or host: the last two host labels.
///
/// IP addresses and single-label hosts are returned whole. Returns `None`
/// when no host can be found.
pub fn base_domain(origin: &str) -> Option<String> {
    let origin = origin.trim();
    let parsed = url::Url::parse(origin)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| url::Url::parse(&format!("https://{origin}")).ok())?;

    match parsed.host()? {
        url::Host::Domain(host) => {
            let host = host.trim_end_matches('.').to_ascii_lowercase();
            let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
            if labels.is_empty() {
                return None;
            }
            let start = labels.len().saturating_sub(2);
            Some(labels[start..].join("."))
        }
        url::Host::Ipv4(ip) => Some(ip.to_string()),
        url::Host::Ipv6(ip) => Some(ip.to_string()),
    }
}
