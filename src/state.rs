// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mutable wallet state shared by the router, authorizer and service.
//!
//! Sessions and the request queue sit behind a single lock: the "at most one
//! active request" invariant spans both, so they are never locked separately.
//! Lock order is always state before keystore.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::authorizer::RequestQueue;
use crate::session::SessionRegistry;

/// Default bound of the authorization FIFO.
pub const DEFAULT_MAX_QUEUED_REQUESTS: usize = 10;

#[derive(Debug)]
pub struct WalletState {
    pub sessions: SessionRegistry,
    pub requests: RequestQueue,
}

impl WalletState {
    pub fn new(max_queued: usize) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            requests: RequestQueue::new(max_queued),
        }
    }
}

impl Default for WalletState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUED_REQUESTS)
    }
}

pub type SharedState = Arc<Mutex<WalletState>>;

pub fn shared(state: WalletState) -> SharedState {
    Arc::new(Mutex::new(state))
}
