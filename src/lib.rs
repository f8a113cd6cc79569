// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet Custody - key custody and dApp request authorization core
//!
//! This crate owns a wallet secret (a BIP-39 mnemonic-derived secp256k1 key,
//! encrypted at rest), routes signing requests from connected dApp peers, and
//! only signs after an explicit human approval.
//!
//! ## Modules
//!
//! - `keystore` - Wallet creation, import, encrypted persistence, signing
//! - `authorizer` - Human approval queue for peer requests
//! - `router` - JSON-RPC method dispatch for peer requests
//! - `session` - Connected peer registry
//! - `service` - Composition root
//! - `crypto` - Cryptographic backend (BIP-39, secp256k1, Argon2id, AES-GCM)
//! - `chain` - EVM transaction preparation and broadcast
//! - `storage` - Keystore blobs, persisted sessions, audit log

pub mod authorizer;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod router;
pub mod rpc;
pub mod service;
pub mod session;
pub mod state;
pub mod storage;

pub use authorizer::{Approved, AuthorizationRequest, RequestKind, TransactionAuthorizer};
pub use chain::{ChainClient, ChainNetwork, TransactionIntent};
pub use config::{init_tracing, LogFormat, WalletConfig};
pub use crypto::{CryptoBackend, KeyMaterial, LocalBackend, Mnemonic, Passphrase, Signature};
pub use error::{Result, WalletError};
pub use keystore::Keystore;
pub use router::{PeerRequestRouter, Routed};
pub use rpc::{ChannelTransport, InboundRequest, PeerResponse, PeerTransport, RequestId};
pub use service::{Collaborators, WalletService};
pub use session::{PeerMetadata, PeerSession, SessionRegistry};
