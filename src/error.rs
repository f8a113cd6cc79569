// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for wallet custody and request authorization.
//!
//! Errors raised while handling a peer request never escape the router or
//! authorizer: they are converted into a decline sent back to that peer using
//! [`WalletError::rpc_code`]. Errors from user-initiated actions (create,
//! import, unlock) are returned to the caller for display.

use crate::storage::StorageError;

/// Result type alias for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;

/// EIP-1193 code for a request the user rejected.
pub const CODE_USER_REJECTED: i64 = 4001;
/// EIP-1193 code for a request from an unauthorized origin or account.
pub const CODE_UNAUTHORIZED: i64 = 4100;
/// JSON-RPC code for an invalid request object or unknown method.
pub const CODE_INVALID_REQUEST: i64 = -32600;
/// JSON-RPC code for malformed parameters.
pub const CODE_INVALID_PARAMS: i64 = -32602;
/// JSON-RPC code for an internal failure.
pub const CODE_INTERNAL: i64 = -32603;
/// EIP-1474 code for a request dropped because a limit was exceeded.
pub const CODE_LIMIT_EXCEEDED: i64 = -32005;

/// Errors that can occur in the wallet core.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Wrong passphrase")]
    WrongPassphrase,

    #[error("No wallet present")]
    NoWallet,

    #[error("Crypto backend error: {0}")]
    CryptoBackend(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Peer mismatch: {0}")]
    PeerMismatch(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Peer disconnected: {0}")]
    Disconnected(String),

    #[error("Authorization request not found: {0}")]
    RequestNotFound(String),

    #[error("Authorization request is queued, not active: {0}")]
    NotActive(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl WalletError {
    /// JSON-RPC error code used when this error is reported to a peer.
    pub fn rpc_code(&self) -> i64 {
        match self {
            WalletError::PeerMismatch(_) => CODE_UNAUTHORIZED,
            WalletError::Disconnected(_) => CODE_USER_REJECTED,
            WalletError::MalformedRequest(_) => CODE_INVALID_PARAMS,
            WalletError::RequestNotFound(_) | WalletError::NotActive(_) => CODE_INVALID_REQUEST,
            WalletError::WrongPassphrase
            | WalletError::NoWallet
            | WalletError::InvalidMnemonic(_)
            | WalletError::CryptoBackend(_)
            | WalletError::Chain(_)
            | WalletError::Persistence(_)
            | WalletError::Config(_) => CODE_INTERNAL,
        }
    }

    /// Message safe to send to a remote peer.
    ///
    /// Local failures (passphrase, storage) are not described to the peer.
    pub fn peer_message(&self) -> String {
        match self {
            WalletError::PeerMismatch(_) => "Request does not match the connected wallet".into(),
            WalletError::MalformedRequest(msg) => format!("Invalid request: {msg}"),
            WalletError::Chain(_) => "Transaction could not be broadcast".into(),
            WalletError::Disconnected(_) => "Session disconnected".into(),
            _ => "Request could not be completed".into(),
        }
    }
}

impl From<StorageError> for WalletError {
    fn from(e: StorageError) -> Self {
        WalletError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::MalformedRequest(e.to_string())
    }
}
