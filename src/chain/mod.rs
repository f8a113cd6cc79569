// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Chain Module
//!
//! Transaction preparation and broadcast for EVM networks.
//!
//! The authorizer never talks to a node directly. It asks a [`ChainClient`]
//! to fill nonce, fees and gas into an [`UnsignedTransaction`], has the
//! keystore sign it, then hands the [`SignedTransaction`] back for broadcast.

pub mod gas;
pub mod rpc_client;
pub mod types;

use alloy::primitives::B256;
use async_trait::async_trait;

use crate::error::Result;

pub use gas::GasPriceMonitor;
pub use rpc_client::RpcChainClient;
pub use types::{
    format_balance, ChainNetwork, NetworkConfig, SignedTransaction, TransactionIntent,
    UnsignedTransaction, ETHEREUM_MAINNET, POLYGON_MAINNET, SEPOLIA_TESTNET,
};

/// Node access used for outgoing transactions.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fill nonce, EIP-1559 fees and gas limit for an intent.
    async fn prepare(
        &self,
        intent: &TransactionIntent,
        chain: ChainNetwork,
    ) -> Result<UnsignedTransaction>;

    /// Submit a signed transaction, returning its hash.
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<B256>;

    /// Current gas price in wei.
    async fn gas_price(&self, chain: ChainNetwork) -> Result<u128>;
}
