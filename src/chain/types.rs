// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain types and constants.

use std::fmt;
use std::str::FromStr;

use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// EVM network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    pub chain_id: u64,
    /// Default public RPC endpoint
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
    /// Native currency symbol
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Ethereum Mainnet configuration.
pub const ETHEREUM_MAINNET: NetworkConfig = NetworkConfig {
    name: "Ethereum",
    chain_id: 1,
    rpc_url: "https://ethereum-rpc.publicnode.com",
    explorer_url: "https://etherscan.io",
    symbol: "ETH",
    decimals: 18,
};

/// Polygon PoS Mainnet configuration.
pub const POLYGON_MAINNET: NetworkConfig = NetworkConfig {
    name: "Polygon",
    chain_id: 137,
    rpc_url: "https://polygon-rpc.com",
    explorer_url: "https://polygonscan.com",
    symbol: "MATIC",
    decimals: 18,
};

/// Sepolia Testnet configuration.
pub const SEPOLIA_TESTNET: NetworkConfig = NetworkConfig {
    name: "Sepolia",
    chain_id: 11_155_111,
    rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
    explorer_url: "https://sepolia.etherscan.io",
    symbol: "ETH",
    decimals: 18,
};

/// Networks a session can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainNetwork {
    #[default]
    Ethereum,
    Polygon,
    Sepolia,
}

impl ChainNetwork {
    pub const ALL: [ChainNetwork; 3] = [
        ChainNetwork::Ethereum,
        ChainNetwork::Polygon,
        ChainNetwork::Sepolia,
    ];

    pub fn config(&self) -> &'static NetworkConfig {
        match self {
            ChainNetwork::Ethereum => &ETHEREUM_MAINNET,
            ChainNetwork::Polygon => &POLYGON_MAINNET,
            ChainNetwork::Sepolia => &SEPOLIA_TESTNET,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.config().chain_id
    }

    /// Network for a chain id. Unknown ids fall back to Ethereum.
    pub fn from_chain_id(chain_id: u64) -> Self {
        Self::ALL
            .into_iter()
            .find(|network| network.chain_id() == chain_id)
            .unwrap_or_default()
    }

    /// Lowercase identifier used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainNetwork::Ethereum => "ethereum",
            ChainNetwork::Polygon => "polygon",
            ChainNetwork::Sepolia => "sepolia",
        }
    }
}

impl fmt::Display for ChainNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config().name)
    }
}

impl FromStr for ChainNetwork {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|network| network.as_str() == value)
            .ok_or_else(|| WalletError::Config(format!("unknown chain: {s}")))
    }
}

/// A transfer requested by a peer, before nonce and fees are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub from: Address,
    pub to: Address,
    /// Amount in wei
    pub value: U256,
    pub data: Bytes,
    /// Gas limit supplied by the peer, estimated when absent
    pub gas: Option<u64>,
}

impl TransactionIntent {
    /// Human-readable amount summary shown on the approval surface.
    pub fn summary(&self, chain: ChainNetwork) -> String {
        let config = chain.config();
        let mut summary = format!(
            "Send {} {} to {} on {}",
            format_balance(self.value, config.decimals),
            config.symbol,
            self.to.to_checksum(None),
            config.name
        );
        if !self.data.is_empty() {
            summary.push_str(&format!(" with {} bytes of call data", self.data.len()));
        }
        summary
    }
}

/// Fully populated EIP-1559 transaction awaiting a signature.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub chain: ChainNetwork,
    pub tx: TxEip1559,
}

/// Signed transaction ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub chain: ChainNetwork,
    /// EIP-2718 encoded envelope
    pub raw: Bytes,
    pub hash: B256,
}

/// Format a balance with the specified number of decimals.
pub fn format_balance(balance: U256, decimals: u8) -> String {
    if balance.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = balance / divisor;
    let remainder = balance % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        // Up to 6 decimal places, truncated
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, &trimmed[..trimmed.len().min(6)])
        }
    }
}
