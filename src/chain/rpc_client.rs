// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC chain client over alloy HTTP providers.

use std::collections::HashMap;

use alloy::consensus::TxEip1559;
use alloy::network::Ethereum;
use alloy::primitives::{TxKind, B256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

use super::types::{ChainNetwork, SignedTransaction, TransactionIntent, UnsignedTransaction};
use super::ChainClient;
use crate::error::{Result, WalletError};

/// Chain client with one HTTP provider per supported network.
pub struct RpcChainClient {
    providers: HashMap<ChainNetwork, RootProvider<Ethereum>>,
}

impl RpcChainClient {
    /// Build providers for every network, using `overrides` where given and
    /// the public endpoint otherwise.
    pub fn new(overrides: &HashMap<ChainNetwork, String>) -> Result<Self> {
        let mut providers = HashMap::new();
        for network in ChainNetwork::ALL {
            let raw = overrides
                .get(&network)
                .map(String::as_str)
                .unwrap_or(network.config().rpc_url);
            let url: url::Url = raw.parse().map_err(|e: url::ParseError| {
                WalletError::Config(format!("invalid RPC URL for {}: {e}", network.as_str()))
            })?;
            providers.insert(network, RootProvider::new_http(url));
        }
        Ok(Self { providers })
    }

    fn provider(&self, chain: ChainNetwork) -> Result<&RootProvider<Ethereum>> {
        self.providers
            .get(&chain)
            .ok_or_else(|| WalletError::Chain(format!("no provider for {}", chain.as_str())))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn prepare(
        &self,
        intent: &TransactionIntent,
        chain: ChainNetwork,
    ) -> Result<UnsignedTransaction> {
        let provider = self.provider(chain)?;

        let nonce = provider
            .get_transaction_count(intent.from)
            .pending()
            .await
            .map_err(|e| WalletError::Chain(format!("Failed to get nonce: {e}")))?;

        let fees = provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| WalletError::Chain(format!("Fee estimation failed: {e}")))?;

        let gas_limit = match intent.gas {
            Some(gas) => gas,
            None => {
                let request = TransactionRequest::default()
                    .from(intent.from)
                    .to(intent.to)
                    .value(intent.value)
                    .input(intent.data.clone().into());
                provider
                    .estimate_gas(request)
                    .await
                    .map_err(|e| WalletError::Chain(format!("Gas estimation failed: {e}")))?
            }
        };

        tracing::debug!(
            chain = chain.as_str(),
            nonce,
            gas_limit,
            max_fee_per_gas = fees.max_fee_per_gas,
            "Prepared transaction"
        );

        Ok(UnsignedTransaction {
            chain,
            tx: TxEip1559 {
                chain_id: chain.chain_id(),
                nonce,
                gas_limit,
                max_fee_per_gas: fees.max_fee_per_gas,
                max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
                to: TxKind::Call(intent.to),
                value: intent.value,
                input: intent.data.clone(),
                ..Default::default()
            },
        })
    }

    async fn broadcast(&self, signed: &SignedTransaction) -> Result<B256> {
        let pending = self
            .provider(signed.chain)?
            .send_raw_transaction(&signed.raw)
            .await
            .map_err(|e| WalletError::Chain(format!("Broadcast failed: {e}")))?;

        let tx_hash = *pending.tx_hash();
        tracing::info!(
            chain = signed.chain.as_str(),
            tx_hash = %tx_hash,
            explorer = %format!("{}/tx/{tx_hash}", signed.chain.config().explorer_url),
            "Transaction broadcast"
        );
        Ok(tx_hash)
    }

    async fn gas_price(&self, chain: ChainNetwork) -> Result<u128> {
        self.provider(chain)?
            .get_gas_price()
            .await
            .map_err(|e| WalletError::Chain(format!("Failed to get gas price: {e}")))
    }
}
