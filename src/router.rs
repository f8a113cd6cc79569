// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Peer Request Router
//!
//! Classifies inbound JSON-RPC requests from connected peers and routes them
//! to the [`TransactionAuthorizer`] or the session registry.
//!
//! Every request gets exactly one answer. Requests that become an
//! authorization request are answered by the authorizer once resolved; all
//! others (unknown methods, malformed params, account or origin mismatches)
//! are answered here immediately and never reach the human.
//!
//! ## Methods
//!
//! | Method | Params |
//! |--------|--------|
//! | `personal_sign` | `[message, address]` |
//! | `eth_sign` | `[address, message]` |
//! | `eth_signTypedData`, `eth_signTypedData_v4` | `[address, typedData]` |
//! | `eth_sendTransaction` | `[{from, to, value?, data?, gas?}]` |
//! | `wc_sessionRequest` | `[{peerMeta, chainId?}]` |
//! | `wc_sessionUpdate` | `[{approved, chainId?}]` |

use std::sync::Arc;

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, Bytes, U256};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::authorizer::TransactionAuthorizer;
use crate::chain::{ChainNetwork, TransactionIntent};
use crate::error::{Result, WalletError};
use crate::keystore::{address_matches, Keystore};
use crate::rpc::{InboundRequest, PeerResponse, PeerTransport, RequestId};
use crate::session::{base_domain, PeerMetadata, PeerSession};
use crate::state::SharedState;

/// What became of a routed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Waiting for a human decision; the authorizer will answer.
    Pending(Uuid),
    /// Answered immediately with this response.
    Responded(PeerResponse),
}

pub struct PeerRequestRouter {
    state: SharedState,
    authorizer: Arc<TransactionAuthorizer>,
    keystore: Arc<Keystore>,
    transport: Arc<dyn PeerTransport>,
    default_chain: ChainNetwork,
}

impl PeerRequestRouter {
    pub fn new(
        state: SharedState,
        authorizer: Arc<TransactionAuthorizer>,
        keystore: Arc<Keystore>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            state,
            authorizer,
            keystore,
            transport,
            default_chain: ChainNetwork::default(),
        }
    }

    /// Chain used for session proposals that don't name one.
    pub fn with_default_chain(mut self, chain: ChainNetwork) -> Self {
        self.default_chain = chain;
        self
    }

    /// Parse and route a raw JSON-RPC payload.
    pub async fn handle_raw(&self, peer_id: &str, raw: &str) -> Routed {
        match InboundRequest::from_json(peer_id, raw) {
            Ok(request) => self.handle(request).await,
            Err((id, e)) => {
                tracing::warn!(peer_id = %peer_id, error = %e, "Unparseable peer request");
                let response = PeerResponse::from_error(&e);
                self.respond(peer_id, &id, response.clone()).await;
                Routed::Responded(response)
            }
        }
    }

    /// Route one request. Never fails: errors become a response to the peer.
    pub async fn handle(&self, request: InboundRequest) -> Routed {
        tracing::debug!(
            peer_id = %request.peer_id,
            request_id = %request.id,
            method = %request.method,
            "Routing peer request"
        );

        let response = match self.route(&request).await {
            Ok(Routed::Pending(id)) => return Routed::Pending(id),
            Ok(Routed::Responded(response)) => response,
            Err(e) => {
                tracing::warn!(
                    peer_id = %request.peer_id,
                    request_id = %request.id,
                    method = %request.method,
                    error = %e,
                    "Peer request declined"
                );
                PeerResponse::from_error(&e)
            }
        };

        self.respond(&request.peer_id, &request.id, response.clone()).await;
        Routed::Responded(response)
    }

    async fn route(&self, request: &InboundRequest) -> Result<Routed> {
        let params = &request.params;
        match request.method.as_str() {
            // Signing
            "personal_sign" => {
                let items = positional(params, "personal_sign", 2)?;
                let message = decode_message(string_param(items, 0, "message")?);
                let address = string_param(items, 1, "address")?;
                self.sign_message(request, address, message).await
            }
            "eth_sign" => {
                let items = positional(params, "eth_sign", 2)?;
                let address = string_param(items, 0, "address")?;
                let message = decode_message(string_param(items, 1, "message")?);
                self.sign_message(request, address, message).await
            }
            "eth_signTypedData" | "eth_signTypedData_v4" => {
                let items = positional(params, &request.method, 2)?;
                let address = string_param(items, 0, "address")?;
                let typed_data = decode_typed_data(&items[1])?;
                self.sign_typed_data(request, address, typed_data).await
            }

            // Transactions
            "eth_sendTransaction" => {
                let items = positional(params, "eth_sendTransaction", 1)?;
                let tx: TransactionParams = decode_object(&items[0], "transaction")?;
                self.send_transaction(request, tx).await
            }

            // Sessions
            "wc_sessionRequest" => {
                let items = positional(params, "wc_sessionRequest", 1)?;
                let proposal: SessionRequestParams = decode_object(&items[0], "session request")?;
                self.propose_session(request, proposal).await
            }
            "wc_sessionUpdate" => {
                let items = positional(params, "wc_sessionUpdate", 1)?;
                let update: SessionUpdateParams = decode_object(&items[0], "session update")?;
                self.update_session(request, update).await
            }

            method => Ok(Routed::Responded(PeerResponse::unknown_method(method))),
        }
    }

    async fn sign_message(
        &self,
        request: &InboundRequest,
        claimed: &str,
        message: Vec<u8>,
    ) -> Result<Routed> {
        let session = self.session_for(request).await?;
        let account = self.wallet_account(claimed).await?;
        let pending = self
            .authorizer
            .request_signature(&session, request.id.clone(), account, message)
            .await?;
        Ok(Routed::Pending(pending.id))
    }

    async fn sign_typed_data(
        &self,
        request: &InboundRequest,
        claimed: &str,
        typed_data: TypedData,
    ) -> Result<Routed> {
        let session = self.session_for(request).await?;
        let account = self.wallet_account(claimed).await?;
        let pending = self
            .authorizer
            .request_typed_signature(&session, request.id.clone(), account, typed_data)
            .await?;
        Ok(Routed::Pending(pending.id))
    }

    async fn send_transaction(
        &self,
        request: &InboundRequest,
        tx: TransactionParams,
    ) -> Result<Routed> {
        let intent = tx.into_intent()?;
        let session = self.session_for(request).await?;
        let from = self.wallet_account(&intent.from.to_string()).await?;
        let intent = TransactionIntent { from, ..intent };
        let pending = self
            .authorizer
            .request_transaction(&session, request.id.clone(), intent)
            .await?;
        Ok(Routed::Pending(pending.id))
    }

    async fn propose_session(
        &self,
        request: &InboundRequest,
        proposal: SessionRequestParams,
    ) -> Result<Routed> {
        let chain = proposal
            .chain_id
            .map(ChainNetwork::from_chain_id)
            .unwrap_or(self.default_chain);
        let pending = self
            .authorizer
            .request_session(&request.peer_id, request.id.clone(), proposal.peer_meta, chain)
            .await?;
        Ok(Routed::Pending(pending.id))
    }

    async fn update_session(
        &self,
        request: &InboundRequest,
        update: SessionUpdateParams,
    ) -> Result<Routed> {
        let session = self.session_for(request).await?;

        if !update.approved {
            self.authorizer.end_session(&session.peer_id).await;
            return Ok(Routed::Responded(PeerResponse::SessionRejected));
        }

        let session = match update.chain_id {
            Some(chain_id) => {
                self.authorizer
                    .switch_chain(&session.peer_id, ChainNetwork::from_chain_id(chain_id))
                    .await?
            }
            None => session,
        };

        let accounts = self
            .keystore
            .current_address()
            .await?
            .map(|address| vec![address.to_checksum(None)])
            .unwrap_or_default();
        Ok(Routed::Responded(PeerResponse::SessionApproved {
            accounts,
            chain_id: session.chain.chain_id(),
            wallet_meta: self.authorizer.wallet_meta().clone(),
        }))
    }

    /// Connected session of the requesting peer.
    ///
    /// When the request names an origin, it must share the session's base
    /// domain.
    async fn session_for(&self, request: &InboundRequest) -> Result<PeerSession> {
        let state = self.state.lock().await;
        let session = state
            .sessions
            .lookup(&request.peer_id)
            .cloned()
            .ok_or_else(|| {
                WalletError::PeerMismatch(format!("peer {} is not connected", request.peer_id))
            })?;

        if let Some(origin) = &request.origin {
            let bound = !session.origin_domain.is_empty()
                && base_domain(origin).is_some_and(|domain| domain == session.origin_domain);
            if !bound {
                return Err(WalletError::PeerMismatch(format!(
                    "origin {origin} is not bound to peer {}",
                    session.peer_id
                )));
            }
        }
        Ok(session)
    }

    /// The wallet account, if `claimed` names it.
    async fn wallet_account(&self, claimed: &str) -> Result<Address> {
        let address = self
            .keystore
            .current_address()
            .await?
            .ok_or(WalletError::NoWallet)?;
        if !address_matches(claimed, &address) {
            return Err(WalletError::PeerMismatch(format!(
                "address {claimed} is not the wallet account"
            )));
        }
        Ok(address)
    }

    async fn respond(&self, peer_id: &str, id: &RequestId, response: PeerResponse) {
        if let Err(e) = self.transport.send_response(peer_id, id, response).await {
            tracing::warn!(peer_id = %peer_id, request_id = %id, error = %e, "Failed to answer peer");
        }
    }
}

// ========== Typed Decoding ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionParams {
    from: String,
    to: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    gas: Option<String>,
}

impl TransactionParams {
    fn into_intent(self) -> Result<TransactionIntent> {
        let from = parse_address(&self.from, "from")?;
        let to = parse_address(&self.to, "to")?;
        let value = match self.value.as_deref() {
            Some(value) => value
                .parse::<U256>()
                .map_err(|e| WalletError::MalformedRequest(format!("invalid value: {e}")))?,
            None => U256::ZERO,
        };
        let data = match self.data.or(self.input).as_deref() {
            Some(data) => data
                .parse::<Bytes>()
                .map_err(|e| WalletError::MalformedRequest(format!("invalid data: {e}")))?,
            None => Bytes::new(),
        };
        let gas = self.gas.as_deref().map(parse_quantity).transpose()?;

        Ok(TransactionIntent {
            from,
            to,
            value,
            data,
            gas,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequestParams {
    peer_meta: PeerMetadata,
    #[serde(default)]
    chain_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionUpdateParams {
    approved: bool,
    #[serde(default)]
    chain_id: Option<u64>,
}

fn positional<'a>(params: &'a Value, method: &str, expected: usize) -> Result<&'a [Value]> {
    let items = params.as_array().ok_or_else(|| {
        WalletError::MalformedRequest(format!("{method} expects positional params"))
    })?;
    if items.len() < expected {
        return Err(WalletError::MalformedRequest(format!(
            "{method} expects {expected} params, got {}",
            items.len()
        )));
    }
    Ok(items)
}

fn string_param<'a>(items: &'a [Value], index: usize, name: &str) -> Result<&'a str> {
    items
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| WalletError::MalformedRequest(format!("params[{index}] ({name}) must be a string")))
}

fn decode_object<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| WalletError::MalformedRequest(format!("invalid {what}: {e}")))
}

/// `0x` hex is signed as raw bytes, anything else as UTF-8 text.
fn decode_message(raw: &str) -> Vec<u8> {
    raw.strip_prefix("0x")
        .and_then(|hex| alloy::hex::decode(hex).ok())
        .unwrap_or_else(|| raw.as_bytes().to_vec())
}

/// Typed data arrives either as a JSON string or as an inline object.
fn decode_typed_data(value: &Value) -> Result<TypedData> {
    let parsed = match value {
        Value::String(json) => serde_json::from_str(json),
        other => serde_json::from_value(other.clone()),
    };
    parsed.map_err(|e| WalletError::MalformedRequest(format!("invalid typed data: {e}")))
}

fn parse_address(raw: &str, field: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| WalletError::MalformedRequest(format!("invalid {field} address")))
}

fn parse_quantity(raw: &str) -> Result<u64> {
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| WalletError::MalformedRequest(format!("invalid quantity {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainClient, SignedTransaction, UnsignedTransaction};
    use crate::crypto::{KdfParams, LocalBackend, Passphrase};
    use crate::error::{CODE_INVALID_PARAMS, CODE_INVALID_REQUEST, CODE_UNAUTHORIZED};
    use crate::rpc::{ChannelTransport, OutboundResponse};
    use crate::state::{self, WalletState};
    use crate::storage::MemoryBlobStore;
    use alloy::primitives::B256;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const ACCOUNT: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

    struct NoChain;

    #[async_trait]
    impl ChainClient for NoChain {
        async fn prepare(
            &self,
            _intent: &TransactionIntent,
            _chain: ChainNetwork,
        ) -> Result<UnsignedTransaction> {
            Err(WalletError::Chain("offline".into()))
        }

        async fn broadcast(&self, _signed: &SignedTransaction) -> Result<B256> {
            Err(WalletError::Chain("offline".into()))
        }

        async fn gas_price(&self, _chain: ChainNetwork) -> Result<u128> {
            Err(WalletError::Chain("offline".into()))
        }
    }

    struct Fixture {
        router: PeerRequestRouter,
        authorizer: Arc<TransactionAuthorizer>,
        state: SharedState,
        outbox: UnboundedReceiver<OutboundResponse>,
    }

    async fn fixture() -> Fixture {
        let keystore = Keystore::new(Arc::new(LocalBackend::new()), Arc::new(MemoryBlobStore::new()))
            .with_kdf(KdfParams::new(256, 1, 1));
        let key = keystore.import_wallet(PHRASE).await.unwrap();
        keystore.persist(&key, &Passphrase::from("pw")).await.unwrap();
        let keystore = Arc::new(keystore);

        let state = state::shared(WalletState::default());
        let (transport, outbox) = ChannelTransport::new();
        let transport: Arc<dyn PeerTransport> = Arc::new(transport);
        let authorizer = Arc::new(TransactionAuthorizer::new(
            state.clone(),
            keystore.clone(),
            Arc::new(NoChain),
            transport.clone(),
            PeerMetadata::new("Test Wallet", "https://wallet.test"),
        ));
        let router = PeerRequestRouter::new(state.clone(), authorizer.clone(), keystore, transport);

        state.lock().await.sessions.on_connected(
            "peer-a",
            PeerMetadata::new("Example", "https://app.example.com"),
            ChainNetwork::Ethereum,
        );

        Fixture {
            router,
            authorizer,
            state,
            outbox,
        }
    }

    fn request(method: &str, params: Value) -> InboundRequest {
        InboundRequest::new("peer-a", 1, method, params)
    }

    #[tokio::test]
    async fn personal_sign_matches_address_case_insensitively() {
        let fx = fixture().await;
        let routed = fx
            .router
            .handle(request("personal_sign", json!(["hello", ACCOUNT.to_lowercase()])))
            .await;

        let Routed::Pending(id) = routed else {
            panic!("expected pending request, got {routed:?}");
        };
        let active = fx.authorizer.active_request().await.unwrap();
        assert_eq!(active.id, id);
        assert_eq!(active.summary, "hello");
    }

    #[tokio::test]
    async fn personal_sign_for_other_address_is_rejected_immediately() {
        let mut fx = fixture().await;
        let routed = fx
            .router
            .handle(request(
                "personal_sign",
                json!(["hello", "0x0000000000000000000000000000000000000001"]),
            ))
            .await;

        assert!(matches!(
            routed,
            Routed::Responded(PeerResponse::Rejected { code: CODE_UNAUTHORIZED, .. })
        ));
        assert_eq!(fx.authorizer.pending_count().await, 0);
        assert!(fx.outbox.recv().await.unwrap().response.is_decline());
    }

    #[tokio::test]
    async fn eth_sign_takes_address_first_and_decodes_hex() {
        let fx = fixture().await;
        let routed = fx
            .router
            .handle(request("eth_sign", json!([ACCOUNT, "0x68656c6c6f"])))
            .await;

        assert!(matches!(routed, Routed::Pending(_)));
        assert_eq!(fx.authorizer.active_request().await.unwrap().summary, "hello");
    }

    #[tokio::test]
    async fn unknown_method_gets_invalid_request() {
        let mut fx = fixture().await;
        let routed = fx.router.handle(request("eth_mine", json!([]))).await;

        assert!(matches!(
            routed,
            Routed::Responded(PeerResponse::Invalid { code: CODE_INVALID_REQUEST, .. })
        ));
        let sent = fx.outbox.recv().await.unwrap();
        assert_eq!(sent.id, RequestId::Number(1));
        assert!(sent.response.is_decline());
    }

    #[tokio::test]
    async fn malformed_params_are_answered_not_dropped() {
        let mut fx = fixture().await;
        for params in [json!(["only-one"]), json!({"message": "hi"}), json!([1, 2]), Value::Null] {
            let routed = fx.router.handle(request("personal_sign", params)).await;
            assert!(matches!(
                routed,
                Routed::Responded(PeerResponse::Invalid { code: CODE_INVALID_PARAMS, .. })
            ));
            assert!(fx.outbox.recv().await.unwrap().response.is_decline());
        }
        assert_eq!(fx.authorizer.pending_count().await, 0);
    }

    #[tokio::test]
    async fn unparseable_payload_is_answered_with_recovered_id() {
        let mut fx = fixture().await;
        let routed = fx
            .router
            .handle_raw("peer-a", r#"{"id": 42, "params": []}"#)
            .await;

        assert!(matches!(routed, Routed::Responded(PeerResponse::Invalid { .. })));
        assert_eq!(fx.outbox.recv().await.unwrap().id, RequestId::Number(42));
    }

    #[tokio::test]
    async fn requests_from_unknown_peer_are_rejected() {
        let fx = fixture().await;
        let routed = fx
            .router
            .handle(InboundRequest::new("stranger", 1, "personal_sign", json!(["hi", ACCOUNT])))
            .await;

        assert!(matches!(
            routed,
            Routed::Responded(PeerResponse::Rejected { code: CODE_UNAUTHORIZED, .. })
        ));
        assert_eq!(fx.authorizer.pending_count().await, 0);
    }

    #[tokio::test]
    async fn origin_must_resolve_to_requesting_session() {
        let fx = fixture().await;

        let routed = fx
            .router
            .handle(request("personal_sign", json!(["hi", ACCOUNT])).with_origin("https://evil.io"))
            .await;
        assert!(matches!(routed, Routed::Responded(PeerResponse::Rejected { .. })));

        let routed = fx
            .router
            .handle(
                request("personal_sign", json!(["hi", ACCOUNT]))
                    .with_origin("https://www.example.com/swap"),
            )
            .await;
        assert!(matches!(routed, Routed::Pending(_)));
    }

    #[tokio::test]
    async fn older_session_on_shared_domain_keeps_its_origin() {
        let fx = fixture().await;
        fx.state.lock().await.sessions.on_connected(
            "peer-b",
            PeerMetadata::new("Example (second tab)", "https://app.example.com"),
            ChainNetwork::Ethereum,
        );

        let routed = fx
            .router
            .handle(
                request("personal_sign", json!(["hi", ACCOUNT]))
                    .with_origin("https://app.example.com"),
            )
            .await;
        assert!(matches!(routed, Routed::Pending(_)));
    }

    #[tokio::test]
    async fn typed_data_accepts_string_or_object() {
        let fx = fixture().await;
        let typed = json!({
            "types": {
                "EIP712Domain": [{ "name": "name", "type": "string" }],
                "Mail": [{ "name": "contents", "type": "string" }]
            },
            "primaryType": "Mail",
            "domain": { "name": "Example" },
            "message": { "contents": "hi" }
        });

        let routed = fx
            .router
            .handle(request("eth_signTypedData_v4", json!([ACCOUNT, typed.to_string()])))
            .await;
        assert!(matches!(routed, Routed::Pending(_)));

        let routed = fx
            .router
            .handle(request("eth_signTypedData", json!([ACCOUNT, typed])))
            .await;
        assert!(matches!(routed, Routed::Pending(_)));

        assert_eq!(
            fx.authorizer.active_request().await.unwrap().summary,
            "Sign typed data: Mail"
        );
    }

    #[tokio::test]
    async fn send_transaction_decodes_quantities() {
        let fx = fixture().await;
        let routed = fx
            .router
            .handle(request(
                "eth_sendTransaction",
                json!([{
                    "from": ACCOUNT.to_lowercase(),
                    "to": "0x2222222222222222222222222222222222222222",
                    "value": "0xde0b6b3a7640000",
                    "gas": "0x5208"
                }]),
            ))
            .await;
        assert!(matches!(routed, Routed::Pending(_)));

        let active = fx.authorizer.active_request().await.unwrap();
        assert!(active.summary.starts_with("Send 1 ETH to 0x2222"));
    }

    #[tokio::test]
    async fn send_transaction_from_other_account_is_rejected() {
        let fx = fixture().await;
        let routed = fx
            .router
            .handle(request(
                "eth_sendTransaction",
                json!([{
                    "from": "0x1111111111111111111111111111111111111111",
                    "to": "0x2222222222222222222222222222222222222222"
                }]),
            ))
            .await;
        assert!(matches!(
            routed,
            Routed::Responded(PeerResponse::Rejected { code: CODE_UNAUTHORIZED, .. })
        ));
    }

    #[tokio::test]
    async fn session_request_becomes_pending_proposal() {
        let fx = fixture().await;
        let routed = fx
            .router
            .handle(InboundRequest::new(
                "peer-b",
                9,
                "wc_sessionRequest",
                json!([{ "peerMeta": { "name": "Dex", "url": "https://dex.org" }, "chainId": 137 }]),
            ))
            .await;
        assert!(matches!(routed, Routed::Pending(_)));

        let active = fx.authorizer.active_request().await.unwrap();
        assert_eq!(active.chain, ChainNetwork::Polygon);
        assert_eq!(active.peer.name, "Dex");
    }

    #[tokio::test]
    async fn session_update_switches_chain_or_disconnects() {
        let fx = fixture().await;

        let routed = fx
            .router
            .handle(request("wc_sessionUpdate", json!([{ "approved": true, "chainId": 11155111 }])))
            .await;
        assert!(matches!(
            routed,
            Routed::Responded(PeerResponse::SessionApproved { chain_id: 11_155_111, .. })
        ));
        assert_eq!(
            fx.state.lock().await.sessions.lookup("peer-a").unwrap().chain,
            ChainNetwork::Sepolia
        );

        let routed = fx
            .router
            .handle(request("wc_sessionUpdate", json!([{ "approved": false }])))
            .await;
        assert_eq!(routed, Routed::Responded(PeerResponse::SessionRejected));
        assert!(fx.state.lock().await.sessions.lookup("peer-a").is_none());
    }
}
