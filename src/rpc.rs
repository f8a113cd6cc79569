// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Peer-facing request and response types, and the transport seam.
//!
//! Inbound requests are JSON-RPC 2.0 objects arriving over a session channel
//! (WalletConnect style). Every inbound request is answered with exactly one
//! [`PeerResponse`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::{WalletError, CODE_INVALID_REQUEST, CODE_USER_REJECTED};
use crate::session::PeerMetadata;

/// JSON-RPC request id. `Null` is used when an envelope carries no usable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    #[default]
    Null,
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => f.write_str(s),
            RequestId::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

/// An untyped request received from a peer.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub peer_id: String,
    pub id: RequestId,
    pub method: String,
    pub params: Value,
    /// Origin the request claims to come from (e.g. the active browser tab).
    pub origin: Option<String>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: RequestId,
    method: String,
    #[serde(default)]
    params: Value,
}

impl InboundRequest {
    pub fn new(
        peer_id: impl Into<String>,
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            id: id.into(),
            method: method.into(),
            params,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Parse a raw JSON-RPC payload.
    ///
    /// On failure the id is recovered on a best-effort basis so the caller
    /// can still answer the peer.
    pub fn from_json(
        peer_id: impl Into<String>,
        raw: &str,
    ) -> Result<Self, (RequestId, WalletError)> {
        match serde_json::from_str::<Envelope>(raw) {
            Ok(envelope) => Ok(Self {
                peer_id: peer_id.into(),
                id: envelope.id,
                method: envelope.method,
                params: envelope.params,
                origin: None,
            }),
            Err(e) => {
                let id = serde_json::from_str::<Value>(raw)
                    .ok()
                    .and_then(|v| v.get("id").cloned())
                    .and_then(|id| serde_json::from_value(id).ok())
                    .unwrap_or_default();
                Err((id, WalletError::MalformedRequest(e.to_string())))
            }
        }
    }
}

/// Outcome delivered back to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerResponse {
    /// 0x-prefixed 65-byte signature.
    Signature(String),
    /// 0x-prefixed transaction hash.
    TransactionHash(String),
    SessionApproved {
        accounts: Vec<String>,
        chain_id: u64,
        wallet_meta: PeerMetadata,
    },
    SessionRejected,
    /// The request was understood and declined.
    Rejected { code: i64, message: String },
    /// The request could not be understood.
    Invalid { code: i64, message: String },
}

impl PeerResponse {
    pub fn user_rejected() -> Self {
        PeerResponse::Rejected {
            code: CODE_USER_REJECTED,
            message: "User rejected the request".into(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        PeerResponse::Invalid {
            code: CODE_INVALID_REQUEST,
            message: format!("Invalid request: unsupported method {method}"),
        }
    }

    /// Decline for a failed request, without local failure details.
    pub fn from_error(err: &WalletError) -> Self {
        match err {
            WalletError::MalformedRequest(_) => PeerResponse::Invalid {
                code: err.rpc_code(),
                message: err.peer_message(),
            },
            _ => PeerResponse::Rejected {
                code: err.rpc_code(),
                message: err.peer_message(),
            },
        }
    }

    /// Whether the peer is being told no.
    pub fn is_decline(&self) -> bool {
        matches!(
            self,
            PeerResponse::SessionRejected
                | PeerResponse::Rejected { .. }
                | PeerResponse::Invalid { .. }
        )
    }

    /// JSON-RPC 2.0 response object for this outcome.
    pub fn to_json_rpc(&self, id: &RequestId) -> Value {
        match self {
            PeerResponse::Signature(value) | PeerResponse::TransactionHash(value) => {
                json!({ "jsonrpc": "2.0", "id": id, "result": value })
            }
            PeerResponse::SessionApproved {
                accounts,
                chain_id,
                wallet_meta,
            } => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "approved": true,
                    "accounts": accounts,
                    "chainId": chain_id,
                    "peerMeta": wallet_meta,
                }
            }),
            PeerResponse::SessionRejected => {
                json!({ "jsonrpc": "2.0", "id": id, "result": { "approved": false } })
            }
            PeerResponse::Rejected { code, message } | PeerResponse::Invalid { code, message } => {
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": code, "message": message }
                })
            }
        }
    }
}

/// Failure to reach a peer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} is not reachable")]
    Unreachable(String),

    #[error("transport closed")]
    Closed,
}

/// Outbound side of the peer session channel.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send_response(
        &self,
        peer_id: &str,
        id: &RequestId,
        response: PeerResponse,
    ) -> Result<(), TransportError>;
}

/// A response addressed to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub peer_id: String,
    pub id: RequestId,
    pub response: PeerResponse,
}

/// Transport that queues responses on a tokio channel for a bridge task to
/// forward to the real session.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundResponse>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PeerTransport for ChannelTransport {
    async fn send_response(
        &self,
        peer_id: &str,
        id: &RequestId,
        response: PeerResponse,
    ) -> Result<(), TransportError> {
        self.tx
            .send(OutboundResponse {
                peer_id: peer_id.to_string(),
                id: id.clone(),
                response,
            })
            .map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CODE_INVALID_PARAMS;

    #[test]
    fn parse_envelope() {
        let req = InboundRequest::from_json(
            "peer-1",
            r#"{"jsonrpc":"2.0","id":7,"method":"personal_sign","params":["0x68656c6c6f","0xabc"]}"#,
        )
        .unwrap();
        assert_eq!(req.id, RequestId::Number(7));
        assert_eq!(req.method, "personal_sign");
        assert_eq!(req.params[1], "0xabc");

        let req = InboundRequest::from_json("peer-1", r#"{"id":"a1","method":"eth_chainId"}"#).unwrap();
        assert_eq!(req.id, RequestId::String("a1".into()));
        assert!(req.params.is_null());
    }

    #[test]
    fn malformed_envelope_keeps_id() {
        let (id, err) = InboundRequest::from_json("peer-1", r#"{"id":3,"params":[]}"#).unwrap_err();
        assert_eq!(id, RequestId::Number(3));
        assert!(matches!(err, WalletError::MalformedRequest(_)));

        let (id, _) = InboundRequest::from_json("peer-1", "not json").unwrap_err();
        assert_eq!(id, RequestId::Null);
    }

    #[test]
    fn json_rpc_shapes() {
        let id = RequestId::Number(1);
        let ok = PeerResponse::Signature("0xdead".into()).to_json_rpc(&id);
        assert_eq!(ok["result"], "0xdead");
        assert_eq!(ok["id"], 1);

        let rejected = PeerResponse::user_rejected().to_json_rpc(&id);
        assert_eq!(rejected["error"]["code"], CODE_USER_REJECTED);

        let session = PeerResponse::SessionRejected.to_json_rpc(&RequestId::Null);
        assert_eq!(session["result"]["approved"], false);
        assert!(session["id"].is_null());
    }

    #[test]
    fn malformed_error_becomes_invalid() {
        let response = PeerResponse::from_error(&WalletError::MalformedRequest("params".into()));
        assert!(matches!(
            response,
            PeerResponse::Invalid { code: CODE_INVALID_PARAMS, .. }
        ));
        assert!(response.is_decline());
        assert!(!PeerResponse::Signature("0x".into()).is_decline());
    }

    #[tokio::test]
    async fn channel_transport_delivers() {
        let (transport, mut rx) = ChannelTransport::new();
        transport
            .send_response("peer-1", &RequestId::Number(1), PeerResponse::SessionRejected)
            .await
            .unwrap();

        let out = rx.recv().await.unwrap();
        assert_eq!(out.peer_id, "peer-1");
        assert_eq!(out.response, PeerResponse::SessionRejected);

        drop(rx);
        assert!(matches!(
            transport
                .send_response("peer-1", &RequestId::Number(2), PeerResponse::SessionRejected)
                .await,
            Err(TransportError::Closed)
        ));
    }
}
