// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end wallet scenarios.
//!
//! Runs the full stack (keystore, router, authorizer, session registry) with
//! the real local crypto backend, an in-memory blob store, a channel
//! transport and a stub chain client.

use std::sync::Arc;

use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, TxKind, B256};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use wallet_custody::chain::{SignedTransaction, UnsignedTransaction};
use wallet_custody::crypto::KdfParams;
use wallet_custody::rpc::OutboundResponse;
use wallet_custody::storage::{BlobStore, MemoryBlobStore};
use wallet_custody::{
    Approved, ChainClient, ChainNetwork, ChannelTransport, Collaborators, InboundRequest,
    LocalBackend, Passphrase, PeerMetadata, PeerResponse, RequestId, Routed, TransactionIntent,
    WalletConfig, WalletError, WalletService,
};

// ============================================================================
// Test Helpers
// ============================================================================

const PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Chain client that accepts everything without a node.
struct StubChain;

#[async_trait]
impl ChainClient for StubChain {
    async fn prepare(
        &self,
        intent: &TransactionIntent,
        chain: ChainNetwork,
    ) -> wallet_custody::Result<UnsignedTransaction> {
        Ok(UnsignedTransaction {
            chain,
            tx: TxEip1559 {
                chain_id: chain.chain_id(),
                nonce: 0,
                gas_limit: intent.gas.unwrap_or(21_000),
                max_fee_per_gas: 30_000_000_000,
                max_priority_fee_per_gas: 1_000_000_000,
                to: TxKind::Call(intent.to),
                value: intent.value,
                input: intent.data.clone(),
                ..Default::default()
            },
        })
    }

    async fn broadcast(&self, signed: &SignedTransaction) -> wallet_custody::Result<B256> {
        Ok(signed.hash)
    }

    async fn gas_price(&self, _chain: ChainNetwork) -> wallet_custody::Result<u128> {
        Ok(1_000_000_000)
    }
}

struct Harness {
    service: Arc<WalletService>,
    blobs: MemoryBlobStore,
    outbox: UnboundedReceiver<OutboundResponse>,
}

fn harness() -> Harness {
    let blobs = MemoryBlobStore::new();
    let (transport, outbox) = ChannelTransport::new();
    let config = WalletConfig {
        kdf: KdfParams::new(256, 1, 1),
        ..WalletConfig::default()
    };
    let service = WalletService::new(
        config,
        Collaborators {
            backend: Arc::new(LocalBackend::new()),
            blobs: Arc::new(blobs.clone()),
            chain: Arc::new(StubChain),
            transport: Arc::new(transport),
            sessions: None,
            audit: None,
        },
    );
    Harness {
        service: Arc::new(service),
        blobs,
        outbox,
    }
}

/// Harness with the well-known test wallet persisted under "pw".
async fn harness_with_wallet() -> (Harness, Address) {
    let h = harness();
    let key = h.service.import_wallet(PHRASE).await.unwrap();
    h.service.persist(&key, &Passphrase::from("pw")).await.unwrap();
    let address = key.address();
    (h, address)
}

async fn connect(service: &WalletService, peer_id: &str, url: &str) {
    service
        .on_connected(peer_id, PeerMetadata::new(peer_id, url), None)
        .await
        .unwrap();
}

fn personal_sign(peer_id: &str, id: i64, message: &str, address: &str) -> InboundRequest {
    InboundRequest::new(peer_id, id, "personal_sign", json!([message, address]))
}

// ============================================================================
// Scenario: create, persist, unlock, sign, verify
// ============================================================================

#[tokio::test]
async fn create_persist_unlock_sign_verifies() {
    let h = harness();

    let (mnemonic, key) = h.service.create_wallet().await.unwrap();
    assert_eq!(mnemonic.word_count(), 12);
    let created = key.address();

    let blob = h.service.persist(&key, &Passphrase::from("pw1")).await.unwrap();
    drop(key);
    assert!(blob.address.eq_ignore_ascii_case(&created.to_string()));
    assert_eq!(h.service.current_address().await.unwrap(), Some(created));

    let unlocked = h.service.unlock(&Passphrase::from("pw1")).await.unwrap();
    assert_eq!(unlocked.address(), created);

    let signature = h
        .service
        .sign_message(&Passphrase::from("pw1"), b"hello")
        .await
        .unwrap();
    assert!(h.service.verify_message(b"hello", &signature, created).unwrap());
    assert!(!h.service.verify_message(b"hell0", &signature, created).unwrap());
}

#[tokio::test]
async fn round_trip_holds_for_every_entropy_size() {
    for bits in [128, 160, 192, 224, 256] {
        let h = harness();
        let keystore = h.service.keystore();
        let (_mnemonic, key) = keystore.create_wallet(bits).await.unwrap();
        keystore.persist(&key, &Passphrase::from("pw")).await.unwrap();

        let unlocked = keystore.unlock(&Passphrase::from("pw")).await.unwrap();
        assert_eq!(unlocked.address(), key.address(), "entropy {bits}");
    }
}

#[tokio::test]
async fn wrong_passphrase_never_yields_a_key() {
    let (h, _address) = harness_with_wallet().await;

    for attempt in ["", "PW", "pw ", "pw1"] {
        let result = h.service.unlock(&Passphrase::from(attempt)).await;
        assert!(matches!(result, Err(WalletError::WrongPassphrase)), "{attempt:?}");
    }
}

#[tokio::test]
async fn invalid_mnemonic_leaves_persisted_wallet_untouched() {
    let (h, address) = harness_with_wallet().await;
    let before = h.blobs.read_blob("default").await.unwrap();

    for phrase in [
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon",
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon zzzz",
        "",
    ] {
        let result = h.service.import_wallet(phrase).await;
        assert!(matches!(result, Err(WalletError::InvalidMnemonic(_))));
    }

    let after = h.blobs.read_blob("default").await.unwrap();
    assert_eq!(
        before.map(|b| b.ciphertext),
        after.map(|b| b.ciphertext)
    );
    assert_eq!(h.service.current_address().await.unwrap(), Some(address));
}

// ============================================================================
// Scenario: dApp personal_sign with a lower-case address
// ============================================================================

#[tokio::test]
async fn lowercase_personal_sign_is_approved_with_signature() {
    let (mut h, address) = harness_with_wallet().await;
    connect(&h.service, "peer-example", "https://example.com").await;

    let lowercase = address.to_string().to_lowercase();
    let routed = h
        .service
        .handle(personal_sign("peer-example", 11, "msg", &lowercase))
        .await;
    let Routed::Pending(request_id) = routed else {
        panic!("expected pending request, got {routed:?}");
    };

    let shown = h.service.subscribe().borrow().clone().unwrap();
    assert_eq!(shown.id, request_id);
    assert_eq!(shown.summary, "msg");
    assert_eq!(shown.peer.url, "https://example.com");

    let approved = h
        .service
        .approve(request_id, Some(&Passphrase::from("pw")))
        .await
        .unwrap();
    let Approved::Signature(signature) = approved else {
        panic!("expected signature");
    };
    assert_eq!(signature.recover_address_from_msg(b"msg").unwrap(), address);

    let sent = h.outbox.recv().await.unwrap();
    assert_eq!(sent.peer_id, "peer-example");
    assert_eq!(sent.id, RequestId::Number(11));
    let PeerResponse::Signature(hex) = &sent.response else {
        panic!("expected signature response, got {:?}", sent.response);
    };
    assert_eq!(hex.len(), 2 + 65 * 2);
    assert_eq!(sent.response.to_json_rpc(&sent.id)["result"], json!(hex));
}

#[tokio::test]
async fn personal_sign_for_other_address_never_reaches_the_human() {
    let (mut h, _address) = harness_with_wallet().await;
    connect(&h.service, "peer-example", "https://example.com").await;

    let routed = h
        .service
        .handle(personal_sign(
            "peer-example",
            1,
            "msg",
            "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd",
        ))
        .await;

    assert!(matches!(routed, Routed::Responded(PeerResponse::Rejected { .. })));
    assert_eq!(h.service.pending_count().await, 0);
    assert!(h.service.subscribe().borrow().is_none());
    assert!(h.outbox.recv().await.unwrap().response.is_decline());
}

// ============================================================================
// Scenario: two peers, one active request
// ============================================================================

#[tokio::test]
async fn second_peer_waits_until_first_is_rejected() {
    let (mut h, address) = harness_with_wallet().await;
    let account = address.to_string();
    connect(&h.service, "peer-a", "https://a.example.com").await;
    connect(&h.service, "peer-b", "https://b.example.org").await;

    let Routed::Pending(first) = h.service.handle(personal_sign("peer-a", 1, "one", &account)).await
    else {
        panic!("first request not pending");
    };
    let Routed::Pending(second) = h.service.handle(personal_sign("peer-b", 2, "two", &account)).await
    else {
        panic!("second request not pending");
    };

    assert_eq!(h.service.active_request().await.map(|r| r.id), Some(first));
    assert_eq!(h.service.pending_count().await, 2);
    assert!(matches!(
        h.service.approve(second, Some(&Passphrase::from("pw"))).await,
        Err(WalletError::NotActive(_))
    ));

    h.service.reject(first).await.unwrap();
    assert_eq!(h.service.active_request().await.map(|r| r.id), Some(second));
    assert_eq!(
        h.service.subscribe().borrow().as_ref().map(|r| r.id),
        Some(second)
    );

    let sent = h.outbox.recv().await.unwrap();
    assert_eq!(sent.peer_id, "peer-a");
    assert_eq!(sent.response, PeerResponse::user_rejected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_a_single_active() {
    let (h, address) = harness_with_wallet().await;
    let account = address.to_string();
    for i in 0..5 {
        connect(&h.service, &format!("peer-{i}"), &format!("https://d{i}.example.com")).await;
    }

    let mut active_rx = h.service.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while active_rx.changed().await.is_ok() {
            if let Some(request) = active_rx.borrow_and_update().clone() {
                seen.push(request.id);
            }
        }
        seen
    });

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let service = h.service.clone();
            let account = account.clone();
            tokio::spawn(async move {
                service
                    .handle(personal_sign(&format!("peer-{i}"), i, "hi", &account))
                    .await
            })
        })
        .collect();

    let mut pending = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Routed::Pending(id) => pending.push(id),
            other => panic!("request dropped: {other:?}"),
        }
    }
    assert_eq!(pending.len(), 5);
    assert_eq!(h.service.pending_count().await, 5);

    // Resolve in order; exactly one request is active at each step.
    for _ in 0..5 {
        let active = h.service.active_request().await.unwrap();
        assert!(pending.contains(&active.id));
        h.service.reject(active.id).await.unwrap();
    }
    assert!(h.service.active_request().await.is_none());

    drop(h);
    let seen = observer.await.unwrap();
    assert!(seen.iter().all(|id| pending.contains(id)));
}

// ============================================================================
// Scenario: disconnect while a request is active
// ============================================================================

#[tokio::test]
async fn disconnect_rejects_active_request_exactly_once() {
    let (mut h, address) = harness_with_wallet().await;
    let account = address.to_string();
    connect(&h.service, "peer-a", "https://a.example.com").await;
    connect(&h.service, "peer-b", "https://b.example.org").await;

    let Routed::Pending(active) = h.service.handle(personal_sign("peer-a", 1, "one", &account)).await
    else {
        panic!("request not pending");
    };
    let Routed::Pending(next) = h.service.handle(personal_sign("peer-b", 2, "two", &account)).await
    else {
        panic!("request not pending");
    };

    h.service.on_disconnected("peer-a").await.unwrap();

    let sent = h.outbox.recv().await.unwrap();
    assert_eq!(sent.peer_id, "peer-a");
    assert_eq!(sent.id, RequestId::Number(1));
    assert!(sent.response.is_decline());

    assert!(matches!(
        h.service.approve(active, Some(&Passphrase::from("pw"))).await,
        Err(WalletError::RequestNotFound(_))
    ));
    assert!(matches!(
        h.service.reject(active).await,
        Err(WalletError::RequestNotFound(_))
    ));
    assert!(h.service.on_disconnected("peer-a").await.is_none());
    assert_eq!(h.service.active_request().await.map(|r| r.id), Some(next));

    // Nothing else was sent to the disconnected peer.
    assert!(h.outbox.try_recv().is_err());
}

// ============================================================================
// Scenario: session proposal and transaction
// ============================================================================

#[tokio::test]
async fn session_proposal_then_transaction() {
    let (mut h, address) = harness_with_wallet().await;

    let routed = h
        .service
        .handle(InboundRequest::new(
            "peer-dex",
            1,
            "wc_sessionRequest",
            json!([{ "peerMeta": { "name": "Dex", "url": "https://app.dex.org" }, "chainId": 11155111 }]),
        ))
        .await;
    let Routed::Pending(proposal) = routed else {
        panic!("proposal not pending");
    };
    h.service.approve(proposal, None).await.unwrap();

    let sent = h.outbox.recv().await.unwrap();
    let body = sent.response.to_json_rpc(&sent.id);
    assert_eq!(body["result"]["approved"], json!(true));
    assert_eq!(body["result"]["chainId"], json!(11_155_111));
    assert_eq!(body["result"]["accounts"][0], json!(address.to_checksum(None)));

    let routed = h
        .service
        .handle(
            InboundRequest::new(
                "peer-dex",
                2,
                "eth_sendTransaction",
                json!([{
                    "from": address.to_string().to_lowercase(),
                    "to": "0x2222222222222222222222222222222222222222",
                    "value": "0x38d7ea4c68000"
                }]),
            )
            .with_origin("https://app.dex.org/swap"),
        )
        .await;
    let Routed::Pending(tx_request) = routed else {
        panic!("transaction not pending: {routed:?}");
    };
    let shown = h.service.active_request().await.unwrap();
    assert!(shown.summary.contains("0.001 ETH"));
    assert!(shown.summary.contains("Sepolia"));

    let Approved::TransactionHash(hash) = h
        .service
        .approve(tx_request, Some(&Passphrase::from("pw")))
        .await
        .unwrap()
    else {
        panic!("expected transaction hash");
    };
    let sent = h.outbox.recv().await.unwrap();
    assert_eq!(sent.response, PeerResponse::TransactionHash(hash.to_string()));
}
