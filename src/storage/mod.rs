// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state of the wallet core, rooted at the data directory.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   keystore/{b64url(slot)}.json     # Encrypted keystore blob (Argon2id + AES-256-GCM)
//!   sessions/{b64url(peer_id)}.json  # Connected peer sessions
//!   audit/{date}/events.jsonl        # Daily audit logs
//! ```
//!
//! ## Important Notes
//!
//! - Plaintext key material never reaches this module
//! - Writes are atomic (temp file + rename), so a crash leaves either the old
//!   or the new blob, never a torn one

pub mod audit;
pub mod blobs;
pub mod file_store;
pub mod paths;
pub mod sessions;

pub use audit::{AuditEvent, AuditEventType, AuditLog};
pub use blobs::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use file_store::{FileStorage, StorageError, StorageResult};
pub use paths::StoragePaths;
pub use sessions::{FileSessionStore, SessionStore};
