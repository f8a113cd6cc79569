// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Wallet lifecycle, signing decisions and session changes are appended to a
//! daily JSONL file. Events never carry secrets: no key bytes, mnemonic words
//! or passphrases, and messages are referenced by request id only.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{FileStorage, StorageError, StorageResult};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Wallet events
    WalletCreated,
    WalletImported,
    KeystorePersisted,
    UnlockFailed,

    // Request decisions
    MessageSigned,
    TypedDataSigned,
    TransactionBroadcast,
    RequestRejected,
    RequestAutoRejected,

    // Session events
    SessionConnected,
    SessionDisconnected,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Connected peer involved, if any.
    pub peer_id: Option<String>,
    /// Authorization request involved, if any.
    pub request_id: Option<String>,
    /// Wallet address involved, if known.
    pub address: Option<String>,
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            peer_id: None,
            request_id: None,
            address: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_peer(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = Some(peer_id.into());
        self
    }

    pub fn with_request(mut self, request_id: impl ToString) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Append-only audit log over the data directory.
#[derive(Debug, Clone)]
pub struct AuditLog {
    storage: FileStorage,
}

impl AuditLog {
    pub fn new(storage: FileStorage) -> Self {
        Self { storage }
    }

    /// Append an event to the daily log file.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.storage.append(&path, &line)
    }

    /// Log an event, recording failures to the tracing output only.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event) {
            tracing::warn!(
                event_type = ?event.event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Read audit events for a specific date (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let path = self.storage.paths().audit_events_file(date);
        let content = match self.storage.read_bytes(&path) {
            Ok(content) => content,
            Err(StorageError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut events = Vec::new();
        for line in content.split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            events.push(serde_json::from_slice(line)?);
        }
        Ok(events)
    }

    /// Read events for an inclusive date range.
    pub fn read_events_range(&self, start: NaiveDate, end: NaiveDate) -> StorageResult<Vec<AuditEvent>> {
        let mut all_events = Vec::new();
        let mut current = start;

        while current <= end {
            all_events.extend(self.read_events(&current.format("%Y-%m-%d").to_string())?);
            current = match current.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        Ok(all_events)
    }

    /// Events of one peer on a given date.
    pub fn search_by_peer(&self, peer_id: &str, date: &str) -> StorageResult<Vec<AuditEvent>> {
        Ok(self
            .read_events(date)?
            .into_iter()
            .filter(|e| e.peer_id.as_deref() == Some(peer_id))
            .collect())
    }
}
