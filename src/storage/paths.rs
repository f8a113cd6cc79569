// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the wallet data directory layout.

use std::path::{Path, PathBuf};

use base64ct::{Base64UrlUnpadded, Encoding};

/// Default base directory for persistent wallet data.
pub const DATA_ROOT: &str = "./wallet-data";

/// Storage path utilities for the wallet data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all wallet data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Keystore Paths ==========

    /// Directory containing encrypted keystore blobs.
    pub fn keystore_dir(&self) -> PathBuf {
        self.root.join("keystore")
    }

    /// Path to the encrypted keystore blob of a wallet slot.
    pub fn keystore_blob(&self, slot: &str) -> PathBuf {
        self.keystore_dir()
            .join(format!("{}.json", file_safe_name(slot)))
    }

    // ========== Session Paths ==========

    /// Directory containing persisted dApp sessions.
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Path to a persisted dApp session.
    ///
    /// Peer ids come from remote peers, so they are reduced to a safe file name.
    pub fn session(&self, peer_id: &str) -> PathBuf {
        self.sessions_dir()
            .join(format!("{}.json", file_safe_name(peer_id)))
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}

/// Map an identifier to a file name that cannot escape its directory.
///
/// URL-safe base64 without padding: distinct ids never share a file, and the
/// alphabet has no separators or dots. The empty id maps to `_`, which no
/// other id encodes to.
pub fn file_safe_name(id: &str) -> String {
    if id.is_empty() {
        return "_".to_string();
    }
    Base64UrlUnpadded::encode_string(id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new("./wallet-data"));
    }

    #[test]
    fn keystore_paths_are_correct() {
        let paths = StoragePaths::new("/tmp/test-data");
        assert_eq!(paths.keystore_dir(), PathBuf::from("/tmp/test-data/keystore"));
        assert_eq!(
            paths.keystore_blob("default"),
            PathBuf::from("/tmp/test-data/keystore/ZGVmYXVsdA.json")
        );
    }

    #[test]
    fn session_paths_cannot_traverse() {
        let paths = StoragePaths::new("/tmp/test-data");
        assert_eq!(
            paths.session("../../etc/passwd"),
            PathBuf::from("/tmp/test-data/sessions/Li4vLi4vZXRjL3Bhc3N3ZA.json")
        );
    }

    #[test]
    fn similar_peer_ids_get_distinct_files() {
        let paths = StoragePaths::new("/tmp/test-data");
        assert_ne!(paths.session("a.b"), paths.session("a_b"));
        assert_eq!(file_safe_name("a.b"), "YS5i");
        assert_eq!(file_safe_name("a_b"), "YV9i");
    }

    #[test]
    fn audit_paths_are_correct() {
        let paths = StoragePaths::new("/tmp/test-data");
        assert_eq!(
            paths.audit_events_file("2026-01-28"),
            PathBuf::from("/tmp/test-data/audit/2026-01-28/events.jsonl")
        );
    }

    #[test]
    fn empty_id_gets_placeholder() {
        assert_eq!(file_safe_name(""), "_");
    }
}
