// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Filesystem access for the wallet data directory.
//!
//! Callers hand this module either non-secret records (sessions, audit) or
//! ciphertext already sealed by the keystore (blobs).

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use super::StoragePaths;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(e.to_string()),
            _ => StorageError::Io(e),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Handle on an opened data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    paths: StoragePaths,
}

impl FileStorage {
    /// Open the data directory, creating its subdirectories if missing.
    pub fn open(paths: StoragePaths) -> StorageResult<Self> {
        for dir in [paths.keystore_dir(), paths.sessions_dir(), paths.audit_dir()] {
            fs::create_dir_all(dir)?;
        }
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StorageResult<T> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Replace `path` with `value`. Readers see the old or the new record,
    /// never a partial one.
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> StorageResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let staged = path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&staged)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        let file = writer.into_inner().map_err(|e| StorageError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&staged, path)?;
        Ok(())
    }

    /// Idempotent: a missing file counts as removed.
    pub fn remove(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(StorageError::Io(e)),
            _ => Ok(()),
        }
    }

    /// Sorted file stems under `dir` carrying `extension`.
    pub fn list_stems(&self, dir: impl AsRef<Path>, extension: &str) -> StorageResult<Vec<String>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut stems = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != extension) {
                continue;
            }
            stems.extend(path.file_stem().and_then(|s| s.to_str()).map(str::to_owned));
        }
        stems.sort();
        Ok(stems)
    }

    pub fn append(&self, path: impl AsRef<Path>, data: &[u8]) -> StorageResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(())
    }

    pub fn read_bytes(&self, path: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        Ok(fs::read(path)?)
    }
}
