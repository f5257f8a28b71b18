// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Blob storage collaborator.
//!
//! Uploaded images are handed to a [`BlobStore`] strategy, which returns a
//! stable reference string the ledger carries opaquely. The provider is
//! swappable; the core never interprets the reference's contents.

use chrono::Utc;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

/// Blob storage failure. Not part of the marketplace error taxonomy; the
/// HTTP surface maps it to an internal error.
#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("failed to store blob: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage strategy for uploaded images.
pub trait BlobStore: Send + Sync {
    /// Persists the bytes and returns a stable, opaque image reference.
    fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, BlobStoreError>;
}

/// Prefixes a caller-chosen discriminant to the sanitized original name.
/// Uniqueness is the caller's job; both stores feed a monotonic counter in.
fn blob_key(discriminant: u64, filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{discriminant}-{safe}")
}

/// Stores blobs as files under a root directory. Keys carry the upload
/// time plus a per-process sequence number, so two uploads of the same
/// filename in the same millisecond still land in distinct files.
pub struct LocalDiskStore {
    root: PathBuf,
    counter: AtomicU64,
}

impl LocalDiskStore {
    /// Creates the store, making the root directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BlobStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
        })
    }
}

impl BlobStore for LocalDiskStore {
    fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, BlobStoreError> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let millis = Utc::now().timestamp_millis() as u64;
        let key = format!("{millis}-{}", blob_key(seq, filename));
        std::fs::write(self.root.join(&key), bytes)?;
        debug!(key = %key, size = bytes.len(), "blob stored on disk");
        Ok(key)
    }
}

/// In-memory store, used by tests and as a throwaway default.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
    counter: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, BlobStoreError> {
        let key = blob_key(self.counter.fetch_add(1, Ordering::Relaxed), filename);
        self.blobs.insert(key.clone(), bytes.to_vec());
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_sanitize_hostile_filenames() {
        let key = blob_key(7, "../../etc/passwd");
        assert_eq!(key, "7-.._.._etc_passwd");
        assert!(!key.contains('/'));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        let key = store.store("camera.jpg", b"jpeg bytes").unwrap();
        assert_eq!(store.get(&key).as_deref(), Some(&b"jpeg bytes"[..]));
    }

    #[test]
    fn disk_store_keys_are_unique_for_same_filename_and_instant() {
        let root = std::env::temp_dir().join(format!("bidmarket-blobs-{}", std::process::id()));
        let store = LocalDiskStore::new(root.clone()).unwrap();

        // Back-to-back writes land well inside one millisecond.
        let first = store.store("poster.png", b"1").unwrap();
        let second = store.store("poster.png", b"2").unwrap();
        assert_ne!(first, second);
        assert_eq!(std::fs::read(root.join(&first)).unwrap(), b"1");
        assert_eq!(std::fs::read(root.join(&second)).unwrap(), b"2");

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn memory_store_keys_are_unique_per_upload() {
        let store = MemoryBlobStore::new();
        let first = store.store("a.png", b"1").unwrap();
        let second = store.store("a.png", b"2").unwrap();
        assert_ne!(first, second);
        assert_eq!(store.len(), 2);
    }
}
