//! In-process content store with failure injection.
//!
//! Hashes are SHA-256 over the entry name and bytes, so identical uploads
//! map to the same hash, like the real store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use sha2::{Digest, Sha256};

use super::{ContentHash, ContentStore, StoreError};

#[derive(Default)]
struct Inner {
    blobs: HashMap<(ContentHash, String), Vec<u8>>,
    folders: HashMap<ContentHash, String>,
    puts: usize,
    /// Absolute put index that fails once with `StoreUnavailable`.
    fail_at: Option<usize>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    rejecting: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `StoreUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every upload fails with `StoreRejected` (quota/auth) while set.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Let the next `n` uploads succeed, then fail exactly one.
    pub fn fail_put_after(&self, n: usize) {
        let mut inner = self.lock();
        inner.fail_at = Some(inner.puts + n);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Replace the bytes behind a canonical entry, simulating corruption.
    pub fn overwrite(&self, hash: &ContentHash, bytes: Vec<u8>) {
        self.lock()
            .blobs
            .insert((hash.clone(), super::CANONICAL_ENTRY.to_string()), bytes);
    }

    /// Folder label of the last upload that produced `hash`.
    pub fn folder_of(&self, hash: &ContentHash) -> Option<String> {
        self.lock().folders.get(hash).cloned()
    }

    /// Number of upload attempts so far, failed or not.
    pub fn put_count(&self) -> usize {
        self.lock().puts
    }

    /// Number of distinct stored entries.
    pub fn len(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
    }

    fn hash_of(entry: &str, bytes: &[u8]) -> Result<ContentHash, StoreError> {
        let mut hasher = Sha256::new();
        hasher.update(entry.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        ContentHash::new(format!("sha256-{:x}", hasher.finalize()))
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }
}

impl ContentStore for InMemoryStore {
    async fn put_entry(
        &self,
        folder: &str,
        entry: &str,
        bytes: Vec<u8>,
    ) -> Result<ContentHash, StoreError> {
        self.simulate_latency().await;

        let mut inner = self.lock();
        let index = inner.puts;
        inner.puts += 1;

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::StoreUnavailable("store offline".into()));
        }
        if inner.fail_at == Some(index) {
            inner.fail_at = None;
            return Err(StoreError::StoreUnavailable("injected upload failure".into()));
        }
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(StoreError::StoreRejected {
                status: 401,
                body: "quota exceeded".into(),
            });
        }

        let hash = Self::hash_of(entry, &bytes)?;
        inner.blobs.insert((hash.clone(), entry.to_string()), bytes);
        inner.folders.insert(hash.clone(), folder.to_string());
        tracing::debug!(hash = %hash, "Stored blob");
        Ok(hash)
    }

    async fn get_entry(&self, hash: &ContentHash, entry: &str) -> Result<Vec<u8>, StoreError> {
        self.simulate_latency().await;

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::StoreUnavailable("store offline".into()));
        }
        self.lock()
            .blobs
            .get(&(hash.clone(), entry.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(hash.clone()))
    }
}
