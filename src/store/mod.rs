//! Content-addressed store facade.
//!
//! Every blob lives under a single canonical entry name inside a folder keyed
//! by its hash (`{hash}/info.json`), so a hash resolves to exactly one document.
//! Uploads carry a folder label (`{patient}_json` for patient content); the
//! label names the pin and never changes the hash.

pub mod memory;
pub mod pinata;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DEFAULT_FOLDER;
use crate::models::PatientAddress;

pub use memory::InMemoryStore;
pub use pinata::PinataStore;

/// Entry name every document and blob is stored under.
pub const CANONICAL_ENTRY: &str = "info.json";

/// Folder label for everything uploaded on behalf of `patient`.
pub fn patient_folder(patient: &PatientAddress) -> String {
    format!("{patient}_json")
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Content store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Content store rejected the request (status {status}): {body}")]
    StoreRejected { status: u16, body: String },

    #[error("No content under hash {0}")]
    NotFound(ContentHash),

    #[error("Unexpected response from content store: {0}")]
    InvalidResponse(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Identifier the store returns for a blob. Opaque: no hash algorithm is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

#[derive(Debug, Error)]
#[error("Content hash must be non-empty and free of '/' and whitespace")]
pub struct InvalidContentHash;

impl ContentHash {
    pub fn new(hash: impl Into<String>) -> Result<Self, InvalidContentHash> {
        let hash = hash.into();
        if hash.is_empty() || hash.contains('/') || hash.chars().any(char::is_whitespace) {
            return Err(InvalidContentHash);
        }
        Ok(Self(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentHash {
    type Error = InvalidContentHash;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content-addressed blob store.
///
/// Contract: a hash returned by `put_entry` always resolves via `get_entry`
/// (same entry name) to the exact bytes uploaded. Identical bytes may map
/// to the same hash.
pub trait ContentStore: Send + Sync {
    /// Upload `bytes` as `entry` inside a fresh hash-keyed folder labelled `folder`.
    fn put_entry(
        &self,
        folder: &str,
        entry: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<ContentHash, StoreError>> + Send;

    /// Fetch `entry` from the folder keyed by `hash`.
    fn get_entry(
        &self,
        hash: &ContentHash,
        entry: &str,
    ) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;

    fn put_in(
        &self,
        folder: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<ContentHash, StoreError>> + Send {
        self.put_entry(folder, CANONICAL_ENTRY, bytes)
    }

    fn put(&self, bytes: Vec<u8>) -> impl Future<Output = Result<ContentHash, StoreError>> + Send {
        self.put_in(DEFAULT_FOLDER, bytes)
    }

    fn get(&self, hash: &ContentHash) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send {
        self.get_entry(hash, CANONICAL_ENTRY)
    }
}

/// Canonical JSON bytes: pretty-printed, two-space indent, struct field order.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Serialize `value` to its canonical form and `put` it.
pub async fn put_json<S, T>(store: &S, value: &T) -> Result<ContentHash, StoreError>
where
    S: ContentStore,
    T: Serialize,
{
    put_json_in(store, DEFAULT_FOLDER, value).await
}

pub async fn put_json_in<S, T>(store: &S, folder: &str, value: &T) -> Result<ContentHash, StoreError>
where
    S: ContentStore,
    T: Serialize,
{
    let bytes = to_canonical_json(value)?;
    store.put_in(folder, bytes).await
}
