use std::collections::BTreeMap;
use std::time::Duration;

use super::{file_entry_name, with_store_timeout, WorkflowError};
use crate::crypto::{open_pointer, CryptoError, PrivateKey};
use crate::models::{Category, FileRecordMetadata, RecordDocument};
use crate::store::{ContentHash, ContentStore};

/// Cleartext pointers per category, in append order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecryptedRecords {
    by_category: BTreeMap<Category, Vec<ContentHash>>,
}

impl DecryptedRecords {
    pub fn get(&self, category: Category) -> &[ContentHash] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[ContentHash])> {
        self.by_category
            .iter()
            .map(|(category, hashes)| (*category, hashes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolved file metadata per category, in append order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedRecords {
    by_category: BTreeMap<Category, Vec<FileRecordMetadata>>,
}

impl ResolvedRecords {
    pub fn get(&self, category: Category) -> &[FileRecordMetadata] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[FileRecordMetadata])> {
        self.by_category
            .iter()
            .map(|(category, records)| (*category, records.as_slice()))
    }
}

/// Open every pointer in `document` with `private_key`.
///
/// All or nothing: one pointer that fails to open fails the whole call
/// with `RecordDecryptionFailed` and nothing partial is returned. A
/// document without pointers is `NoRecordsFound`, checked before any
/// decryption so it is never mistaken for a wrong key.
pub fn decrypt_records(
    document: &RecordDocument,
    private_key: &PrivateKey,
) -> Result<DecryptedRecords, WorkflowError> {
    if document.pointer_count() == 0 {
        return Err(WorkflowError::NoRecordsFound);
    }

    let mut by_category = BTreeMap::new();
    for category in Category::ALL {
        let mut hashes = Vec::with_capacity(document.pointers(*category).len());
        for pointer in document.pointers(*category) {
            match open_pointer(pointer, private_key) {
                Ok(hash) => hashes.push(hash),
                Err(CryptoError::DecryptionFailed) => {
                    tracing::warn!(
                        patient = %document.patient_address(),
                        category = %category,
                        "Record decryption failed"
                    );
                    return Err(WorkflowError::RecordDecryptionFailed);
                }
                Err(other) => return Err(other.into()),
            }
        }
        by_category.insert(*category, hashes);
    }

    tracing::debug!(patient = %document.patient_address(), "Records decrypted");
    Ok(DecryptedRecords { by_category })
}

/// Fetch the `FileRecordMetadata` behind every decrypted pointer.
pub async fn resolve_records<S: ContentStore>(
    store: &S,
    records: &DecryptedRecords,
    timeout: Duration,
) -> Result<ResolvedRecords, WorkflowError> {
    let mut by_category = BTreeMap::new();
    for (category, hashes) in records.iter() {
        let mut resolved = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let bytes = with_store_timeout(timeout, store.get(hash))
                .await
                .map_err(WorkflowError::DocumentUnavailable)?;
            resolved.push(FileRecordMetadata::deserialize(&bytes)?);
        }
        by_category.insert(category, resolved);
    }
    Ok(ResolvedRecords { by_category })
}

/// Download the raw file a metadata record refers to.
pub async fn fetch_file<S: ContentStore>(
    store: &S,
    metadata: &FileRecordMetadata,
    timeout: Duration,
) -> Result<Vec<u8>, WorkflowError> {
    let entry = file_entry_name(&metadata.original_file_name);
    with_store_timeout(timeout, store.get_entry(&metadata.file_hash, entry))
        .await
        .map_err(WorkflowError::DocumentUnavailable)
}
