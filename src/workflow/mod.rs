//! Record workflows: registration, append and decrypt.
//!
//! Workflows own nothing but their collaborators and a commit-window
//! registry. Every store and ledger call runs under a caller-supplied
//! timeout; an elapsed timeout surfaces as the failure kind of the call
//! it wrapped.

pub mod append;
pub mod decrypt;
pub mod inflight;
pub mod register;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::ClientConfig;
use crate::crypto::CryptoError;
use crate::ledger::{Ledger, LedgerError};
use crate::models::{DocumentError, PatientAddress, RecordDocument};
use crate::store::{ContentHash, ContentStore, StoreError};

pub use append::{AppendFailure, AppendOutcome, AppendRequest, AppendStage, AppendWorkflow, Reconciliation};
pub use decrypt::{decrypt_records, fetch_file, resolve_records, DecryptedRecords, ResolvedRecords};
pub use inflight::{AppendGuard, InFlightAppends, InFlightState, PendingCommit};
pub use register::{Registration, RegistrationWorkflow};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Record document unavailable: {0}")]
    DocumentUnavailable(#[source] StoreError),

    #[error("Records could not be decrypted with this key")]
    RecordDecryptionFailed,

    #[error("No records found")]
    NoRecordsFound,

    #[error("An append for {0} is already in progress")]
    AppendInProgress(PatientAddress),

    #[error("An append for {patient} may have committed {pending}; reconcile before appending again")]
    UnconfirmedCommit {
        patient: PatientAddress,
        pending: ContentHash,
    },
}

/// What a caller may do after a workflow failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Transient: run the whole workflow again from its first step.
    RestartWorkflow,
    /// The ledger moved underneath us: re-read the pointer, then rebuild.
    RestartFromFreshRead,
    /// Wrong key, corrupt content or a failed precondition.
    Never,
}

impl WorkflowError {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            WorkflowError::Store(StoreError::StoreUnavailable(_))
            | WorkflowError::DocumentUnavailable(_)
            | WorkflowError::Ledger(LedgerError::LedgerWriteFailed(_))
            | WorkflowError::Ledger(LedgerError::WriteDropped(_))
            | WorkflowError::Ledger(LedgerError::LedgerReadFailed(_)) => RetryPolicy::RestartWorkflow,
            WorkflowError::Ledger(LedgerError::ConcurrentModification { .. }) => {
                RetryPolicy::RestartFromFreshRead
            }
            _ => RetryPolicy::Never,
        }
    }
}

/// Per-call deadlines for store and ledger calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub store: Duration,
    /// Applies to each ledger call, including the confirmation wait.
    pub ledger: Duration,
}

impl Timeouts {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            store: config.store.timeout,
            ledger: config.ledger.timeout,
        }
    }
}

/// A patient's document as of one ledger read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentDocument {
    /// Pointer the document was fetched through; the compare-and-swap base.
    pub pointer: ContentHash,
    pub document: RecordDocument,
}

pub(crate) async fn with_store_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(StoreError::StoreUnavailable(timed_out(limit))))
}

pub(crate) async fn with_ledger_read_timeout<T, F>(limit: Duration, call: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(LedgerError::LedgerReadFailed(timed_out(limit))))
}

pub(crate) async fn with_ledger_write_timeout<T, F>(limit: Duration, call: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(LedgerError::LedgerWriteFailed(timed_out(limit))))
}

pub(crate) fn timed_out(limit: Duration) -> String {
    format!("timed out after {}ms", limit.as_millis())
}

/// Step 1: the current pointer of a registered patient.
pub(crate) async fn read_pointer<L: Ledger>(
    ledger: &L,
    patient: &PatientAddress,
    timeout: Duration,
) -> Result<ContentHash, WorkflowError> {
    let entry = with_ledger_read_timeout(timeout, ledger.get_pointer(patient)).await?;
    if !entry.is_registered {
        return Err(LedgerError::PatientNotRegistered(patient.clone()).into());
    }
    entry.pointer.ok_or_else(|| {
        LedgerError::LedgerReadFailed(format!("registered patient {patient} has no pointer")).into()
    })
}

/// Step 2: the document behind `pointer`, checked to belong to `patient`.
pub(crate) async fn fetch_document<S: ContentStore>(
    store: &S,
    pointer: &ContentHash,
    patient: &PatientAddress,
    timeout: Duration,
) -> Result<RecordDocument, WorkflowError> {
    let bytes = with_store_timeout(timeout, store.get(pointer))
        .await
        .map_err(WorkflowError::DocumentUnavailable)?;
    let document = RecordDocument::deserialize(&bytes)?;
    if document.patient_address() != patient {
        return Err(DocumentError::MalformedDocument(format!(
            "document under {pointer} belongs to another patient"
        ))
        .into());
    }
    Ok(document)
}

/// Read the ledger pointer for `patient` and fetch the document behind it.
pub async fn load_current_document<S, L>(
    store: &S,
    ledger: &L,
    patient: &PatientAddress,
    timeouts: Timeouts,
) -> Result<CurrentDocument, WorkflowError>
where
    S: ContentStore,
    L: Ledger,
{
    let pointer = read_pointer(ledger, patient, timeouts.ledger).await?;
    let document = fetch_document(store, &pointer, patient, timeouts.store).await?;
    tracing::debug!(patient = %patient, pointer = %pointer, "Loaded current document");
    Ok(CurrentDocument { pointer, document })
}

/// Store entry name for an uploaded file: its last path component.
pub(crate) fn file_entry_name(original_file_name: &str) -> &str {
    original_file_name
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("file")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::models::PatientProfile;
    use crate::store::InMemoryStore;

    pub fn address(digit: char) -> PatientAddress {
        PatientAddress::parse(&format!("0x{}", digit.to_string().repeat(40))).unwrap()
    }

    pub fn profile(digit: char) -> PatientProfile {
        PatientProfile {
            address: address(digit),
            name: "Test Patient".into(),
            date_of_birth: "1990-01-01".into(),
            blood_group: "o-positive".into(),
            phone_number: "5550100".into(),
        }
    }

    pub fn timeouts() -> Timeouts {
        Timeouts {
            store: Duration::from_secs(2),
            ledger: Duration::from_secs(2),
        }
    }

    pub fn backends() -> (Arc<InMemoryStore>, Arc<InMemoryLedger>) {
        (Arc::new(InMemoryStore::new()), Arc::new(InMemoryLedger::new()))
    }

    pub async fn register(
        store: &Arc<InMemoryStore>,
        ledger: &Arc<InMemoryLedger>,
        digit: char,
    ) -> Registration {
        RegistrationWorkflow::new(Arc::clone(store), Arc::clone(ledger), timeouts(), 1)
            .register(profile(digit))
            .await
            .unwrap()
    }
}
