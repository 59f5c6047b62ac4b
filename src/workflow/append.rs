//! Append one clinical file to a patient's record.
//!
//! Read pointer, fetch document, upload file and metadata, seal the
//! metadata hash for the patient, upload the grown document, then swap
//! the ledger pointer conditioned on the one read first. Nothing before
//! the swap needs undoing; the swap itself is the commit point.

use std::sync::Arc;

use thiserror::Error;

use super::inflight::{InFlightAppends, InFlightState};
use super::{
    fetch_document, file_entry_name, read_pointer, timed_out, with_store_timeout, RetryPolicy,
    Timeouts, WorkflowError,
};
use crate::config::ClientConfig;
use crate::crypto::seal_pointer;
use crate::ledger::{Ledger, LedgerError};
use crate::models::{AccountAddress, Category, FileRecordMetadata, PatientAddress};
use crate::store::{patient_folder, put_json_in, ContentHash, ContentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AppendStage {
    ReadingLedger,
    FetchingDocument,
    UploadingFile,
    UploadingMetadata,
    SealingPointer,
    UploadingDocument,
    Committing,
    AwaitingConfirmation,
    Confirmed,
}

impl AppendStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadingLedger => "reading_ledger",
            Self::FetchingDocument => "fetching_document",
            Self::UploadingFile => "uploading_file",
            Self::UploadingMetadata => "uploading_metadata",
            Self::SealingPointer => "sealing_pointer",
            Self::UploadingDocument => "uploading_document",
            Self::Committing => "committing",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Confirmed => "confirmed",
        }
    }
}

impl std::fmt::Display for AppendStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file to append.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub patient: PatientAddress,
    pub category: Category,
    pub file_bytes: Vec<u8>,
    pub original_file_name: String,
    pub display_name: String,
    pub uploader: AccountAddress,
}

/// A confirmed append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub document_hash: ContentHash,
    pub previous_hash: ContentHash,
    pub metadata_hash: ContentHash,
    pub file_hash: ContentHash,
    pub category: Category,
    pub confirmations: u32,
}

/// A failed append and the stage it stopped at.
#[derive(Error, Debug)]
#[error("Append failed at {stage}: {error}")]
pub struct AppendFailure {
    pub stage: AppendStage,
    #[source]
    pub error: WorkflowError,
}

impl AppendFailure {
    /// Whether a ledger write was ever submitted.
    pub fn ledger_touched(&self) -> bool {
        self.stage >= AppendStage::Committing
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.error.retry_policy()
    }
}

fn at<E: Into<WorkflowError>>(stage: AppendStage) -> impl FnOnce(E) -> AppendFailure {
    move |error| AppendFailure {
        stage,
        error: error.into(),
    }
}

/// Result of settling an abandoned commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The pending pointer is on the ledger.
    Committed { document_hash: ContentHash },
    /// The pending write never landed (or was dropped); `current` stands.
    NotCommitted { current: ContentHash },
    /// Nothing was pending for this patient.
    NothingPending,
}

pub struct AppendWorkflow<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    timeouts: Timeouts,
    confirmations: u32,
    inflight: InFlightAppends,
}

impl<S, L> AppendWorkflow<S, L>
where
    S: ContentStore,
    L: Ledger,
{
    pub fn new(store: Arc<S>, ledger: Arc<L>, timeouts: Timeouts, confirmations: u32) -> Self {
        Self {
            store,
            ledger,
            timeouts,
            confirmations,
            inflight: InFlightAppends::new(),
        }
    }

    pub fn from_config(store: Arc<S>, ledger: Arc<L>, config: &ClientConfig) -> Self {
        Self::new(
            store,
            ledger,
            Timeouts::from_config(config),
            config.ledger.confirmations,
        )
    }

    pub fn inflight(&self) -> &InFlightAppends {
        &self.inflight
    }

    /// Run one append to confirmation.
    ///
    /// Success is only reported once the ledger write has the configured
    /// number of confirmations. `ConcurrentModification` is returned as is;
    /// the caller restarts from a fresh read.
    pub async fn run(&self, request: AppendRequest) -> Result<AppendOutcome, AppendFailure> {
        let mut guard = self
            .inflight
            .begin(&request.patient)
            .map_err(at(AppendStage::ReadingLedger))?;
        let AppendRequest {
            patient,
            category,
            file_bytes,
            original_file_name,
            display_name,
            uploader,
        } = request;

        tracing::info!(patient = %patient, category = %category, "Append started");

        // 1. Current pointer
        let current_pointer = read_pointer(&*self.ledger, &patient, self.timeouts.ledger)
            .await
            .map_err(at(AppendStage::ReadingLedger))?;

        // 2. Current document
        guard.advance(AppendStage::FetchingDocument);
        let document = fetch_document(&*self.store, &current_pointer, &patient, self.timeouts.store)
            .await
            .map_err(at(AppendStage::FetchingDocument))?;

        // 3. File, then its metadata
        guard.advance(AppendStage::UploadingFile);
        let folder = patient_folder(&patient);
        let file_hash = with_store_timeout(
            self.timeouts.store,
            self.store
                .put_entry(&folder, file_entry_name(&original_file_name), file_bytes),
        )
        .await
        .map_err(at(AppendStage::UploadingFile))?;
        tracing::debug!(patient = %patient, file_hash = %file_hash, "File uploaded");

        guard.advance(AppendStage::UploadingMetadata);
        let metadata = FileRecordMetadata {
            display_name,
            original_file_name,
            upload_timestamp: chrono::Utc::now().timestamp_millis(),
            file_hash: file_hash.clone(),
            uploader_address: uploader,
        };
        let metadata_hash = with_store_timeout(self.timeouts.store, put_json_in(&*self.store, &folder, &metadata))
            .await
            .map_err(at(AppendStage::UploadingMetadata))?;

        // 4. Seal for the patient's own key
        guard.advance(AppendStage::SealingPointer);
        let pointer = seal_pointer(&metadata_hash, document.public_key())
            .map_err(at(AppendStage::SealingPointer))?;

        // 5. Grown document
        guard.advance(AppendStage::UploadingDocument);
        let next = document.append_pointer(category, pointer);
        let document_hash = with_store_timeout(self.timeouts.store, put_json_in(&*self.store, &folder, &next))
            .await
            .map_err(at(AppendStage::UploadingDocument))?;

        // 6. Compare-and-swap. An elapsed timeout leaves the outcome unknown,
        // so the guard is left unsettled and the patient stays blocked.
        guard.committing(current_pointer.clone(), document_hash.clone());
        tracing::info!(patient = %patient, from = %current_pointer, to = %document_hash, "Submitting pointer update");
        let receipt = match tokio::time::timeout(
            self.timeouts.ledger,
            self.ledger
                .update_pointer(&patient, &current_pointer, &document_hash),
        )
        .await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(error)) => {
                guard.settle();
                if matches!(error, LedgerError::ConcurrentModification { .. }) {
                    tracing::warn!(patient = %patient, "Pointer moved during append");
                } else {
                    tracing::warn!(patient = %patient, error = %error, "Pointer update rejected");
                }
                return Err(at(AppendStage::Committing)(error));
            }
            Err(_) => {
                return Err(at(AppendStage::Committing)(LedgerError::LedgerWriteFailed(
                    timed_out(self.timeouts.ledger),
                )));
            }
        };

        // 7. Durability. Only a dropped write has a known fate; a failed or
        // elapsed wait leaves the patient blocked until reconciled.
        guard.awaiting_confirmation(receipt.clone());
        let confirmations = match tokio::time::timeout(
            self.timeouts.ledger,
            self.ledger.wait_for_confirmations(&receipt, self.confirmations),
        )
        .await
        {
            Ok(Ok(confirmations)) => confirmations,
            Ok(Err(error @ LedgerError::WriteDropped(_))) => {
                guard.settle();
                tracing::warn!(patient = %patient, tx = %receipt.tx_id, error = %error, "Pointer update dropped");
                return Err(at(AppendStage::AwaitingConfirmation)(error));
            }
            Ok(Err(error)) => {
                tracing::warn!(patient = %patient, tx = %receipt.tx_id, error = %error, "Confirmation wait failed");
                return Err(at(AppendStage::AwaitingConfirmation)(error));
            }
            Err(_) => {
                return Err(at(AppendStage::AwaitingConfirmation)(LedgerError::LedgerWriteFailed(
                    timed_out(self.timeouts.ledger),
                )));
            }
        };

        guard.settle();
        guard.advance(AppendStage::Confirmed);
        tracing::info!(
            patient = %patient,
            category = %category,
            document_hash = %document_hash,
            confirmations,
            "Append confirmed"
        );

        Ok(AppendOutcome {
            document_hash,
            previous_hash: current_pointer,
            metadata_hash,
            file_hash,
            category,
            confirmations,
        })
    }

    /// Settle a commit left pending by an abandoned or timed-out append.
    ///
    /// Waits for confirmations when a receipt was obtained, then reads the
    /// ledger. The patient is unblocked only once the outcome is known.
    pub async fn reconcile(&self, patient: &PatientAddress) -> Result<Reconciliation, WorkflowError> {
        let commit = match self.inflight.state(patient) {
            InFlightState::Idle => return Ok(Reconciliation::NothingPending),
            InFlightState::Running(_) => return Err(WorkflowError::AppendInProgress(patient.clone())),
            InFlightState::Unconfirmed(commit) => commit,
        };

        if let Some(receipt) = &commit.receipt {
            match tokio::time::timeout(
                self.timeouts.ledger,
                self.ledger.wait_for_confirmations(receipt, self.confirmations),
            )
            .await
            {
                Ok(Ok(_)) => {}
                // The read below shows what stands.
                Ok(Err(error @ LedgerError::WriteDropped(_))) => {
                    tracing::warn!(patient = %patient, error = %error, "Pending write was dropped");
                }
                Ok(Err(error)) => {
                    tracing::warn!(patient = %patient, error = %error, "Pending write still unconfirmed");
                    return Err(error.into());
                }
                Err(_) => {
                    return Err(LedgerError::LedgerWriteFailed(timed_out(self.timeouts.ledger)).into());
                }
            }
        }

        let current = read_pointer(&*self.ledger, patient, self.timeouts.ledger).await?;
        self.inflight.clear(patient);

        if current == commit.pending {
            tracing::info!(patient = %patient, document_hash = %current, "Pending append committed");
            Ok(Reconciliation::Committed {
                document_hash: current,
            })
        } else {
            tracing::info!(patient = %patient, current = %current, "Pending append did not land");
            Ok(Reconciliation::NotCommitted { current })
        }
    }
}
