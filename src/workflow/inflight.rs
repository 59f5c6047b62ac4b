//! Commit-window registry.
//!
//! One append per patient at a time. An append that is abandoned after its
//! ledger write was submitted but before the outcome was known leaves the
//! patient blocked until `AppendWorkflow::reconcile` settles it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::append::AppendStage;
use super::WorkflowError;
use crate::ledger::LedgerReceipt;
use crate::models::PatientAddress;
use crate::store::ContentHash;

/// A ledger write whose fate was never observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    /// Pointer the write was conditioned on.
    pub expected: ContentHash,
    /// Pointer the write would install.
    pub pending: ContentHash,
    /// Present once the ledger accepted the submission.
    pub receipt: Option<LedgerReceipt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InFlightState {
    Idle,
    Running(AppendStage),
    Unconfirmed(PendingCommit),
}

#[derive(Default)]
pub struct InFlightAppends {
    slots: Mutex<HashMap<PatientAddress, InFlightState>>,
}

impl InFlightAppends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `patient` for one append.
    pub fn begin(&self, patient: &PatientAddress) -> Result<AppendGuard<'_>, WorkflowError> {
        let mut slots = self.lock();
        match slots.get(patient) {
            Some(InFlightState::Running(_)) => {
                return Err(WorkflowError::AppendInProgress(patient.clone()));
            }
            Some(InFlightState::Unconfirmed(commit)) => {
                return Err(WorkflowError::UnconfirmedCommit {
                    patient: patient.clone(),
                    pending: commit.pending.clone(),
                });
            }
            Some(InFlightState::Idle) | None => {}
        }
        slots.insert(
            patient.clone(),
            InFlightState::Running(AppendStage::ReadingLedger),
        );
        Ok(AppendGuard {
            registry: self,
            patient: patient.clone(),
            stage: AppendStage::ReadingLedger,
            commit: None,
            settled: false,
        })
    }

    pub fn state(&self, patient: &PatientAddress) -> InFlightState {
        self.lock()
            .get(patient)
            .cloned()
            .unwrap_or(InFlightState::Idle)
    }

    pub(crate) fn clear(&self, patient: &PatientAddress) {
        self.lock().remove(patient);
    }

    fn set(&self, patient: &PatientAddress, state: InFlightState) {
        self.lock().insert(patient.clone(), state);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PatientAddress, InFlightState>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held for the lifetime of one append.
///
/// Dropped before `Committing`, or after `settle`, it frees the patient.
/// Dropped inside the commit window without `settle`, it records the
/// pending write instead.
pub struct AppendGuard<'a> {
    registry: &'a InFlightAppends,
    patient: PatientAddress,
    stage: AppendStage,
    commit: Option<PendingCommit>,
    settled: bool,
}

impl AppendGuard<'_> {
    pub fn stage(&self) -> AppendStage {
        self.stage
    }

    pub fn advance(&mut self, stage: AppendStage) {
        self.stage = stage;
        self.registry
            .set(&self.patient, InFlightState::Running(stage));
    }

    /// Enter the commit window for `expected -> pending`.
    pub fn committing(&mut self, expected: ContentHash, pending: ContentHash) {
        self.commit = Some(PendingCommit {
            expected,
            pending,
            receipt: None,
        });
        self.advance(AppendStage::Committing);
    }

    /// The ledger accepted the write; confirmations are outstanding.
    pub fn awaiting_confirmation(&mut self, receipt: LedgerReceipt) {
        if let Some(commit) = self.commit.as_mut() {
            commit.receipt = Some(receipt);
        }
        self.advance(AppendStage::AwaitingConfirmation);
    }

    /// The outcome of the ledger write is known, success or failure.
    pub fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for AppendGuard<'_> {
    fn drop(&mut self) {
        let in_window = matches!(
            self.stage,
            AppendStage::Committing | AppendStage::AwaitingConfirmation
        );
        match self.commit.take() {
            Some(commit) if in_window && !self.settled => {
                tracing::warn!(
                    patient = %self.patient,
                    pending = %commit.pending,
                    stage = %self.stage,
                    "Append abandoned inside commit window"
                );
                self.registry
                    .set(&self.patient, InFlightState::Unconfirmed(commit));
            }
            _ => self.registry.clear(&self.patient),
        }
    }
}
