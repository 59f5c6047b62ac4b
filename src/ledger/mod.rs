//! Ledger interface: one content-hash pointer and one registration flag per patient.

pub mod memory;

use std::future::Future;

use thiserror::Error;

use crate::models::PatientAddress;
use crate::store::ContentHash;

pub use memory::InMemoryLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Patient is not registered: {0}")]
    PatientNotRegistered(PatientAddress),

    #[error("Patient is already registered: {0}")]
    AlreadyRegistered(PatientAddress),

    #[error("Pointer for {patient} changed since it was read (expected {expected})")]
    ConcurrentModification {
        patient: PatientAddress,
        expected: ContentHash,
        actual: Option<ContentHash>,
    },

    #[error("Ledger write failed: {0}")]
    LedgerWriteFailed(String),

    /// The write was accepted, then discarded before reaching the requested
    /// depth. Unlike `LedgerWriteFailed`, its fate is known.
    #[error("Ledger write was dropped before confirmation: {0}")]
    WriteDropped(String),

    #[error("Ledger read failed: {0}")]
    LedgerReadFailed(String),
}

/// Snapshot of a patient's ledger slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub pointer: Option<ContentHash>,
    pub is_registered: bool,
}

/// Handle for a submitted write, used to wait for confirmations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub tx_id: String,
    pub patient: PatientAddress,
    pub pointer: ContentHash,
}

/// The external system of record.
///
/// `update_pointer` is a compare-and-swap: it only lands if the stored
/// pointer still equals `expected`. A receipt means "accepted", not
/// "durable"; callers wait on `wait_for_confirmations` before reporting
/// success.
pub trait Ledger: Send + Sync {
    fn get_pointer(
        &self,
        patient: &PatientAddress,
    ) -> impl Future<Output = Result<LedgerEntry, LedgerError>> + Send;

    /// One-time registration; fails with `AlreadyRegistered` on repeat.
    fn register_patient(
        &self,
        patient: &PatientAddress,
        initial_document: &ContentHash,
    ) -> impl Future<Output = Result<LedgerReceipt, LedgerError>> + Send;

    fn update_pointer(
        &self,
        patient: &PatientAddress,
        expected: &ContentHash,
        new: &ContentHash,
    ) -> impl Future<Output = Result<LedgerReceipt, LedgerError>> + Send;

    /// Resolve once `receipt` has at least `confirmations` confirmations.
    /// Returns the count observed. A write discarded before reaching the
    /// count fails with `WriteDropped`; `LedgerWriteFailed` means the wait
    /// itself failed and says nothing about the write.
    fn wait_for_confirmations(
        &self,
        receipt: &LedgerReceipt,
        confirmations: u32,
    ) -> impl Future<Output = Result<u32, LedgerError>> + Send;
}
