//! In-process ledger with compare-and-swap, block confirmations and
//! failure injection.
//!
//! Every accepted write is included in the next block. Waiting for more
//! confirmations mines empty blocks on top unless confirmations are held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Barrier};
use uuid::Uuid;

use super::{Ledger, LedgerEntry, LedgerError, LedgerReceipt};
use crate::models::PatientAddress;
use crate::store::ContentHash;

struct PendingWrite {
    patient: PatientAddress,
    previous: Option<ContentHash>,
    pointer: ContentHash,
    block: u64,
    /// Discarded by a reorganization before reaching the requested depth.
    doomed: bool,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<PatientAddress, ContentHash>,
    height: u64,
    writes: HashMap<String, PendingWrite>,
    fail_next_write: Option<String>,
    fail_next_confirmation: Option<String>,
    reorg_next_write: bool,
}

pub struct InMemoryLedger {
    inner: Mutex<Inner>,
    read_barrier: Mutex<Option<Arc<Barrier>>>,
    hold: watch::Sender<bool>,
    write_latency: Mutex<Option<Duration>>,
    update_attempts: AtomicUsize,
    committed_updates: AtomicUsize,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner::default()),
            read_barrier: Mutex::new(None),
            hold,
            write_latency: Mutex::new(None),
            update_attempts: AtomicUsize::new(0),
            committed_updates: AtomicUsize::new(0),
        }
    }

    /// Seed a registered slot directly, bypassing `register_patient`.
    pub fn seed(&self, patient: &PatientAddress, pointer: ContentHash) {
        self.lock().slots.insert(patient.clone(), pointer);
    }

    /// Current pointer without going through the async interface.
    pub fn pointer_of(&self, patient: &PatientAddress) -> Option<ContentHash> {
        self.lock().slots.get(patient).cloned()
    }

    pub fn height(&self) -> u64 {
        self.lock().height
    }

    /// Next write (register or update) fails with `LedgerWriteFailed`.
    pub fn fail_next_write(&self, reason: impl Into<String>) {
        self.lock().fail_next_write = Some(reason.into());
    }

    /// Next confirmation wait fails with `LedgerWriteFailed` without
    /// touching the write, like a dropped RPC connection.
    pub fn fail_next_confirmation(&self, reason: impl Into<String>) {
        self.lock().fail_next_confirmation = Some(reason.into());
    }

    /// Delay every `update_pointer` before it is applied. A caller that
    /// gives up during the delay leaves the slot untouched.
    pub fn set_write_latency(&self, latency: Option<Duration>) {
        *self.write_latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Next write is accepted, then reverted while awaiting confirmations.
    pub fn reorg_next_write(&self) {
        self.lock().reorg_next_write = true;
    }

    /// The next `parties` reads block until all of them have arrived,
    /// forcing concurrent callers to observe the same pointer.
    pub fn set_read_barrier(&self, parties: usize) {
        *self
            .read_barrier
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(Barrier::new(parties)));
    }

    /// While held, `wait_for_confirmations` parks without mining.
    pub fn hold_confirmations(&self, hold: bool) {
        self.hold.send_replace(hold);
    }

    /// `update_pointer` calls made, accepted or not.
    pub fn update_attempts(&self) -> usize {
        self.update_attempts.load(Ordering::SeqCst)
    }

    /// `update_pointer` calls whose compare-and-swap landed.
    pub fn committed_updates(&self) -> usize {
        self.committed_updates.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_write(
        inner: &mut Inner,
        patient: &PatientAddress,
        previous: Option<ContentHash>,
        pointer: &ContentHash,
    ) -> LedgerReceipt {
        inner.height += 1;
        inner.slots.insert(patient.clone(), pointer.clone());
        let doomed = std::mem::take(&mut inner.reorg_next_write);
        let tx_id = format!("0x{}", Uuid::new_v4().simple());
        inner.writes.insert(
            tx_id.clone(),
            PendingWrite {
                patient: patient.clone(),
                previous,
                pointer: pointer.clone(),
                block: inner.height,
                doomed,
            },
        );
        LedgerReceipt {
            tx_id,
            patient: patient.clone(),
            pointer: pointer.clone(),
        }
    }

    async fn wait_until_released(&self) {
        let mut rx = self.hold.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Ledger for InMemoryLedger {
    async fn get_pointer(&self, patient: &PatientAddress) -> Result<LedgerEntry, LedgerError> {
        // Snapshot before the barrier: every party returns what it saw on arrival.
        let pointer = self.lock().slots.get(patient).cloned();

        let barrier = self
            .read_barrier
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(barrier) = barrier {
            if barrier.wait().await.is_leader() {
                let mut slot = self.read_barrier.lock().unwrap_or_else(|e| e.into_inner());
                if slot.as_ref().is_some_and(|b| Arc::ptr_eq(b, &barrier)) {
                    *slot = None;
                }
            }
        }

        Ok(LedgerEntry {
            is_registered: pointer.is_some(),
            pointer,
        })
    }

    async fn register_patient(
        &self,
        patient: &PatientAddress,
        initial_document: &ContentHash,
    ) -> Result<LedgerReceipt, LedgerError> {
        let mut inner = self.lock();
        if let Some(reason) = inner.fail_next_write.take() {
            return Err(LedgerError::LedgerWriteFailed(reason));
        }
        if inner.slots.contains_key(patient) {
            return Err(LedgerError::AlreadyRegistered(patient.clone()));
        }
        let receipt = Self::record_write(&mut inner, patient, None, initial_document);
        tracing::debug!(patient = %patient, tx = %receipt.tx_id, "Registration accepted");
        Ok(receipt)
    }

    async fn update_pointer(
        &self,
        patient: &PatientAddress,
        expected: &ContentHash,
        new: &ContentHash,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        let latency = *self.write_latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();
        if let Some(reason) = inner.fail_next_write.take() {
            return Err(LedgerError::LedgerWriteFailed(reason));
        }
        let current = match inner.slots.get(patient) {
            Some(current) => current.clone(),
            None => return Err(LedgerError::PatientNotRegistered(patient.clone())),
        };
        if &current != expected {
            return Err(LedgerError::ConcurrentModification {
                patient: patient.clone(),
                expected: expected.clone(),
                actual: Some(current),
            });
        }
        let receipt = Self::record_write(&mut inner, patient, Some(current), new);
        self.committed_updates.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(patient = %patient, tx = %receipt.tx_id, "Pointer update accepted");
        Ok(receipt)
    }

    async fn wait_for_confirmations(
        &self,
        receipt: &LedgerReceipt,
        confirmations: u32,
    ) -> Result<u32, LedgerError> {
        self.wait_until_released().await;

        let mut inner = self.lock();
        if let Some(reason) = inner.fail_next_confirmation.take() {
            return Err(LedgerError::LedgerWriteFailed(reason));
        }
        let Some(write) = inner.writes.get(&receipt.tx_id) else {
            return Err(LedgerError::WriteDropped(format!(
                "unknown transaction {}",
                receipt.tx_id
            )));
        };

        if write.doomed {
            let write = inner
                .writes
                .remove(&receipt.tx_id)
                .ok_or_else(|| LedgerError::WriteDropped("transaction vanished".into()))?;
            // Only roll back if nothing landed on top of the dropped write.
            if inner.slots.get(&write.patient) == Some(&write.pointer) {
                match write.previous {
                    Some(previous) => {
                        inner.slots.insert(write.patient.clone(), previous);
                    }
                    None => {
                        inner.slots.remove(&write.patient);
                    }
                }
            }
            tracing::warn!(patient = %write.patient, tx = %receipt.tx_id, "Write dropped by reorganization");
            return Err(LedgerError::WriteDropped(
                "transaction dropped by chain reorganization".into(),
            ));
        }

        let block = write.block;
        let target = block + u64::from(confirmations.max(1)) - 1;
        if inner.height < target {
            inner.height = target;
        }
        let observed = inner.height - block + 1;
        Ok(u32::try_from(observed).unwrap_or(u32::MAX))
    }
}
