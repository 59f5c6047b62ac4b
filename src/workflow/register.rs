use std::sync::Arc;

use super::{with_ledger_read_timeout, with_ledger_write_timeout, with_store_timeout, Timeouts, WorkflowError};
use crate::config::ClientConfig;
use crate::crypto::{generate_key_pair, PrivateKey, PublicKey, KEY_BITS};
use crate::ledger::{Ledger, LedgerError};
use crate::models::{PatientProfile, RecordDocument};
use crate::store::{patient_folder, put_json_in, ContentHash, ContentStore};

/// A confirmed registration.
///
/// `private_key` exists nowhere else; exporting it is up to the caller.
#[derive(Debug)]
pub struct Registration {
    pub document_hash: ContentHash,
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
    pub confirmations: u32,
}

pub struct RegistrationWorkflow<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    timeouts: Timeouts,
    confirmations: u32,
}

impl<S, L> RegistrationWorkflow<S, L>
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

    /// Create a key pair and an empty record document for `profile`,
    /// then register the document's hash on the ledger.
    pub async fn register(&self, profile: PatientProfile) -> Result<Registration, WorkflowError> {
        let patient = profile.address.clone();

        let entry = with_ledger_read_timeout(self.timeouts.ledger, self.ledger.get_pointer(&patient)).await?;
        if entry.is_registered {
            return Err(LedgerError::AlreadyRegistered(patient).into());
        }

        let pair = generate_key_pair(KEY_BITS)?;
        let document = RecordDocument::empty(profile, &pair.public, chrono::Utc::now().timestamp_millis());
        let folder = patient_folder(&patient);
        let document_hash = with_store_timeout(
            self.timeouts.store,
            put_json_in(&*self.store, &folder, &document),
        )
        .await?;
        tracing::debug!(patient = %patient, document_hash = %document_hash, "Initial document uploaded");

        let receipt = with_ledger_write_timeout(
            self.timeouts.ledger,
            self.ledger.register_patient(&patient, &document_hash),
        )
        .await?;
        let confirmations = with_ledger_write_timeout(
            self.timeouts.ledger,
            self.ledger.wait_for_confirmations(&receipt, self.confirmations),
        )
        .await?;

        tracing::info!(patient = %patient, document_hash = %document_hash, confirmations, "Patient registered");
        Ok(Registration {
            document_hash,
            public_key: pair.public,
            private_key: pair.private,
            confirmations,
        })
    }
}
