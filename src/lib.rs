pub mod config;
pub mod crypto;
pub mod ledger;
pub mod models;
pub mod store;
pub mod workflow;

mod log_audit;

use tracing_subscriber::EnvFilter;

pub use crypto::{generate_key_pair, CryptoError, KeyPair, PrivateKey, PublicKey};
pub use ledger::{Ledger, LedgerError};
pub use models::{Category, DocumentError, PatientAddress, RecordDocument};
pub use store::{ContentHash, ContentStore, StoreError};
pub use workflow::{AppendWorkflow, RegistrationWorkflow, RetryPolicy, WorkflowError};

/// Install the fmt subscriber, filtered by `RUST_LOG` or the default filter.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} client v{}", config::APP_NAME, config::APP_VERSION);
    }
}
