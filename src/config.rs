use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Myriad";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pinata pinning endpoint used when no override is configured.
pub const DEFAULT_PIN_URL: &str = "https://api.pinata.cloud/pinning/pinFileToIPFS";

/// Public IPFS gateway used when no override is configured.
pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.pinata.cloud/ipfs/";

/// Folder label for uploads not made on behalf of a patient.
pub const DEFAULT_FOLDER: &str = "myriad_json";

const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LEDGER_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONFIRMATIONS: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "myriad_lib=info,warn"
}

/// Conventional directory for exported key files: `~/.myriad-secrets/`.
pub fn secrets_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".myriad-secrets"))
}

/// Content store connection settings.
#[derive(Clone)]
pub struct StoreConfig {
    /// Pinning endpoint that accepts multipart uploads.
    pub pin_url: String,
    /// Gateway prefix; `{gateway_url}{hash}/{entry}` resolves a pinned entry.
    pub gateway_url: String,
    /// Bearer token for the pinning service.
    pub jwt: String,
    /// Per-call timeout for uploads and fetches.
    pub timeout: Duration,
}

impl StoreConfig {
    pub fn new(jwt: impl Into<String>) -> Self {
        Self {
            pin_url: DEFAULT_PIN_URL.to_string(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            jwt: jwt.into(),
            timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }
}

// The JWT must never reach a log line.
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("pin_url", &self.pin_url)
            .field("gateway_url", &self.gateway_url)
            .field("jwt", &"[redacted]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Ledger call settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Per-call timeout, including the wait for confirmations.
    pub timeout: Duration,
    /// Confirmations required before a write is reported as durable.
    pub confirmations: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_LEDGER_TIMEOUT_SECS),
            confirmations: DEFAULT_CONFIRMATIONS,
        }
    }
}

/// Full client configuration, injected into stores and workflows.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub store: StoreConfig,
    pub ledger: LedgerConfig,
}

impl ClientConfig {
    /// Build from `MYRIAD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt = lookup("MYRIAD_PINATA_JWT")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("MYRIAD_PINATA_JWT"))?;

        let mut store = StoreConfig::new(jwt);
        if let Some(url) = lookup("MYRIAD_PIN_URL") {
            store.pin_url = url;
        }
        if let Some(url) = lookup("MYRIAD_GATEWAY_URL") {
            store.gateway_url = url;
        }
        if let Some(secs) = parse_number::<u64>(&lookup, "MYRIAD_STORE_TIMEOUT_SECS")? {
            store.timeout = Duration::from_secs(secs);
        }

        let mut ledger = LedgerConfig::default();
        if let Some(secs) = parse_number::<u64>(&lookup, "MYRIAD_LEDGER_TIMEOUT_SECS")? {
            ledger.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_number::<u32>(&lookup, "MYRIAD_CONFIRMATIONS")? {
            ledger.confirmations = n;
        }

        Ok(Self { store, ledger })
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}
