pub mod keys;
pub mod cipher;
pub mod pointer;
pub mod export;
#[cfg(test)]
pub(crate) mod fixtures;

pub use keys::*;
pub use cipher::{decrypt, encrypt, MAX_PLAINTEXT_LEN};
pub use pointer::*;
pub use export::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key could not be parsed")]
    InvalidKey,

    #[error("Plaintext of {len} bytes exceeds key capacity of {max} bytes")]
    PlaintextTooLarge { len: usize, max: usize },

    #[error("Decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Unsupported key size: {0} bits")]
    UnsupportedKeySize(usize),

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Key file already exists: {0}")]
    KeyFileExists(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
