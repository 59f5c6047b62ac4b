//! Pointer sealing: a content hash in, an `EncryptedPointer` out, and back.

use base64::Engine;

use super::cipher;
use super::keys::{PrivateKey, PublicKey};
use super::CryptoError;
use crate::models::EncryptedPointer;
use crate::store::ContentHash;

/// Seal a content hash for the holder of `public_key_pem`.
///
/// Fails with `InvalidKey` when the stored key text cannot be parsed.
pub fn seal_pointer(hash: &ContentHash, public_key_pem: &str) -> Result<EncryptedPointer, CryptoError> {
    let recipient = PublicKey::from_pem(public_key_pem)?;
    seal_pointer_for(hash, &recipient)
}

pub fn seal_pointer_for(hash: &ContentHash, recipient: &PublicKey) -> Result<EncryptedPointer, CryptoError> {
    let sealed = cipher::encrypt(hash.as_str().as_bytes(), recipient)?;
    Ok(EncryptedPointer::new(
        base64::engine::general_purpose::STANDARD.encode(sealed),
    ))
}

/// Recover the content hash behind a pointer.
///
/// Bad base64, a failed open, an empty plaintext and non-UTF-8 bytes are all
/// `DecryptionFailed`: the caller never gets a garbage hash.
pub fn open_pointer(pointer: &EncryptedPointer, private_key: &PrivateKey) -> Result<ContentHash, CryptoError> {
    let sealed = base64::engine::general_purpose::STANDARD
        .decode(pointer.as_str())
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let plaintext = cipher::decrypt(&sealed, private_key)?;
    let text = String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)?;
    ContentHash::new(text).map_err(|_| CryptoError::DecryptionFailed)
}
