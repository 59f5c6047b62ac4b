//! Sealed-box encryption of short opaque byte strings (pointer hashes).
//!
//! Each call generates an ephemeral X25519 key, performs ECDH against the
//! recipient's static public key, derives an AES-256-GCM key via
//! HKDF-SHA256 and seals the plaintext. Only the matching private key can
//! re-derive the AES key, and GCM authentication turns every mismatch
//! (wrong key, truncation, tampering) into `DecryptionFailed`.
//!
//! Wire layout: `[version: 1][ephemeral pubkey: 32][nonce: 12][ciphertext + tag]`.
//!
//! RSA keys carried over from existing records use OAEP with SHA-1 for
//! both the label digest and MGF1; the output is the bare RSA ciphertext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use rsa::Oaep;
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::{PrivateKey, PrivateMaterial, PublicKey, PublicMaterial, KEY_LENGTH, X25519_CAPACITY};
use super::CryptoError;

/// Largest plaintext an X25519 key accepts. RSA keys report their own via
/// `PublicKey::capacity`.
pub const MAX_PLAINTEXT_LEN: usize = X25519_CAPACITY;

const FORMAT_VERSION: u8 = 1;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const HEADER_LENGTH: usize = 1 + KEY_LENGTH + NONCE_LENGTH;
const HKDF_SALT: &[u8] = b"myriad-pointer-seal";

/// Seal `plaintext` for the holder of `recipient`'s private key.
///
/// Output is randomised per call; two encryptions of the same plaintext differ.
pub fn encrypt(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let max = recipient.capacity();
    if plaintext.len() > max {
        return Err(CryptoError::PlaintextTooLarge {
            len: plaintext.len(),
            max,
        });
    }

    match &recipient.0 {
        PublicMaterial::X25519(key) => seal_x25519(plaintext, key),
        PublicMaterial::Rsa { key, .. } => key
            .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha1>(), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed),
    }
}

fn seal_x25519(plaintext: &[u8], recipient: &x25519_dalek::PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = x25519_dalek::EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    // A non-contributory result means the recipient key is a low-order point.
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey);
    }

    let key = derive_seal_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient.as_bytes())?;
    let cipher = Aes256Gcm::new((&*key).into());
    let nonce_bytes: [u8; NONCE_LENGTH] = rand::random();

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(HEADER_LENGTH + ciphertext.len());
    sealed.push(FORMAT_VERSION);
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed box with `private_key`.
///
/// The key is only borrowed for the duration of the call.
pub fn decrypt(ciphertext: &[u8], private_key: &PrivateKey) -> Result<Vec<u8>, CryptoError> {
    match &private_key.0 {
        PrivateMaterial::X25519(secret) => open_x25519(ciphertext, secret),
        PrivateMaterial::Rsa { key, .. } => key
            .decrypt_blinded(&mut rand::thread_rng(), Oaep::new::<Sha1>(), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed),
    }
}

fn open_x25519(ciphertext: &[u8], secret: &x25519_dalek::StaticSecret) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < HEADER_LENGTH + TAG_LENGTH || ciphertext[0] != FORMAT_VERSION {
        return Err(CryptoError::DecryptionFailed);
    }

    let mut ephemeral_bytes = [0u8; KEY_LENGTH];
    ephemeral_bytes.copy_from_slice(&ciphertext[1..1 + KEY_LENGTH]);
    let ephemeral_public = x25519_dalek::PublicKey::from(ephemeral_bytes);
    let nonce = Nonce::from_slice(&ciphertext[1 + KEY_LENGTH..HEADER_LENGTH]);

    let shared = secret.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(CryptoError::DecryptionFailed);
    }

    let recipient = x25519_dalek::PublicKey::from(secret);
    let key = derive_seal_key(shared.as_bytes(), &ephemeral_bytes, recipient.as_bytes())
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let cipher = Aes256Gcm::new((&*key).into());

    cipher
        .decrypt(nonce, &ciphertext[HEADER_LENGTH..])
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Both public keys go into the HKDF info so a box cannot be replayed to another recipient.
fn derive_seal_key(
    shared_secret: &[u8],
    ephemeral_public: &[u8; KEY_LENGTH],
    recipient_public: &[u8; KEY_LENGTH],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut info = [0u8; 2 * KEY_LENGTH];
    info[..KEY_LENGTH].copy_from_slice(ephemeral_public);
    info[KEY_LENGTH..].copy_from_slice(recipient_public);

    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared_secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(&info, &mut key[..])
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::fixtures::{OTHER_RSA_PRIVATE_PEM, RSA_PRIVATE_PEM, RSA_PUBLIC_PEM};
    use crate::crypto::keys::{generate_key_pair, KEY_BITS};

    #[test]
    fn encrypt_decrypt_round_trip() {
        let pair = generate_key_pair(KEY_BITS).unwrap();
        let plaintext = b"QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
        let sealed = encrypt(plaintext, &pair.public).unwrap();
        let opened = decrypt(&sealed, &pair.private).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let alice = generate_key_pair(KEY_BITS).unwrap();
        let mallory = generate_key_pair(KEY_BITS).unwrap();
        let sealed = encrypt(b"secret pointer", &alice.public).unwrap();
        assert!(matches!(
            decrypt(&sealed, &mallory.private),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn tampered_ciphertext_detected() {
        let pair = generate_key_pair(KEY_BITS).unwrap();
        let mut sealed = encrypt(b"secret pointer", &pair.public).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(matches!(
            decrypt(&sealed, &pair.private),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn truncated_or_unknown_version_rejected() {
        let pair = generate_key_pair(KEY_BITS).unwrap();
        let sealed = encrypt(b"pointer", &pair.public).unwrap();

        assert!(matches!(
            decrypt(&sealed[..HEADER_LENGTH], &pair.private),
            Err(CryptoError::DecryptionFailed)
        ));

        let mut wrong_version = sealed.clone();
        wrong_version[0] = 9;
        assert!(matches!(
            decrypt(&wrong_version, &pair.private),
            Err(CryptoError::DecryptionFailed)
        ));

        assert!(matches!(decrypt(&[], &pair.private), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn encryptions_are_randomised() {
        let pair = generate_key_pair(KEY_BITS).unwrap();
        let a = encrypt(b"same pointer", &pair.public).unwrap();
        let b = encrypt(b"same pointer", &pair.public).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn plaintext_capacity_enforced() {
        let pair = generate_key_pair(KEY_BITS).unwrap();
        let at_limit = vec![7u8; MAX_PLAINTEXT_LEN];
        assert!(encrypt(&at_limit, &pair.public).is_ok());

        let over = vec![7u8; MAX_PLAINTEXT_LEN + 1];
        assert!(matches!(
            encrypt(&over, &pair.public),
            Err(CryptoError::PlaintextTooLarge { len, max }) if len == MAX_PLAINTEXT_LEN + 1 && max == MAX_PLAINTEXT_LEN
        ));
    }

    #[test]
    fn low_order_public_key_rejected() {
        let zero_key = PublicKey::from_bytes([0u8; KEY_LENGTH]);
        assert!(matches!(encrypt(b"pointer", &zero_key), Err(CryptoError::InvalidKey)));
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let pair = generate_key_pair(KEY_BITS).unwrap();
        let sealed = encrypt(b"", &pair.public).unwrap();
        assert!(decrypt(&sealed, &pair.private).unwrap().is_empty());
    }

    #[test]
    fn rsa_round_trip() {
        let public = PublicKey::from_pem(RSA_PUBLIC_PEM).unwrap();
        let private = PrivateKey::from_pem(RSA_PRIVATE_PEM).unwrap();
        let sealed = encrypt(b"QmRsaPointer", &public).unwrap();
        assert_eq!(sealed.len(), 256);
        assert_eq!(decrypt(&sealed, &private).unwrap(), b"QmRsaPointer");
        assert_ne!(encrypt(b"QmRsaPointer", &public).unwrap(), sealed);
    }

    #[test]
    fn rsa_capacity_enforced() {
        let public = PublicKey::from_pem(RSA_PUBLIC_PEM).unwrap();
        let max = public.capacity();
        assert!(encrypt(&vec![1u8; max], &public).is_ok());
        assert!(matches!(
            encrypt(&vec![1u8; max + 1], &public),
            Err(CryptoError::PlaintextTooLarge { max: m, .. }) if m == max
        ));
    }

    #[test]
    fn mismatched_key_families_fail_to_decrypt() {
        let rsa_public = PublicKey::from_pem(RSA_PUBLIC_PEM).unwrap();
        let rsa_other = PrivateKey::from_pem(OTHER_RSA_PRIVATE_PEM).unwrap();
        let x25519 = generate_key_pair(KEY_BITS).unwrap();

        let rsa_sealed = encrypt(b"pointer", &rsa_public).unwrap();
        assert!(matches!(decrypt(&rsa_sealed, &rsa_other), Err(CryptoError::DecryptionFailed)));
        assert!(matches!(decrypt(&rsa_sealed, &x25519.private), Err(CryptoError::DecryptionFailed)));

        let box_sealed = encrypt(b"pointer", &x25519.public).unwrap();
        let rsa_private = PrivateKey::from_pem(RSA_PRIVATE_PEM).unwrap();
        assert!(matches!(decrypt(&box_sealed, &rsa_private), Err(CryptoError::DecryptionFailed)));
    }
}
