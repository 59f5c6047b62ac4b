// One-time key export at registration and key re-acquisition for decrypt passes.
// Key files are `privateKey-{address}.pem` / `publicKey-{address}.pem` with the
// address lower-cased; private key files are owner-only on Unix.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::keys::{KeyPair, PrivateKey};
use super::CryptoError;
use crate::models::PatientAddress;

pub fn private_key_file_name(address: &PatientAddress) -> String {
    format!("privateKey-{}.pem", address.as_str())
}

pub fn public_key_file_name(address: &PatientAddress) -> String {
    format!("publicKey-{}.pem", address.as_str())
}

/// Write both halves of a freshly generated pair into `dir`.
///
/// Refuses to overwrite an existing private key file: losing the old key
/// would make every pointer sealed for it unreadable.
pub fn export_key_pair(
    dir: &Path,
    address: &PatientAddress,
    pair: &KeyPair,
) -> Result<PathBuf, CryptoError> {
    fs::create_dir_all(dir)?;
    set_dir_permissions(dir)?;

    let private_path = dir.join(private_key_file_name(address));
    {
        let pem = pair.private.to_pem()?;
        let mut file = create_new_private(&private_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                CryptoError::KeyFileExists(private_path.display().to_string())
            } else {
                CryptoError::IoError(e)
            }
        })?;
        file.write_all(pem.as_bytes())?;
        file.sync_all()?;
    }

    let public_path = dir.join(public_key_file_name(address));
    fs::write(&public_path, pair.public.to_pem())?;

    tracing::info!(patient = %address, "Key pair exported");
    Ok(private_path)
}

/// Re-acquire a patient's private key from an export directory.
pub fn load_private_key(dir: &Path, address: &PatientAddress) -> Result<PrivateKey, CryptoError> {
    let path = dir.join(private_key_file_name(address));
    let text = zeroize::Zeroizing::new(fs::read_to_string(path)?);
    PrivateKey::from_pem(&text)
}

#[cfg(unix)]
fn create_new_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_new_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CryptoError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CryptoError> {
    Ok(())
}
