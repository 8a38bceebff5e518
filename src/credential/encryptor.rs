// src/credential/encryptor.rs
use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use super::store::write_private;
use super::types::{CacheStatus, Credential, EncryptedCredential};
use crate::error::{CredentialError, Result};
use crate::kms::EncryptionPort;

pub const CACHE_SUFFIX: &str = ".enc";
pub const FINGERPRINT_SUFFIX: &str = ".fingerprint";

pub fn cache_path(source: &Path) -> PathBuf {
    with_suffix(source, CACHE_SUFFIX)
}

pub fn fingerprint_path(source: &Path) -> PathBuf {
    with_suffix(source, FINGERPRINT_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[derive(Debug, PartialEq, Eq)]
enum CacheState {
    Uncached,
    Valid(Vec<u8>),
    Stale,
}

/// Encrypts raw credentials, reusing ciphertext persisted next to the raw
/// file while its fingerprint still matches.
pub struct CachedEncryptor<'a> {
    port: &'a dyn EncryptionPort,
    key_id: &'a str,
}

impl<'a> CachedEncryptor<'a> {
    pub fn new(port: &'a dyn EncryptionPort, key_id: &'a str) -> Self {
        Self { port, key_id }
    }

    pub fn encrypt(&self, raw: &Credential) -> Result<EncryptedCredential> {
        let cache_path = cache_path(&raw.source_path);
        let fingerprint_path = fingerprint_path(&raw.source_path);
        let fingerprint = raw.fingerprint();

        if raw.is_empty() {
            return Ok(EncryptedCredential {
                ciphertext: Vec::new(),
                fingerprint,
                cache_path,
                fingerprint_path,
                status: CacheStatus::Empty,
            });
        }

        match classify(raw, &cache_path, &fingerprint_path, &fingerprint)? {
            CacheState::Valid(ciphertext) => {
                debug!(name = %raw.name, "using cached {}", cache_path.display());
                Ok(EncryptedCredential {
                    ciphertext,
                    fingerprint,
                    cache_path,
                    fingerprint_path,
                    status: CacheStatus::Valid,
                })
            }
            CacheState::Uncached | CacheState::Stale => {
                let ciphertext = self.port.encrypt(self.key_id, &raw.content).map_err(|source| {
                    CredentialError::EncryptionPort {
                        name: raw.name.clone(),
                        path: raw.source_path.clone(),
                        source,
                    }
                })?;
                // The fingerprint is only written once its ciphertext is on disk
                write_private(&cache_path, &ciphertext)?;
                write_private(&fingerprint_path, fingerprint.as_bytes())?;
                info!(name = %raw.name, "encrypted {}", raw.source_path.display());
                Ok(EncryptedCredential {
                    ciphertext,
                    fingerprint,
                    cache_path,
                    fingerprint_path,
                    status: CacheStatus::Regenerated,
                })
            }
        }
    }
}

fn classify(
    raw: &Credential,
    cache_path: &Path,
    fingerprint_path: &Path,
    fingerprint: &str,
) -> Result<CacheState> {
    let ciphertext = match fs::read(cache_path) {
        Ok(ciphertext) => ciphertext,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheState::Uncached),
        Err(e) => return Err(CredentialError::io(cache_path, e)),
    };

    let stored = match fs::read_to_string(fingerprint_path) {
        Ok(stored) => stored,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(
                name = %raw.name,
                "{} exists but {} is missing, re-encrypting {}",
                cache_path.display(),
                fingerprint_path.display(),
                raw.source_path.display()
            );
            return Ok(CacheState::Stale);
        }
        Err(e) => return Err(CredentialError::io(fingerprint_path, e)),
    };

    if stored.trim() != fingerprint {
        info!(
            name = %raw.name,
            "{} has been changed, re-encrypting it",
            raw.source_path.display()
        );
        return Ok(CacheState::Stale);
    }

    Ok(CacheState::Valid(ciphertext))
}
