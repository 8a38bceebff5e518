// credential/types.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::store::fingerprint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CredentialKind {
    PrivateKey,
    Certificate,
    OpaqueToken,
    StructuredConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    pub kind: CredentialKind,
    pub content: Vec<u8>,
    pub source_path: PathBuf,
}

impl Credential {
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.content)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Cached ciphertext matched the raw fingerprint; the port was not called.
    Valid,
    /// Ciphertext was produced by the port during this run and persisted.
    Regenerated,
    /// Raw content was empty; nothing encrypted or cached.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCredential {
    pub ciphertext: Vec<u8>,
    pub fingerprint: String,
    pub cache_path: PathBuf,
    pub fingerprint_path: PathBuf,
    pub status: CacheStatus,
}

/// Which optional entries of the credential set are processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyPolicy {
    pub tls_bootstrap: bool,
    pub kiam: bool,
}
