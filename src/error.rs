// src/error.rs
use chrono::{DateTime, Utc};
use std::{io, path::PathBuf};
use thiserror::Error;

use crate::config::ConfigError;
use crate::kms::KmsError;

/// Errors raised while issuing, reading, encrypting or compacting credentials.
///
/// Every variant is fatal for the run: callers abort instead of rendering a
/// partial credential set.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("certificate issuance failed: {0}")]
    Issuance(String),

    #[error("{name}: required credential {} is missing and has no default", .path.display())]
    MissingRequired { name: String, path: PathBuf },

    #[error(
        "{name}: certificate in {} expired at {not_after} (subject: {subject}, issuer: {issuer}, not before: {not_before})",
        .path.display()
    )]
    Expired {
        name: String,
        path: PathBuf,
        subject: String,
        issuer: String,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    },

    #[error("{name}: failed to encrypt {}", .path.display())]
    EncryptionPort {
        name: String,
        path: PathBuf,
        #[source]
        source: KmsError,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: invalid PEM data: {reason}", .path.display())]
    InvalidPem { path: PathBuf, reason: String },
}

impl CredentialError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_pem(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::InvalidPem {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps an openssl failure with the step that produced it.
    pub fn issuance(context: &str, err: openssl::error::ErrorStack) -> Self {
        Self::Issuance(format!("{}: {}", context, err))
    }
}

pub type Result<T, E = CredentialError> = std::result::Result<T, E>;

/// Top-level failure of a command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Kms(#[from] KmsError),

    #[error("{failed} of {total} certificates failed verification")]
    Verification { failed: usize, total: usize },

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_missing_required_names_entry_and_path() {
        let err = CredentialError::MissingRequired {
            name: "etcd-client".to_string(),
            path: PathBuf::from("credentials/etcd-client.pem"),
        };
        let message = err.to_string();
        assert!(message.contains("etcd-client"));
        assert!(message.contains("credentials/etcd-client.pem"));
    }

    #[test]
    fn test_encryption_port_error_keeps_source() {
        let err = CredentialError::EncryptionPort {
            name: "admin-key".to_string(),
            path: PathBuf::from("admin-key.pem"),
            source: KmsError::Output("empty CiphertextBlob".to_string()),
        };
        assert!(err.to_string().contains("admin-key.pem"));
        assert_eq!(
            err.source().map(|s| s.to_string()).as_deref(),
            Some("unexpected encrypt output: empty CiphertextBlob")
        );
    }
}
