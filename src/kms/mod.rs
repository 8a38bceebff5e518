// src/kms/mod.rs
mod aws;

pub use aws::AwsKms;

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KmsError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("kms encrypt with {key_id} failed: {message}")]
    Encrypt { key_id: String, message: String },

    #[error("unexpected encrypt output: {0}")]
    Output(String),
}

/// Encrypt-only boundary to an external key management service.
///
/// Implementations only promise that the ciphertext decrypts back to the
/// plaintext under `key_id`. Two calls with the same input are expected to
/// return different bytes.
pub trait EncryptionPort {
    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError>;
}
