// src/cert/ca.rs
use openssl::{
    pkey::{PKey, Private},
    x509::X509,
};
use std::{fs, path::Path};
use tracing::info;

use super::issuer::{cert_to_pem, issue_ca, issue_client_cert, issue_server_cert, key_to_pem};
use super::types::{CertificateProfile, KeyUsage};
use super::verification::load_certificate;
use crate::credential::store::write_private;
use crate::error::{CredentialError, Result};

/// The cluster signing key pair.
pub struct CertificateAuthority {
    key: PKey<Private>,
    cert: X509,
}

impl CertificateAuthority {
    pub fn create(profile: &CertificateProfile) -> Result<Self> {
        let (key, cert) = issue_ca(profile)?;
        info!("Generated CA certificate {}", profile.common_name);
        Ok(Self { key, cert })
    }

    /// Imports an existing pair, rejecting a key that does not belong to the
    /// certificate.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert = load_certificate(cert_path)?;
        let pem = fs::read(key_path).map_err(|e| CredentialError::io(key_path, e))?;
        let key = PKey::private_key_from_pem(&pem)
            .map_err(|e| CredentialError::invalid_pem(key_path, e))?;

        let matches = cert
            .public_key()
            .map(|public| public.public_eq(&key))
            .map_err(|e| CredentialError::invalid_pem(cert_path, e))?;
        if !matches {
            return Err(CredentialError::Issuance(format!(
                "{} does not match the public key of {}",
                key_path.display(),
                cert_path.display()
            )));
        }
        Ok(Self { key, cert })
    }

    pub fn save(&self, cert_path: &Path, key_path: &Path) -> Result<()> {
        write_private(key_path, &key_to_pem(&self.key)?)?;
        write_private(cert_path, &cert_to_pem(&self.cert)?)
    }

    pub fn sign(&self, profile: &CertificateProfile, key: &PKey<Private>) -> Result<X509> {
        match profile.key_usage {
            KeyUsage::Server => issue_server_cert(profile, key, &self.key, &self.cert),
            _ => issue_client_cert(profile, key, &self.key, &self.cert),
        }
    }
}
