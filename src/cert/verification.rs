// src/cert/verification.rs
use chrono::{DateTime, TimeZone, Utc};
use openssl::x509::{X509VerifyResult, X509};
use std::path::Path;
use tracing::{debug, info};
use x509_parser::{
    extensions::ParsedExtension,
    pem::Pem,
};

use crate::credential::{table, AssemblyPolicy, CredentialKind, RawCredentialStore};
use crate::error::{CredentialError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    pub fingerprint: String,
}

/// True when `cert` was signed by `ca`'s key and names `ca` as its issuer.
pub fn verify_issued_by(cert: &X509, ca: &X509) -> Result<bool> {
    if ca.issued(cert) != X509VerifyResult::OK {
        return Ok(false);
    }
    let ca_key = ca
        .public_key()
        .map_err(|e| CredentialError::issuance("failed to read CA public key", e))?;
    cert.verify(&ca_key)
        .map_err(|e| CredentialError::issuance("failed to verify certificate signature", e))
}

/// Parses every `CERTIFICATE` block in `pem`. Other block types are skipped.
pub fn summarize(path: &Path, pem: &[u8]) -> Result<Vec<CertificateSummary>> {
    let mut summaries = Vec::new();
    for block in Pem::iter_from_buffer(pem) {
        let block = block.map_err(|e| CredentialError::invalid_pem(path, e))?;
        if block.label != "CERTIFICATE" {
            continue;
        }
        let cert = block
            .parse_x509()
            .map_err(|e| CredentialError::invalid_pem(path, e))?;

        let not_before = timestamp(path, cert.validity().not_before.timestamp())?;
        let not_after = timestamp(path, cert.validity().not_after.timestamp())?;
        let is_ca = cert
            .extensions()
            .iter()
            .find_map(|ext| match ext.parsed_extension() {
                ParsedExtension::BasicConstraints(bc) => Some(bc.ca),
                _ => None,
            })
            .unwrap_or(false);

        summaries.push(CertificateSummary {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: hex::encode(cert.raw_serial()),
            not_before,
            not_after,
            is_ca,
            fingerprint: hex::encode(openssl::sha::sha256(&block.contents)),
        });
    }
    Ok(summaries)
}

fn timestamp(path: &Path, secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| CredentialError::invalid_pem(path, format!("invalid timestamp {}", secs)))
}

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub name: String,
    pub verified: bool,
    pub summary: CertificateSummary,
}

/// Checks every certificate in the credential set against `ca.pem`.
pub struct CertificateVerifier<'a> {
    store: &'a RawCredentialStore,
    policy: AssemblyPolicy,
}

impl<'a> CertificateVerifier<'a> {
    pub fn new(store: &'a RawCredentialStore, policy: AssemblyPolicy) -> Self {
        Self { store, policy }
    }

    pub fn verify_all(&self) -> Result<Vec<VerificationResult>> {
        let ca_path = self.store.path_for(table::CA_FILE);
        info!("Verifying certificates against {}", ca_path.display());
        let ca = load_certificate(&ca_path)?;

        let mut results = Vec::new();
        for entry in table::ENTRIES
            .iter()
            .filter(|e| e.kind == CredentialKind::Certificate && e.enabled_if.allows(&self.policy))
        {
            let path = self.store.path_for(entry.file);
            if !path.exists() {
                debug!("{} not present, skipping", path.display());
                continue;
            }
            let pem = std::fs::read(&path).map_err(|e| CredentialError::io(&path, e))?;
            if pem.is_empty() {
                continue;
            }
            let cert = X509::from_pem(&pem).map_err(|e| CredentialError::invalid_pem(&path, e))?;
            let verified = verify_issued_by(&cert, &ca)?;
            let summary = summarize(&path, &pem)?
                .into_iter()
                .next()
                .ok_or_else(|| CredentialError::invalid_pem(&path, "no certificate block"))?;
            results.push(VerificationResult {
                name: entry.name.to_string(),
                verified,
                summary,
            });
        }
        Ok(results)
    }
}

pub fn load_certificate(path: &Path) -> Result<X509> {
    let pem = std::fs::read(path).map_err(|e| CredentialError::io(path, e))?;
    X509::from_pem(&pem).map_err(|e| CredentialError::invalid_pem(path, e))
}
