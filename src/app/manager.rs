// src/app/manager.rs
use chrono::Utc;
use std::{fs, path::Path};
use tracing::{info, warn};

use crate::cert::{CertificateOperations, CertificateVerifier, ProvisionReport, VerificationResult};
use crate::config::ClusterConfig;
use crate::credential::store::fingerprint;
use crate::credential::{CredentialAssembler, CredentialBundle, RawCredentialStore};
use crate::error::{AppError, CredentialError};
use crate::kms::AwsKms;

/// Runs the CLI commands against one validated cluster config.
pub struct CredentialManager {
    config: ClusterConfig,
}

impl CredentialManager {
    pub fn new(config: ClusterConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn init(&self, force: bool) -> Result<ProvisionReport, AppError> {
        let dir = self.config.assets_dir();
        info!("Provisioning credentials in {}", dir.display());
        let report = CertificateOperations::new(
            dir,
            self.config.pki_parameters(),
            self.config.policy(),
        )
        .with_force(force)
        .with_manage_certificates(self.config.manage_certificates)
        .with_encryption_at_rest(self.config.encryption_at_rest)
        .provision_all()?;
        Ok(report)
    }

    /// Encrypts through KMS when a key is configured, unless `unencrypted`.
    pub fn render(&self, unencrypted: bool) -> Result<CredentialBundle, AppError> {
        let assembler = CredentialAssembler::new(self.config.assets_dir(), self.config.policy());
        let bundle = match (&self.config.kms_key_arn, unencrypted) {
            (Some(key_arn), false) => {
                let port = AwsKms::new(self.config.region.clone(), self.config.kms_max_attempts)?;
                assembler.assemble_encrypted(&port, key_arn)?
            }
            (None, false) => {
                warn!("No kms_key_arn configured, rendering unencrypted credentials");
                assembler.assemble_unencrypted()?
            }
            (_, true) => assembler.assemble_unencrypted()?,
        };
        info!(
            auth_tokens = bundle.has_auth_tokens(),
            tls_bootstrap_token = bundle.has_tls_bootstrap_token(),
            "Rendered {} credentials",
            bundle.len()
        );
        Ok(bundle)
    }

    pub fn verify(&self) -> Result<Vec<VerificationResult>, AppError> {
        let store = RawCredentialStore::new(self.config.assets_dir());
        let results = CertificateVerifier::new(&store, self.config.policy()).verify_all()?;

        let now = Utc::now();
        let failed = results
            .iter()
            .filter(|r| !r.verified || r.summary.not_after < now)
            .count();
        if failed > 0 {
            for result in &results {
                if !result.verified {
                    warn!("{} is not signed by the cluster CA", result.name);
                } else if result.summary.not_after < now {
                    warn!("{} expired at {}", result.name, result.summary.not_after);
                }
            }
            return Err(AppError::Verification {
                failed,
                total: results.len(),
            });
        }
        Ok(results)
    }
}

pub fn fingerprint_file(path: &Path) -> Result<String, AppError> {
    let content = fs::read(path).map_err(|e| CredentialError::io(path, e))?;
    Ok(fingerprint(&content))
}
