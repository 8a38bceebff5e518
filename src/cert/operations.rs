// src/cert/operations.rs
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::ca::CertificateAuthority;
use super::issuer::{cert_to_pem, generate_private_key, key_to_pem};
use super::profiles::{ca_profile, leaf_profiles, PkiParameters};
use crate::credential::encryption_config::EncryptionConfigGenerator;
use crate::credential::table::{self, CA_FILE, CA_KEY_FILE};
use crate::credential::tokens::{bootstrap_token_line, generate_bootstrap_token};
use crate::credential::types::Credential;
use crate::credential::{AssemblyPolicy, CredentialKind, RawCredentialStore};
use crate::error::{CredentialError, Result};

/// Files touched by [`CertificateOperations::provision_all`], by file name.
#[derive(Debug, Default, Serialize)]
pub struct ProvisionReport {
    pub issued: Vec<String>,
    pub kept: Vec<String>,
    pub generated: Vec<String>,
}

/// Populates an assets directory with the cluster PKI, tokens and
/// encryption-at-rest config.
pub struct CertificateOperations {
    store: RawCredentialStore,
    params: PkiParameters,
    policy: AssemblyPolicy,
    force: bool,
    manage_certificates: bool,
    encryption_at_rest: bool,
}

impl CertificateOperations {
    pub fn new(dir: impl Into<PathBuf>, params: PkiParameters, policy: AssemblyPolicy) -> Self {
        Self {
            store: RawCredentialStore::new(dir),
            params,
            policy,
            force: false,
            manage_certificates: true,
            encryption_at_rest: false,
        }
    }

    /// Reissue certificates even when both files of a pair exist.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_manage_certificates(mut self, manage: bool) -> Self {
        self.manage_certificates = manage;
        self
    }

    pub fn with_encryption_at_rest(mut self, enabled: bool) -> Self {
        self.encryption_at_rest = enabled;
        self
    }

    pub fn provision_all(&self) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::default();

        if self.manage_certificates {
            self.provision_certificates(&mut report)?;
        } else {
            info!(
                "Certificates are managed externally, expecting them in {}",
                self.store.dir().display()
            );
        }

        if self.policy.tls_bootstrap {
            self.provision_bootstrap_token(&mut report)?;
        }
        if self.encryption_at_rest {
            self.provision_encryption_config(&mut report)?;
        }

        info!(
            "Provisioned {}: {} issued, {} kept, {} generated",
            self.store.dir().display(),
            report.issued.len(),
            report.kept.len(),
            report.generated.len()
        );
        Ok(report)
    }

    fn provision_certificates(&self, report: &mut ProvisionReport) -> Result<()> {
        let (ca, ca_created) = self.load_or_create_ca(report)?;

        for leaf in leaf_profiles(&self.params, &self.policy)? {
            let key_name = format!("{}-key", leaf.name);
            let cert_path = self.entry_path(leaf.name)?;
            let key_path = self.entry_path(&key_name)?;

            if !self.force && !ca_created && cert_path.exists() && key_path.exists() {
                debug!("Keeping existing {}", cert_path.display());
                report.kept.push(file_name(&cert_path));
                continue;
            }

            let key = generate_private_key(leaf.profile.key_size)?;
            let cert = ca.sign(&leaf.profile, &key)?;
            self.write(&key_name, CredentialKind::PrivateKey, &key_path, key_to_pem(&key)?)?;
            self.write(leaf.name, CredentialKind::Certificate, &cert_path, cert_to_pem(&cert)?)?;
            info!("Issued {} ({})", cert_path.display(), leaf.profile.common_name);
            report.issued.push(file_name(&cert_path));
        }
        Ok(())
    }

    fn load_or_create_ca(&self, report: &mut ProvisionReport) -> Result<(CertificateAuthority, bool)> {
        let cert_path = self.store.path_for(CA_FILE);
        let key_path = self.store.path_for(CA_KEY_FILE);

        if !self.force {
            match (cert_path.exists(), key_path.exists()) {
                (true, true) => {
                    let ca = CertificateAuthority::load(&cert_path, &key_path)?;
                    report.kept.push(CA_FILE.to_string());
                    return Ok((ca, false));
                }
                (true, false) => {
                    return Err(CredentialError::MissingRequired {
                        name: "ca-key".to_string(),
                        path: key_path,
                    })
                }
                (false, true) => {
                    return Err(CredentialError::MissingRequired {
                        name: "ca".to_string(),
                        path: cert_path,
                    })
                }
                (false, false) => {}
            }
        }

        let ca = CertificateAuthority::create(&ca_profile(&self.params))?;
        ca.save(&cert_path, &key_path)?;
        report.issued.push(CA_FILE.to_string());
        Ok((ca, true))
    }

    fn provision_bootstrap_token(&self, report: &mut ProvisionReport) -> Result<()> {
        let tokens_path = self.entry_path(table::AUTH_TOKENS)?;
        let token_path = self.entry_path(table::TLS_BOOTSTRAP_TOKEN)?;

        match (tokens_path.exists(), token_path.exists()) {
            (false, false) => {
                let token = generate_bootstrap_token()?;
                let line = format!("{}\n", bootstrap_token_line(&token));
                self.write(table::AUTH_TOKENS, CredentialKind::OpaqueToken, &tokens_path, line.into_bytes())?;
                self.write(
                    table::TLS_BOOTSTRAP_TOKEN,
                    CredentialKind::OpaqueToken,
                    &token_path,
                    token.into_bytes(),
                )?;
                info!("Generated kubelet TLS bootstrap token");
                report.generated.push(file_name(&tokens_path));
                report.generated.push(file_name(&token_path));
            }
            (true, true) => {
                report.kept.push(file_name(&tokens_path));
                report.kept.push(file_name(&token_path));
            }
            _ => warn!(
                "Only one of {} and {} exists, leaving both untouched",
                tokens_path.display(),
                token_path.display()
            ),
        }
        Ok(())
    }

    fn provision_encryption_config(&self, report: &mut ProvisionReport) -> Result<()> {
        let path = self.entry_path(table::ENCRYPTION_CONFIG)?;
        if path.exists() {
            report.kept.push(file_name(&path));
            return Ok(());
        }
        EncryptionConfigGenerator::new(&path).generate_config()?;
        info!("Generated {}", path.display());
        report.generated.push(file_name(&path));
        Ok(())
    }

    fn write(&self, name: &str, kind: CredentialKind, path: &Path, content: Vec<u8>) -> Result<()> {
        self.store.write(&Credential {
            name: name.to_string(),
            kind,
            content,
            source_path: path.to_path_buf(),
        })
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        table::lookup(name)
            .map(|entry| self.store.path_for(entry.file))
            .ok_or_else(|| CredentialError::Issuance(format!("no credential entry named {}", name)))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::verification::CertificateVerifier;
    use std::fs;
    use tempfile::TempDir;

    fn params() -> PkiParameters {
        PkiParameters {
            key_size: 1024,
            ..PkiParameters::default()
        }
    }

    #[test]
    fn test_provisions_every_certificate_entry() {
        let dir = TempDir::new().unwrap();
        let report = CertificateOperations::new(dir.path(), params(), AssemblyPolicy::default())
            .provision_all()
            .unwrap();

        assert_eq!(report.issued.len(), 9);
        assert!(report.issued.contains(&"ca.pem".to_string()));
        assert!(report.kept.is_empty());
        assert!(report.generated.is_empty());
        for name in ["ca-key.pem", "apiserver-key.pem", "etcd-client.pem", "apiserver-aggregator.pem"] {
            assert!(dir.path().join(name).exists(), "{}", name);
        }
        assert!(!dir.path().join("tokens.csv").exists());

        let store = RawCredentialStore::new(dir.path());
        let results = CertificateVerifier::new(&store, AssemblyPolicy::default())
            .verify_all()
            .unwrap();
        assert!(results.iter().all(|r| r.verified));
    }

    #[test]
    fn test_second_run_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let ops = CertificateOperations::new(dir.path(), params(), AssemblyPolicy::default());
        ops.provision_all().unwrap();
        let before = fs::read(dir.path().join("worker.pem")).unwrap();

        let report = ops.provision_all().unwrap();
        assert!(report.issued.is_empty());
        assert_eq!(report.kept.len(), 9);
        assert_eq!(fs::read(dir.path().join("worker.pem")).unwrap(), before);
    }

    #[test]
    fn test_missing_leaf_is_reissued_alone() {
        let dir = TempDir::new().unwrap();
        let ops = CertificateOperations::new(dir.path(), params(), AssemblyPolicy::default());
        ops.provision_all().unwrap();
        fs::remove_file(dir.path().join("admin-key.pem")).unwrap();

        let report = ops.provision_all().unwrap();
        assert_eq!(report.issued, vec!["admin.pem".to_string()]);
    }

    #[test]
    fn test_force_reissues() {
        let dir = TempDir::new().unwrap();
        let ops = CertificateOperations::new(dir.path(), params(), AssemblyPolicy::default());
        ops.provision_all().unwrap();
        let ca = fs::read(dir.path().join("ca.pem")).unwrap();

        let report = ops.with_force(true).provision_all().unwrap();
        assert_eq!(report.issued.len(), 9);
        assert_ne!(fs::read(dir.path().join("ca.pem")).unwrap(), ca);
    }

    #[test]
    fn test_ca_without_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ops = CertificateOperations::new(dir.path(), params(), AssemblyPolicy::default());
        ops.provision_all().unwrap();
        fs::remove_file(dir.path().join("ca-key.pem")).unwrap();

        assert!(matches!(
            ops.provision_all(),
            Err(CredentialError::MissingRequired { ref name, .. }) if name == "ca-key"
        ));
    }

    #[test]
    fn test_externally_managed_certificates_are_untouched() {
        let dir = TempDir::new().unwrap();
        let report = CertificateOperations::new(dir.path(), params(), AssemblyPolicy::default())
            .with_manage_certificates(false)
            .provision_all()
            .unwrap();
        assert!(report.issued.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_bootstrap_token_and_encryption_config() {
        let dir = TempDir::new().unwrap();
        let policy = AssemblyPolicy {
            tls_bootstrap: true,
            kiam: true,
        };
        let ops = CertificateOperations::new(dir.path(), params(), policy).with_encryption_at_rest(true);
        let report = ops.provision_all().unwrap();

        assert_eq!(report.issued.len(), 11);
        assert_eq!(
            report.generated,
            vec!["tokens.csv", "kubelet-tls-bootstrap-token", "encryption-config.yaml"]
        );

        let token = fs::read_to_string(dir.path().join("kubelet-tls-bootstrap-token")).unwrap();
        let tokens = fs::read_to_string(dir.path().join("tokens.csv")).unwrap();
        assert_eq!(
            tokens,
            format!("{},kubelet-bootstrap,10001,system:kubelet-bootstrap\n", token)
        );

        let again = ops.provision_all().unwrap();
        assert!(again.generated.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("kubelet-tls-bootstrap-token")).unwrap(),
            token
        );
    }
}
