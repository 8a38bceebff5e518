// src/credential/assembler.rs
use std::path::PathBuf;
use tracing::{debug, info};

use super::bundle::CredentialBundle;
use super::compact::compact;
use super::encryptor::CachedEncryptor;
use super::store::{DefaultValue, RawCredentialStore};
use super::table::{self, EntrySpec, Fallback, Source};
use super::types::{AssemblyPolicy, CacheStatus, Credential};
use crate::error::{CredentialError, Result};
use crate::kms::EncryptionPort;

enum Mode<'a> {
    Encrypted(CachedEncryptor<'a>),
    Unencrypted,
}

/// Walks the entry table and compacts every enabled credential.
pub struct CredentialAssembler {
    store: RawCredentialStore,
    policy: AssemblyPolicy,
}

impl CredentialAssembler {
    pub fn new(dir: impl Into<PathBuf>, policy: AssemblyPolicy) -> Self {
        Self {
            store: RawCredentialStore::new(dir),
            policy,
        }
    }

    /// Keys, tokens and configs go through the cached encryptor; certificates
    /// are expiry-checked and compacted as-is.
    pub fn assemble_encrypted(
        &self,
        port: &dyn EncryptionPort,
        key_id: &str,
    ) -> Result<CredentialBundle> {
        self.assemble(Mode::Encrypted(CachedEncryptor::new(port, key_id)))
    }

    /// Compacts raw content without touching the encryption port.
    pub fn assemble_unencrypted(&self) -> Result<CredentialBundle> {
        self.assemble(Mode::Unencrypted)
    }

    fn assemble(&self, mode: Mode<'_>) -> Result<CredentialBundle> {
        let mut bundle = CredentialBundle::default();
        let mut regenerated = 0;

        for entry in table::enabled(&self.policy) {
            let raw = self.read_entry(entry)?;
            debug!(name = entry.name, "read {}", raw.source_path.display());

            if entry.expiry_check {
                self.store.check_expiry(&raw)?;
            }

            let payload = match &mode {
                Mode::Encrypted(encryptor) if entry.encrypt_individually => {
                    let encrypted = encryptor.encrypt(&raw)?;
                    if encrypted.status == CacheStatus::Regenerated {
                        regenerated += 1;
                    }
                    encrypted.ciphertext
                }
                _ => raw.content,
            };

            let compacted =
                compact(&payload).map_err(|e| CredentialError::io(&raw.source_path, e))?;
            bundle.insert(entry.name, compacted);
        }

        info!(
            "Assembled {} credentials from {} ({} re-encrypted)",
            bundle.len(),
            self.store.dir().display(),
            regenerated
        );
        Ok(bundle)
    }

    /// Resolves aliases and defaults for `entry` and reads its raw content.
    pub fn read_entry(&self, entry: &EntrySpec) -> Result<Credential> {
        let own = self.store.path_for(entry.file);
        let path = match entry.source {
            Source::AliasOf(target) if self.store.is_blank(&own)? => {
                debug!(name = entry.name, "{} is empty, following {}", own.display(), target);
                self.path_of(target)?
            }
            _ => own,
        };

        let default = match entry.fallback {
            Fallback::None => None,
            Fallback::Default(value) => Some(DefaultValue::parse(value, self.store.dir())),
        };

        self.store.read(entry.name, entry.kind, &path, default.as_ref())
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        table::lookup(name)
            .map(|target| self.store.path_for(target.file))
            .ok_or_else(|| CredentialError::MissingRequired {
                name: name.to_string(),
                path: self.store.dir().to_path_buf(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::issuer::{cert_to_pem, generate_private_key, sign_leaf_until};
    use crate::cert::operations::CertificateOperations;
    use crate::cert::profiles::PkiParameters;
    use crate::cert::types::{CertificateProfile, KeyUsage};
    use crate::credential::compact::decompact;
    use crate::credential::encryptor::{cache_path, fingerprint_path};
    use crate::kms::fake::CountingPort;
    use chrono::{Duration, Utc};
    use openssl::{pkey::PKey, x509::X509};
    use std::fs;
    use tempfile::TempDir;

    const KEY_ID: &str = "arn:aws:kms:us-west-2:000000000000:key/test";

    fn provisioned(policy: AssemblyPolicy) -> TempDir {
        let dir = TempDir::new().unwrap();
        let params = PkiParameters {
            key_size: 1024,
            ..PkiParameters::default()
        };
        CertificateOperations::new(dir.path(), params, policy)
            .provision_all()
            .unwrap();
        dir
    }

    #[test]
    fn test_encrypted_assembly_is_idempotent() {
        let dir = provisioned(AssemblyPolicy::default());
        let assembler = CredentialAssembler::new(dir.path(), AssemblyPolicy::default());
        let port = CountingPort::new();

        let first = assembler.assemble_encrypted(&port, KEY_ID).unwrap();
        let calls = port.calls();
        assert!(calls > 0);

        let second = assembler.assemble_encrypted(&port, KEY_ID).unwrap();
        assert_eq!(first, second);
        assert_eq!(port.calls(), calls);
    }

    #[test]
    fn test_drift_regenerates_only_affected_entry() {
        let dir = provisioned(AssemblyPolicy::default());
        let assembler = CredentialAssembler::new(dir.path(), AssemblyPolicy::default());
        let port = CountingPort::new();
        let before = assembler.assemble_encrypted(&port, KEY_ID).unwrap();

        let admin_key = dir.path().join("admin-key.pem");
        fs::remove_file(cache_path(&admin_key)).unwrap();
        let after_cache_loss = assembler.assemble_encrypted(&port, KEY_ID).unwrap();

        fs::remove_file(fingerprint_path(&admin_key)).unwrap();
        let after_fingerprint_loss = assembler.assemble_encrypted(&port, KEY_ID).unwrap();

        for after in [&after_cache_loss, &after_fingerprint_loss] {
            for entry in table::enabled(&AssemblyPolicy::default()) {
                if entry.name == "admin-key" {
                    continue;
                }
                assert_eq!(after.get(entry.name), before.get(entry.name), "{} changed", entry.name);
            }
        }
        assert_ne!(before.get("admin-key"), after_cache_loss.get("admin-key"));
        assert_ne!(
            after_cache_loss.get("admin-key"),
            after_fingerprint_loss.get("admin-key")
        );
    }

    #[test]
    fn test_certificates_are_not_encrypted() {
        let dir = provisioned(AssemblyPolicy::default());
        let assembler = CredentialAssembler::new(dir.path(), AssemblyPolicy::default());
        let port = CountingPort::new();
        let bundle = assembler.assemble_encrypted(&port, KEY_ID).unwrap();

        let ca = fs::read(dir.path().join("ca.pem")).unwrap();
        assert_eq!(decompact(bundle.get("ca").unwrap()).unwrap(), ca);
        assert!(!cache_path(&dir.path().join("ca.pem")).exists());

        let key = fs::read(dir.path().join("apiserver-key.pem")).unwrap();
        assert_ne!(decompact(bundle.get("apiserver-key").unwrap()).unwrap(), key);
    }

    #[test]
    fn test_service_account_key_redirects_to_apiserver_key() {
        let dir = provisioned(AssemblyPolicy::default());
        assert!(!dir.path().join("service-account-key.pem").exists());

        let assembler = CredentialAssembler::new(dir.path(), AssemblyPolicy::default());
        let plain = assembler.assemble_unencrypted().unwrap();
        let apiserver_key = fs::read(dir.path().join("apiserver-key.pem")).unwrap();
        assert_eq!(
            plain.get("service-account-key"),
            Some(compact(&apiserver_key).unwrap().as_str())
        );

        let port = CountingPort::new();
        let encrypted = assembler.assemble_encrypted(&port, KEY_ID).unwrap();
        assert_eq!(
            encrypted.get("service-account-key"),
            encrypted.get("apiserver-key")
        );
    }

    #[test]
    fn test_aliases_follow_target_until_overridden() {
        let policy = AssemblyPolicy {
            tls_bootstrap: true,
            kiam: false,
        };
        let dir = provisioned(policy);
        fs::write(dir.path().join("worker-ca.pem"), "").unwrap();
        let assembler = CredentialAssembler::new(dir.path(), policy);
        let port = CountingPort::new();

        let bundle = assembler.assemble_encrypted(&port, KEY_ID).unwrap();
        assert_eq!(bundle.get("worker-ca"), bundle.get("ca"));
        assert_eq!(bundle.get("etcd-trusted-ca"), bundle.get("ca"));
        assert_eq!(bundle.get("worker-ca-key"), bundle.get("ca-key"));
        assert!(!cache_path(&dir.path().join("worker-ca-key.pem")).exists());

        let own_ca = fs::read(dir.path().join("admin.pem")).unwrap();
        fs::write(dir.path().join("worker-ca.pem"), &own_ca).unwrap();
        let overridden = assembler.assemble_encrypted(&port, KEY_ID).unwrap();
        assert_eq!(decompact(overridden.get("worker-ca").unwrap()).unwrap(), own_ca);
        assert_eq!(overridden.get("ca"), bundle.get("ca"));
    }

    #[test]
    fn test_empty_entries_stay_empty_without_port_calls() {
        let dir = provisioned(AssemblyPolicy::default());
        let assembler = CredentialAssembler::new(dir.path(), AssemblyPolicy::default());
        let port = CountingPort::new();
        let bundle = assembler.assemble_encrypted(&port, KEY_ID).unwrap();
        let calls = port.calls();

        assert_eq!(bundle.get("tls-bootstrap-token"), Some(""));
        assert!(!bundle.has_tls_bootstrap_token());

        fs::write(dir.path().join("tokens.csv"), "").unwrap();
        let bundle = assembler.assemble_encrypted(&port, KEY_ID).unwrap();
        assert_eq!(bundle.get("auth-tokens"), Some(""));
        assert!(!bundle.has_auth_tokens());
        assert_eq!(port.calls(), calls);
    }

    #[test]
    fn test_missing_required_entry_aborts() {
        let dir = provisioned(AssemblyPolicy::default());
        fs::remove_file(dir.path().join("etcd-client.pem")).unwrap();
        let assembler = CredentialAssembler::new(dir.path(), AssemblyPolicy::default());

        match assembler.assemble_unencrypted().unwrap_err() {
            CredentialError::MissingRequired { name, path } => {
                assert_eq!(name, "etcd-client");
                assert_eq!(path, dir.path().join("etcd-client.pem"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unencrypted_mode_never_writes_cache() {
        let dir = provisioned(AssemblyPolicy::default());
        let assembler = CredentialAssembler::new(dir.path(), AssemblyPolicy::default());
        let bundle = assembler.assemble_unencrypted().unwrap();

        let key = fs::read(dir.path().join("etcd-key.pem")).unwrap();
        assert_eq!(decompact(bundle.get("etcd-key").unwrap()).unwrap(), key);
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".enc"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_kiam_entries_are_gated() {
        let dir = provisioned(AssemblyPolicy::default());
        let assembler = CredentialAssembler::new(dir.path(), AssemblyPolicy::default());
        let bundle = assembler.assemble_unencrypted().unwrap();
        assert!(bundle.get("kiam-server").is_none());
        assert!(bundle.get("ca-key").is_none());

        let kiam = AssemblyPolicy {
            tls_bootstrap: false,
            kiam: true,
        };
        let assembler = CredentialAssembler::new(dir.path(), kiam);
        assert!(matches!(
            assembler.assemble_unencrypted(),
            Err(CredentialError::MissingRequired { ref name, .. }) if name == "kiam-agent"
        ));
    }

    #[test]
    fn test_expired_certificate_aborts_encrypted_assembly() {
        let dir = provisioned(AssemblyPolicy::default());
        let ca_key = PKey::private_key_from_pem(&fs::read(dir.path().join("ca-key.pem")).unwrap())
            .unwrap();
        let ca_cert = X509::from_pem(&fs::read(dir.path().join("ca.pem")).unwrap()).unwrap();
        let key = generate_private_key(1024).unwrap();
        let profile = CertificateProfile {
            key_size: 1024,
            ..CertificateProfile::new("kube-admin", KeyUsage::Client, Duration::days(1))
                .with_organization(&["system:masters"])
        };
        let expired =
            sign_leaf_until(&profile, &key, &ca_key, &ca_cert, Utc::now() - Duration::days(1))
                .unwrap();
        fs::write(dir.path().join("admin.pem"), cert_to_pem(&expired).unwrap()).unwrap();

        let assembler = CredentialAssembler::new(dir.path(), AssemblyPolicy::default());
        let port = CountingPort::new();
        match assembler.assemble_encrypted(&port, KEY_ID).unwrap_err() {
            CredentialError::Expired { name, path, .. } => {
                assert_eq!(name, "admin");
                assert_eq!(path, dir.path().join("admin.pem"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
