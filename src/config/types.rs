// config/types.rs
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::cert::profiles::{first_usable_ip, PkiParameters};
use crate::credential::AssemblyPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a valid cluster config: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid cluster config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub region: String,
    pub assets_dir: String,
    pub service_cidr: String,
    pub api_endpoint_dns_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etcd_member_domain: Option<String>,
    /// KMS key used for the encrypted credential set; unset renders plaintext.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,
    pub tls_bootstrap: bool,
    pub kiam: bool,
    pub encryption_at_rest: bool,
    pub manage_certificates: bool,
    pub ca_validity_days: i64,
    pub cert_validity_days: i64,
    pub kms_max_attempts: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: "kubernetes".to_string(),
            region: "us-west-1".to_string(),
            assets_dir: "credentials".to_string(),
            service_cidr: "10.3.0.0/24".to_string(),
            api_endpoint_dns_names: Vec::new(),
            etcd_member_domain: None,
            kms_key_arn: None,
            tls_bootstrap: false,
            kiam: false,
            encryption_at_rest: false,
            manage_certificates: true,
            ca_validity_days: 3650,
            cert_validity_days: 365,
            kms_max_attempts: 3,
        }
    }
}

impl ClusterConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&config_str).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let config_str = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        fs::write(path, config_str).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_name.trim().is_empty() {
            return Err(ConfigError::Invalid("cluster_name must not be empty".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid("region must not be empty".to_string()));
        }
        first_usable_ip(&self.service_cidr).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.ca_validity_days <= 0 || self.cert_validity_days <= 0 {
            return Err(ConfigError::Invalid(
                "certificate validity must be a positive number of days".to_string(),
            ));
        }
        if self.kms_max_attempts == 0 {
            return Err(ConfigError::Invalid("kms_max_attempts must be at least 1".to_string()));
        }
        if matches!(&self.kms_key_arn, Some(arn) if arn.trim().is_empty()) {
            return Err(ConfigError::Invalid("kms_key_arn must not be empty when set".to_string()));
        }
        Ok(())
    }

    pub fn assets_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.assets_dir).to_string())
    }

    pub fn policy(&self) -> AssemblyPolicy {
        AssemblyPolicy {
            tls_bootstrap: self.tls_bootstrap,
            kiam: self.kiam,
        }
    }

    pub fn pki_parameters(&self) -> PkiParameters {
        PkiParameters {
            cluster_name: self.cluster_name.clone(),
            region: self.region.clone(),
            service_cidr: self.service_cidr.clone(),
            api_endpoint_dns_names: self.api_endpoint_dns_names.clone(),
            etcd_member_domain: self.etcd_member_domain.clone(),
            ca_validity: Duration::days(self.ca_validity_days),
            cert_validity: Duration::days(self.cert_validity_days),
            ..PkiParameters::default()
        }
    }
}
