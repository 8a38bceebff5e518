// cert/types.rs
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum KeyUsage {
    CA,
    Server,
    Client,
    ServerAndClient,
}

#[derive(Debug, Clone)]
pub struct CertificateProfile {
    pub common_name: String,
    pub organization: Vec<String>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub validity: Duration,
    pub key_usage: KeyUsage,
    pub key_size: u32,
}

impl CertificateProfile {
    pub fn new(common_name: impl Into<String>, key_usage: KeyUsage, validity: Duration) -> Self {
        Self {
            common_name: common_name.into(),
            organization: Vec::new(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            validity,
            key_usage,
            key_size: 2048,
        }
    }

    pub fn with_organization(mut self, organization: &[&str]) -> Self {
        self.organization = organization.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn with_dns_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_ip_addresses(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.ip_addresses.extend(ips);
        self
    }
}
