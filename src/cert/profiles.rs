// src/cert/profiles.rs
use chrono::Duration;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::types::{CertificateProfile, KeyUsage};
use crate::credential::AssemblyPolicy;
use crate::error::{CredentialError, Result};

pub const API_SERVER_DNS_NAMES: [&str; 4] = [
    "kubernetes",
    "kubernetes.default",
    "kubernetes.default.svc",
    "kubernetes.default.svc.cluster.local",
];

/// Cluster facts the certificate subjects and names are derived from.
#[derive(Debug, Clone)]
pub struct PkiParameters {
    pub cluster_name: String,
    pub region: String,
    pub service_cidr: String,
    pub api_endpoint_dns_names: Vec<String>,
    pub etcd_member_domain: Option<String>,
    pub ca_validity: Duration,
    pub cert_validity: Duration,
    pub key_size: u32,
}

impl Default for PkiParameters {
    fn default() -> Self {
        Self {
            cluster_name: "kubernetes".to_string(),
            region: "us-west-1".to_string(),
            service_cidr: "10.3.0.0/24".to_string(),
            api_endpoint_dns_names: Vec::new(),
            etcd_member_domain: None,
            ca_validity: Duration::days(3650),
            cert_validity: Duration::days(365),
            key_size: 2048,
        }
    }
}

/// A leaf certificate to issue, named by its certificate entry.
#[derive(Debug, Clone)]
pub struct LeafSpec {
    pub name: &'static str,
    pub profile: CertificateProfile,
}

/// The network address of `cidr` plus one.
pub fn first_usable_ip(cidr: &str) -> Result<IpAddr> {
    let invalid = |reason: &str| CredentialError::Issuance(format!("invalid CIDR {}: {}", cidr, reason));

    let (addr, prefix) = cidr.split_once('/').ok_or_else(|| invalid("missing prefix length"))?;
    let addr: IpAddr = addr.trim().parse().map_err(|_| invalid("bad address"))?;
    let prefix: u32 = prefix.trim().parse().map_err(|_| invalid("bad prefix length"))?;

    match addr {
        IpAddr::V4(v4) => {
            if prefix > 32 {
                return Err(invalid("prefix length exceeds 32"));
            }
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            let network = u32::from(v4) & mask;
            Ok(IpAddr::V4(Ipv4Addr::from(network.wrapping_add(1))))
        }
        IpAddr::V6(v6) => {
            if prefix > 128 {
                return Err(invalid("prefix length exceeds 128"));
            }
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            let network = u128::from(v6) & mask;
            Ok(IpAddr::V6(Ipv6Addr::from(network.wrapping_add(1))))
        }
    }
}

/// Internal DNS domain EC2 assigns to instances in `region`.
pub fn private_domain_name(region: &str) -> String {
    if region == "us-east-1" {
        "ec2.internal".to_string()
    } else {
        format!("{}.compute.internal", region)
    }
}

pub fn ca_profile(params: &PkiParameters) -> CertificateProfile {
    CertificateProfile {
        key_size: params.key_size,
        ..CertificateProfile::new("kube-ca", KeyUsage::CA, params.ca_validity)
            .with_organization(&[params.cluster_name.as_str()])
    }
}

/// Every leaf certificate the cluster needs under `policy`, in entry order.
pub fn leaf_profiles(params: &PkiParameters, policy: &AssemblyPolicy) -> Result<Vec<LeafSpec>> {
    let validity = params.cert_validity;
    let private_domain = private_domain_name(&params.region);
    let etcd_domain = params
        .etcd_member_domain
        .clone()
        .unwrap_or_else(|| private_domain.clone());
    let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);

    let mut leaves = vec![
        LeafSpec {
            name: "apiserver",
            profile: CertificateProfile::new("kube-apiserver", KeyUsage::Server, validity)
                .with_dns_names(API_SERVER_DNS_NAMES)
                .with_dns_names(params.api_endpoint_dns_names.iter().cloned())
                .with_ip_addresses([first_usable_ip(&params.service_cidr)?, localhost]),
        },
        LeafSpec {
            name: "kube-controller-manager",
            profile: CertificateProfile::new(
                "system:kube-controller-manager",
                KeyUsage::Client,
                validity,
            ),
        },
        LeafSpec {
            name: "kube-scheduler",
            profile: CertificateProfile::new("system:kube-scheduler", KeyUsage::Client, validity),
        },
        LeafSpec {
            name: "worker",
            profile: CertificateProfile::new("kube-worker", KeyUsage::Client, validity)
                .with_organization(&["system:nodes"])
                .with_dns_names([format!("*.{}", private_domain)]),
        },
        LeafSpec {
            name: "admin",
            profile: CertificateProfile::new("kube-admin", KeyUsage::Client, validity)
                .with_organization(&["system:masters"]),
        },
        LeafSpec {
            name: "etcd",
            profile: CertificateProfile::new("kube-etcd", KeyUsage::ServerAndClient, validity)
                .with_dns_names([format!("*.{}", etcd_domain)]),
        },
        LeafSpec {
            name: "etcd-client",
            profile: CertificateProfile::new("kube-etcd-client", KeyUsage::Client, validity),
        },
        LeafSpec {
            name: "apiserver-aggregator",
            profile: CertificateProfile::new("aggregator", KeyUsage::Client, validity),
        },
    ];

    if policy.kiam {
        leaves.push(LeafSpec {
            name: "kiam-agent",
            profile: CertificateProfile::new("Kiam Agent", KeyUsage::Client, validity),
        });
        leaves.push(LeafSpec {
            name: "kiam-server",
            profile: CertificateProfile::new("Kiam Server", KeyUsage::ServerAndClient, validity)
                .with_dns_names(["kiam-server", "localhost"])
                .with_ip_addresses([localhost]),
        });
    }

    for leaf in &mut leaves {
        leaf.profile.key_size = params.key_size;
    }
    Ok(leaves)
}
