// src/credential/table.rs
use super::types::{AssemblyPolicy, CredentialKind};

pub const CA_FILE: &str = "ca.pem";
pub const CA_KEY_FILE: &str = "ca-key.pem";
pub const AUTH_TOKENS: &str = "auth-tokens";
pub const TLS_BOOTSTRAP_TOKEN: &str = "tls-bootstrap-token";
pub const ENCRYPTION_CONFIG: &str = "encryption-config";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Independent,
    /// Content, fingerprint and encrypted cache come from the named entry
    /// whenever this entry's own file is absent or empty.
    AliasOf(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    None,
    /// Content used when the file is absent. A `<<<file` value reads that
    /// file from the same directory instead.
    Default(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Always,
    TlsBootstrap,
    Kiam,
}

impl Gate {
    pub fn allows(&self, policy: &AssemblyPolicy) -> bool {
        match self {
            Gate::Always => true,
            Gate::TlsBootstrap => policy.tls_bootstrap,
            Gate::Kiam => policy.kiam,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySpec {
    pub name: &'static str,
    pub file: &'static str,
    pub kind: CredentialKind,
    pub required: bool,
    pub fallback: Fallback,
    pub source: Source,
    pub encrypt_individually: bool,
    pub expiry_check: bool,
    pub enabled_if: Gate,
}

const fn certificate(name: &'static str, file: &'static str) -> EntrySpec {
    EntrySpec {
        name,
        file,
        kind: CredentialKind::Certificate,
        required: true,
        fallback: Fallback::None,
        source: Source::Independent,
        encrypt_individually: false,
        expiry_check: true,
        enabled_if: Gate::Always,
    }
}

const fn private_key(name: &'static str, file: &'static str) -> EntrySpec {
    EntrySpec {
        kind: CredentialKind::PrivateKey,
        encrypt_individually: true,
        expiry_check: false,
        ..certificate(name, file)
    }
}

const fn optional(name: &'static str, file: &'static str, kind: CredentialKind) -> EntrySpec {
    EntrySpec {
        kind,
        required: false,
        fallback: Fallback::Default(""),
        encrypt_individually: true,
        expiry_check: false,
        ..certificate(name, file)
    }
}

const fn aliased(entry: EntrySpec, target: &'static str) -> EntrySpec {
    EntrySpec {
        required: false,
        source: Source::AliasOf(target),
        ..entry
    }
}

const fn gated(entry: EntrySpec, gate: Gate) -> EntrySpec {
    EntrySpec {
        enabled_if: gate,
        ..entry
    }
}

/// Every credential rendered into node bootstrap data, in processing order.
/// Alias targets precede the entries aliasing them.
pub const ENTRIES: &[EntrySpec] = &[
    certificate("ca", CA_FILE),
    gated(private_key("ca-key", CA_KEY_FILE), Gate::TlsBootstrap),
    aliased(certificate("worker-ca", "worker-ca.pem"), "ca"),
    gated(
        aliased(private_key("worker-ca-key", "worker-ca-key.pem"), "ca-key"),
        Gate::TlsBootstrap,
    ),
    certificate("apiserver", "apiserver.pem"),
    private_key("apiserver-key", "apiserver-key.pem"),
    certificate("kube-controller-manager", "kube-controller-manager.pem"),
    private_key("kube-controller-manager-key", "kube-controller-manager-key.pem"),
    certificate("kube-scheduler", "kube-scheduler.pem"),
    private_key("kube-scheduler-key", "kube-scheduler-key.pem"),
    certificate("worker", "worker.pem"),
    private_key("worker-key", "worker-key.pem"),
    certificate("admin", "admin.pem"),
    private_key("admin-key", "admin-key.pem"),
    certificate("etcd", "etcd.pem"),
    private_key("etcd-key", "etcd-key.pem"),
    certificate("etcd-client", "etcd-client.pem"),
    private_key("etcd-client-key", "etcd-client-key.pem"),
    aliased(certificate("etcd-trusted-ca", "etcd-trusted-ca.pem"), "ca"),
    certificate("apiserver-aggregator", "apiserver-aggregator.pem"),
    private_key("apiserver-aggregator-key", "apiserver-aggregator-key.pem"),
    EntrySpec {
        required: false,
        fallback: Fallback::Default("<<<apiserver-key.pem"),
        ..private_key("service-account-key", "service-account-key.pem")
    },
    gated(aliased(certificate("kiam-ca", "kiam-ca.pem"), "ca"), Gate::Kiam),
    gated(certificate("kiam-agent", "kiam-agent.pem"), Gate::Kiam),
    gated(private_key("kiam-agent-key", "kiam-agent-key.pem"), Gate::Kiam),
    gated(certificate("kiam-server", "kiam-server.pem"), Gate::Kiam),
    gated(private_key("kiam-server-key", "kiam-server-key.pem"), Gate::Kiam),
    optional(AUTH_TOKENS, "tokens.csv", CredentialKind::OpaqueToken),
    optional(
        TLS_BOOTSTRAP_TOKEN,
        "kubelet-tls-bootstrap-token",
        CredentialKind::OpaqueToken,
    ),
    optional(
        ENCRYPTION_CONFIG,
        "encryption-config.yaml",
        CredentialKind::StructuredConfig,
    ),
];

pub fn lookup(name: &str) -> Option<&'static EntrySpec> {
    ENTRIES.iter().find(|entry| entry.name == name)
}

pub fn enabled(policy: &AssemblyPolicy) -> impl Iterator<Item = &'static EntrySpec> + '_ {
    ENTRIES.iter().filter(move |entry| entry.enabled_if.allows(policy))
}
