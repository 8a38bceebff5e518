// src/cert/issuer.rs
use chrono::{DateTime, Utc};
use openssl::{
    asn1::{Asn1Integer, Asn1Time},
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    rsa::Rsa,
    x509::{
        extension::{
            AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage as KeyUsageExt,
            SubjectAlternativeName, SubjectKeyIdentifier,
        },
        X509Name, X509NameBuilder, X509NameRef, X509,
    },
};
use tracing::debug;

use super::types::{CertificateProfile, KeyUsage};
use crate::error::{CredentialError, Result};

pub fn generate_private_key(key_size: u32) -> Result<PKey<Private>> {
    Rsa::generate(key_size)
        .and_then(PKey::from_rsa)
        .map_err(|e| CredentialError::issuance("failed to generate RSA key", e))
}

/// Issues a self-signed CA valid from now for `profile.validity`.
pub fn issue_ca(profile: &CertificateProfile) -> Result<(PKey<Private>, X509)> {
    check_validity(profile)?;
    debug!(common_name = %profile.common_name, "issuing CA certificate");

    let key = generate_private_key(profile.key_size)?;
    let name = build_name(&profile.common_name, &profile.organization)?;
    let now = Utc::now();
    let serial = BigNum::from_u32(0)
        .and_then(|bn| bn.to_asn1_integer())
        .map_err(|e| CredentialError::issuance("failed to encode CA serial", e))?;

    let cert = X509::builder()
        .and_then(|mut x509| {
            x509.set_version(2)?;
            x509.set_serial_number(&serial)?;
            x509.set_subject_name(&name)?;
            x509.set_issuer_name(&name)?;
            x509.set_pubkey(&key)?;
            x509.set_not_before(Asn1Time::from_unix(now.timestamp())?.as_ref())?;
            x509.set_not_after(
                Asn1Time::from_unix((now + profile.validity).timestamp())?.as_ref(),
            )?;
            x509.append_extension(BasicConstraints::new().critical().ca().build()?)?;
            x509.append_extension(
                KeyUsageExt::new()
                    .critical()
                    .key_encipherment()
                    .digital_signature()
                    .key_cert_sign()
                    .build()?,
            )?;
            let ski = SubjectKeyIdentifier::new().build(&x509.x509v3_context(None, None))?;
            x509.append_extension(ski)?;
            x509.sign(&key, MessageDigest::sha256())?;
            Ok(x509.build())
        })
        .map_err(|e| {
            CredentialError::issuance(&format!("failed to build CA {}", profile.common_name), e)
        })?;

    Ok((key, cert))
}

pub fn issue_server_cert(
    profile: &CertificateProfile,
    key: &PKey<Private>,
    ca_key: &PKey<Private>,
    ca_cert: &X509,
) -> Result<X509> {
    expect_usage(profile, &[KeyUsage::Server])?;
    issue_leaf(profile, key, ca_key, ca_cert)
}

pub fn issue_client_cert(
    profile: &CertificateProfile,
    key: &PKey<Private>,
    ca_key: &PKey<Private>,
    ca_cert: &X509,
) -> Result<X509> {
    expect_usage(profile, &[KeyUsage::Client, KeyUsage::ServerAndClient])?;
    issue_leaf(profile, key, ca_key, ca_cert)
}

/// Signs a leaf for `key` according to the profile's key usage.
pub fn issue_leaf(
    profile: &CertificateProfile,
    key: &PKey<Private>,
    ca_key: &PKey<Private>,
    ca_cert: &X509,
) -> Result<X509> {
    check_validity(profile)?;
    sign_leaf_until(profile, key, ca_key, ca_cert, Utc::now() + profile.validity)
}

pub(crate) fn sign_leaf_until(
    profile: &CertificateProfile,
    key: &PKey<Private>,
    ca_key: &PKey<Private>,
    ca_cert: &X509,
    not_after: DateTime<Utc>,
) -> Result<X509> {
    if profile.key_usage == KeyUsage::CA {
        return Err(CredentialError::Issuance(format!(
            "{}: CA profiles must be self-signed",
            profile.common_name
        )));
    }
    debug!(common_name = %profile.common_name, usage = ?profile.key_usage, "issuing certificate");

    // Server certificates carry the CA's organization, client certificates their own
    let organization = match profile.key_usage {
        KeyUsage::Server => organization_of(ca_cert.subject_name()),
        _ => profile.organization.clone(),
    };
    let subject = build_name(&profile.common_name, &organization)?;
    let serial = random_serial()?;

    X509::builder()
        .and_then(|mut x509| {
            x509.set_version(2)?;
            x509.set_serial_number(&serial)?;
            x509.set_subject_name(&subject)?;
            x509.set_issuer_name(ca_cert.subject_name())?;
            x509.set_pubkey(key)?;
            x509.set_not_before(ca_cert.not_before())?;
            x509.set_not_after(Asn1Time::from_unix(not_after.timestamp())?.as_ref())?;

            x509.append_extension(BasicConstraints::new().critical().build()?)?;
            x509.append_extension(
                KeyUsageExt::new()
                    .critical()
                    .key_encipherment()
                    .digital_signature()
                    .build()?,
            )?;
            let mut ext_usage = ExtendedKeyUsage::new();
            match profile.key_usage {
                KeyUsage::Server => ext_usage.server_auth(),
                KeyUsage::Client => ext_usage.client_auth(),
                _ => ext_usage.client_auth().server_auth(),
            };
            x509.append_extension(ext_usage.build()?)?;

            let ctx = x509.x509v3_context(Some(&**ca_cert), None);
            let ski = SubjectKeyIdentifier::new().build(&ctx)?;
            let aki = AuthorityKeyIdentifier::new().keyid(false).build(&ctx)?;
            let san = if profile.dns_names.is_empty() && profile.ip_addresses.is_empty() {
                None
            } else {
                let mut san = SubjectAlternativeName::new();
                for dns in &profile.dns_names {
                    san.dns(dns);
                }
                for ip in &profile.ip_addresses {
                    san.ip(&ip.to_string());
                }
                Some(san.build(&ctx)?)
            };
            x509.append_extension(ski)?;
            x509.append_extension(aki)?;
            if let Some(san) = san {
                x509.append_extension(san)?;
            }

            x509.sign(ca_key, MessageDigest::sha256())?;
            Ok(x509.build())
        })
        .map_err(|e| {
            CredentialError::issuance(
                &format!("failed to sign certificate for {}", profile.common_name),
                e,
            )
        })
}

/// Random positive serial below 2^63.
fn random_serial() -> Result<Asn1Integer> {
    let mut serial =
        BigNum::new().map_err(|e| CredentialError::issuance("failed to allocate serial", e))?;
    serial
        .rand(63, MsbOption::MAYBE_ZERO, false)
        .map_err(|e| CredentialError::issuance("failed to generate random serial", e))?;
    if serial.num_bits() == 0 {
        serial
            .add_word(1)
            .map_err(|e| CredentialError::issuance("failed to generate random serial", e))?;
    }
    serial
        .to_asn1_integer()
        .map_err(|e| CredentialError::issuance("failed to encode serial", e))
}

fn expect_usage(profile: &CertificateProfile, allowed: &[KeyUsage]) -> Result<()> {
    if !allowed.contains(&profile.key_usage) {
        return Err(CredentialError::Issuance(format!(
            "{}: unexpected key usage {:?}",
            profile.common_name, profile.key_usage
        )));
    }
    Ok(())
}

fn check_validity(profile: &CertificateProfile) -> Result<()> {
    if profile.validity <= chrono::Duration::zero() {
        return Err(CredentialError::Issuance(format!(
            "{}: validity must be positive, got {} seconds",
            profile.common_name,
            profile.validity.num_seconds()
        )));
    }
    Ok(())
}

fn build_name(common_name: &str, organization: &[String]) -> Result<X509Name> {
    X509NameBuilder::new()
        .and_then(|mut name| {
            for org in organization {
                name.append_entry_by_nid(Nid::ORGANIZATIONNAME, org)?;
            }
            name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
            Ok(name.build())
        })
        .map_err(|e| CredentialError::issuance("failed to build subject name", e))
}

fn organization_of(name: &X509NameRef) -> Vec<String> {
    name.entries_by_nid(Nid::ORGANIZATIONNAME)
        .map(|entry| entry.data().to_string())
        .collect()
}

pub fn key_to_pem(key: &PKey<Private>) -> Result<Vec<u8>> {
    key.rsa()
        .and_then(|rsa| rsa.private_key_to_pem())
        .map_err(|e| CredentialError::issuance("failed to serialize private key", e))
}

pub fn cert_to_pem(cert: &X509) -> Result<Vec<u8>> {
    cert.to_pem()
        .map_err(|e| CredentialError::issuance("failed to serialize certificate", e))
}
