// src/cert/mod.rs
pub mod ca;
pub mod issuer;
pub mod operations;
pub mod profiles;
pub mod types;
pub mod verification;

pub use operations::{CertificateOperations, ProvisionReport};
pub use verification::{CertificateVerifier, VerificationResult};
