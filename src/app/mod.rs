mod manager;

pub use manager::{fingerprint_file, CredentialManager};
