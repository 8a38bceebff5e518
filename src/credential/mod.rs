// src/credential/mod.rs
pub mod assembler;
pub mod bundle;
pub mod compact;
pub mod encryption_config;
pub mod encryptor;
pub mod store;
pub mod table;
pub mod tokens;
pub mod types;

pub use assembler::CredentialAssembler;
pub use bundle::CredentialBundle;
pub use store::RawCredentialStore;
pub use types::{AssemblyPolicy, CredentialKind};
