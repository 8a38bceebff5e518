// src/credential/encryption_config.rs
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::store::write_private;
use crate::error::{CredentialError, Result};

pub const SECRET_KEY_LENGTH: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct EncryptionConfig {
    kind: String,
    #[serde(rename = "apiVersion")]
    api_version: String,
    resources: Vec<ResourceConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceConfig {
    resources: Vec<String>,
    providers: Vec<Provider>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Provider {
    #[serde(skip_serializing_if = "Option::is_none")]
    aescbc: Option<AesCbcConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<IdentityConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AesCbcConfig {
    keys: Vec<Key>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Key {
    name: String,
    secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityConfig {}

/// Writes the API server's secrets-at-rest configuration: one `aescbc` key
/// followed by the `identity` provider for reading unencrypted secrets.
pub struct EncryptionConfigGenerator {
    output_path: PathBuf,
}

impl EncryptionConfigGenerator {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    pub fn render(secret: &str) -> Result<String> {
        let config = EncryptionConfig {
            kind: "EncryptionConfig".to_string(),
            api_version: "v1".to_string(),
            resources: vec![ResourceConfig {
                resources: vec!["secrets".to_string()],
                providers: vec![
                    Provider {
                        aescbc: Some(AesCbcConfig {
                            keys: vec![Key {
                                name: "key1".to_string(),
                                secret: secret.to_string(),
                            }],
                        }),
                        identity: None,
                    },
                    Provider {
                        aescbc: None,
                        identity: Some(IdentityConfig {}),
                    },
                ],
            }],
        };

        serde_yaml::to_string(&config).map_err(|e| CredentialError::Issuance(e.to_string()))
    }

    pub fn generate_config(&self) -> Result<()> {
        let secret = generate_secret_key()?;
        write_private(&self.output_path, Self::render(&secret)?.as_bytes())
    }
}

fn generate_secret_key() -> Result<String> {
    let mut key = [0u8; SECRET_KEY_LENGTH];
    openssl::rand::rand_bytes(&mut key)
        .map_err(|e| CredentialError::issuance("generating encryption key", e))?;
    Ok(general_purpose::STANDARD.encode(key))
}
