// src/kms/aws.rs
use aws_config::{retry::RetryConfig, BehaviorVersion, Region, SdkConfig};
use aws_sdk_kms::{error::DisplayErrorContext, primitives::Blob, Client};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use super::{EncryptionPort, KmsError};

/// AWS KMS behind the synchronous encryption port.
///
/// Throttling and transient service errors are retried by the SDK's standard
/// retry strategy, bounded by the configured number of attempts.
pub struct AwsKms {
    runtime: Runtime,
    client: Client,
}

impl AwsKms {
    pub fn new(region: impl Into<String>, max_attempts: u32) -> Result<Self, KmsError> {
        let runtime = current_thread_runtime()?;
        let config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.into()))
                .retry_config(RetryConfig::standard().with_max_attempts(max_attempts.max(1)))
                .load(),
        );
        Ok(Self::from_config(runtime, &config))
    }

    fn from_config(runtime: Runtime, config: &SdkConfig) -> Self {
        Self {
            runtime,
            client: Client::new(config),
        }
    }
}

impl EncryptionPort for AwsKms {
    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        debug!(key_id, bytes = plaintext.len(), "calling kms encrypt");
        let response = self
            .runtime
            .block_on(
                self.client
                    .encrypt()
                    .key_id(key_id)
                    .plaintext(Blob::new(plaintext))
                    .send(),
            )
            .map_err(|e| KmsError::Encrypt {
                key_id: key_id.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        match response.ciphertext_blob() {
            Some(blob) if !blob.as_ref().is_empty() => Ok(blob.as_ref().to_vec()),
            _ => Err(KmsError::Output("empty CiphertextBlob".to_string())),
        }
    }
}

fn current_thread_runtime() -> Result<Runtime, KmsError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(KmsError::Runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_kms::config::Credentials;

    const KEY_ID: &str = "arn:aws:kms:us-west-2:000000000000:key/test";

    #[test]
    fn test_retry_attempts_come_from_config() {
        let kms = AwsKms::new("us-west-2", 5).unwrap();
        assert_eq!(
            kms.client.config().retry_config().map(|r| r.max_attempts()),
            Some(5)
        );
        assert_eq!(
            kms.client.config().region().map(|r| r.as_ref()),
            Some("us-west-2")
        );
    }

    #[test]
    fn test_zero_attempts_still_calls_once() {
        let kms = AwsKms::new("us-west-2", 0).unwrap();
        assert_eq!(
            kms.client.config().retry_config().map(|r| r.max_attempts()),
            Some(1)
        );
    }

    #[test]
    fn test_unreachable_endpoint_is_an_encrypt_error() {
        let runtime = current_thread_runtime().unwrap();
        let config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new("us-west-2"))
                .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "static"))
                .endpoint_url("http://127.0.0.1:1")
                .retry_config(RetryConfig::disabled())
                .load(),
        );
        let kms = AwsKms::from_config(runtime, &config);

        match kms.encrypt(KEY_ID, b"secret").unwrap_err() {
            KmsError::Encrypt { key_id, message } => {
                assert_eq!(key_id, KEY_ID);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
