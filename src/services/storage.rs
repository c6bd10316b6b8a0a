use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};

use crate::core::config::Settings;

/// Thin S3 wrapper for result transcripts. Built only when credentials and
/// a bucket are configured; callers treat `None` as uploads disabled.
#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        let s3 = settings.s3();
        if !s3.is_configured() {
            return Ok(None);
        }

        let credentials = Credentials::new(
            s3.access_key.clone(),
            s3.secret_key.clone(),
            None,
            None,
            "examhall-static",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(s3.region.clone()))
            .credentials_provider(credentials);

        // MinIO-style deployments point S3_ENDPOINT at their own gateway.
        if !s3.endpoint.is_empty() {
            loader = loader.endpoint_url(s3.endpoint.clone());
        }

        let client = Client::new(&loader.load().await);
        Ok(Some(Self { client, bucket: s3.bucket.clone() }))
    }

    /// Returns the stored size and SHA-256 hex digest.
    pub(crate) async fn upload_bytes(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<(i64, String)> {
        let size = bytes.len() as i64;
        let digest = hex::encode(Sha256::digest(&bytes));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await?;

        Ok((size, digest))
    }
}

#[cfg(test)]
mod tests {
    use super::StorageService;
    use crate::core::config::Settings;
    use crate::test_support;

    #[tokio::test]
    async fn disabled_without_credentials() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let storage = StorageService::from_settings(&settings).await.expect("storage");
        assert!(storage.is_none());
    }

    #[tokio::test]
    async fn enabled_with_credentials() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        test_support::set_test_storage_env();

        let settings = Settings::load().expect("settings");
        let storage = StorageService::from_settings(&settings).await.expect("storage");
        assert!(storage.is_some());
    }
}
