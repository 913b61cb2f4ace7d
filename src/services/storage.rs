use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::core::config::{S3Settings, Settings};

static RE_UNSAFE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9가-힣._-]").expect("unsafe name pattern"));

/// `uploads/{millis}_{name}` with every character outside the safe set replaced by `_`.
pub(crate) fn pdf_key(filename: &str, millis: i128) -> String {
    format!("uploads/{millis}_{}", RE_UNSAFE_NAME.replace_all(filename, "_"))
}

pub(crate) fn chart_image_key(question_id: &str, millis: i128, extension: &str) -> String {
    format!("charts/{question_id}_{millis}.{extension}")
}

/// S3-compatible storage: source PDFs in a private bucket, chart images in a public one.
#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    pdf_bucket: String,
    image_bucket: String,
    settings: S3Settings,
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        let s3 = settings.s3();
        if s3.access_key.is_empty() || s3.secret_key.is_empty() {
            return Ok(None);
        }

        let creds = Credentials::new(
            s3.access_key.clone(),
            s3.secret_key.clone(),
            None,
            None,
            "mock-exam-parser-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(s3.endpoint.clone())
            .region(aws_config::Region::new(s3.region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config).force_path_style(true).build();
        let client = Client::from_conf(s3_config);

        Ok(Some(Self {
            client,
            pdf_bucket: s3.pdf_bucket.clone(),
            image_bucket: s3.image_bucket.clone(),
            settings: s3.clone(),
        }))
    }

    pub(crate) async fn upload_pdf(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<(i64, String)> {
        self.put(&self.pdf_bucket, key, "application/pdf", bytes).await
    }

    pub(crate) async fn download_pdf(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let object = self.client.get_object().bucket(&self.pdf_bucket).key(key).send().await?;
        let body = object.body.collect().await?;
        Ok(body.into_bytes().to_vec())
    }

    pub(crate) async fn delete_pdf(&self, key: &str) -> anyhow::Result<()> {
        self.client.delete_object().bucket(&self.pdf_bucket).key(key).send().await?;
        Ok(())
    }

    pub(crate) async fn presign_pdf(&self, key: &str, expires_in: Duration) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.pdf_bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(expires_in)?)
            .await?;

        Ok(presigned.uri().to_string())
    }

    /// Overwrites any existing object under `key` and returns its public URL.
    pub(crate) async fn upload_image(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<String> {
        self.put(&self.image_bucket, key, content_type, bytes).await?;
        Ok(self.settings.image_public_url(key))
    }

    pub(crate) fn image_public_url(&self, key: &str) -> String {
        self.settings.image_public_url(key)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<(i64, String)> {
        let size = bytes.len() as i64;
        let hash_hex = hex::encode(Sha256::digest(&bytes));

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await?;

        tracing::debug!(bucket, key, size, sha256 = %hash_hex, "Stored object");
        Ok((size, hash_hex))
    }
}

#[cfg(test)]
mod tests {
    use super::{chart_image_key, pdf_key, StorageService};
    use crate::core::config::Settings;
    use crate::test_support;
    use std::time::Duration;

    #[test]
    fn pdf_key_replaces_unsafe_characters() {
        assert_eq!(
            pdf_key("고2 2024 (9월) 모의고사.pdf", 1700000000000),
            "uploads/1700000000000_고2_2024__9월__모의고사.pdf"
        );
        assert_eq!(pdf_key("a/b\\c.pdf", 1), "uploads/1_a_b_c.pdf");
    }

    #[test]
    fn chart_key_uses_question_id_and_extension() {
        assert_eq!(chart_image_key("q-1", 42, "png"), "charts/q-1_42.png");
    }

    #[tokio::test]
    async fn storage_is_disabled_without_credentials() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let storage = StorageService::from_settings(&settings).await.expect("storage");
        assert!(storage.is_none());
    }

    #[tokio::test]
    async fn presigned_pdf_url_names_the_key() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        test_support::set_test_storage_env();

        let settings = Settings::load().expect("settings");
        let storage = StorageService::from_settings(&settings)
            .await
            .expect("storage")
            .expect("storage enabled");

        let url = storage
            .presign_pdf("uploads/1_file.pdf", Duration::from_secs(300))
            .await
            .expect("presign");
        assert!(url.contains("mock-exam-pdfs"));
        assert!(url.contains("1_file.pdf"));
        assert_eq!(
            storage.image_public_url("charts/q_1.png"),
            "http://localhost:9000/mock-exam-images/charts/q_1.png"
        );
    }
}
