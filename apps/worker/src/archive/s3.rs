use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::info;

use super::{object_key, ArchiveError, Archiver};
use crate::config::ArchiveConfig;

/// Archives artifacts into an S3-compatible bucket (AWS or MinIO).
pub struct S3Archiver {
    client: Client,
    bucket: String,
    root_prefix: String,
    public_base_url: Option<String>,
}

impl S3Archiver {
    /// Constructs the S3 client for AWS, or for a custom endpoint (MinIO)
    /// with path-style addressing when one is configured.
    pub async fn from_config(config: &ArchiveConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "resume-worker-static",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint.is_some())
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            root_prefix: config.root_prefix.clone(),
            public_base_url: config.public_base_url.clone(),
        }
    }
}

#[async_trait]
impl Archiver for S3Archiver {
    async fn upload(&self, artifact: &Path, meta_code: &str) -> Result<String, ArchiveError> {
        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            return Err(ArchiveError::MissingArtifact(artifact.to_path_buf()));
        }
        let file_name = artifact
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ArchiveError::MissingArtifact(artifact.to_path_buf()))?;

        let key = object_key(&self.root_prefix, meta_code, &file_name);
        let body = tokio::fs::read(artifact).await?;

        // put_object overwrites: re-uploads keep the same key and reference.
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("application/pdf")
            .send()
            .await
            .map_err(|e| ArchiveError::Upload {
                target: format!("s3://{}/{}", self.bucket, key),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        info!("Uploaded {} to s3://{}/{}", artifact.display(), self.bucket, key);

        Ok(reference(&self.bucket, self.public_base_url.as_deref(), &key))
    }
}

/// Public URL when a base is configured, otherwise the `s3://` location.
fn reference(bucket: &str, public_base_url: Option<&str>, key: &str) -> String {
    match public_base_url {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
        None => format!("s3://{bucket}/{key}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ArchiveConfig {
        ArchiveConfig {
            bucket: "resumes".to_string(),
            endpoint: Some("http://127.0.0.1:9".to_string()),
            region: "us-east-1".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            public_base_url: None,
            root_prefix: "Resume".to_string(),
        }
    }

    #[test]
    fn test_reference_prefers_public_base_url() {
        assert_eq!(
            reference("resumes", Some("https://cdn.example.com/"), "Resume/BE/a.pdf"),
            "https://cdn.example.com/Resume/BE/a.pdf"
        );
        assert_eq!(
            reference("resumes", None, "Resume/BE/a.pdf"),
            "s3://resumes/Resume/BE/a.pdf"
        );
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_before_any_request() {
        let archiver = S3Archiver::from_config(&test_config()).await;
        let dir = tempfile::tempdir().unwrap();

        let err = archiver
            .upload(&dir.path().join("absent.pdf"), "BE")
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingArtifact(_)));
    }
}
