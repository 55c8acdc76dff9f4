//! S3-based template uploader.
//!
//! Templates are stored under a content-derived key so repeated deploys of
//! an unchanged template reuse the existing object.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use tracing::{debug, info};

use super::uploader::{content_key, TemplateUploader, UploadOptions};
use crate::error::{Result, StackDeployError, UploadError};

/// Region assumed when the SDK configuration carries none.
const DEFAULT_REGION: &str = "us-east-1";

/// Uploaded object location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Object version, when the bucket is versioned.
    pub version_id: Option<String>,
}

impl S3Location {
    /// Returns the path-style HTTPS URL for this object in `region`.
    #[must_use]
    pub fn path_style_url(&self, region: &str) -> String {
        let base = format!("https://s3.{region}.amazonaws.com/{}/{}", self.bucket, self.key);
        match &self.version_id {
            Some(version) => format!("{base}?versionId={version}"),
            None => base,
        }
    }
}

/// S3 template uploader.
#[derive(Debug, Clone)]
pub struct S3TemplateUploader {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix.
    prefix: String,
    /// KMS key for server-side encryption (AES256 when absent).
    kms_key_id: Option<String>,
    /// Region used to build object URLs.
    region: String,
}

impl S3TemplateUploader {
    /// Creates a new uploader from the environment's AWS configuration.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Self {
        let config = crate::provider::load_sdk_config(region).await;
        Self::with_client(Client::new(&config), bucket, prefix)
    }

    /// Creates an uploader with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        let region = client
            .config()
            .region()
            .map_or_else(|| DEFAULT_REGION.to_string(), ToString::to_string);

        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.unwrap_or_default().trim_matches('/').to_string(),
            kms_key_id: None,
            region,
        }
    }

    /// Encrypts uploads with the given KMS key instead of AES256.
    #[must_use]
    pub fn with_kms_key(mut self, kms_key_id: Option<String>) -> Self {
        self.kms_key_id = kms_key_id;
        self
    }

    fn s3_error(&self, operation: &str, key: &str, message: String) -> StackDeployError {
        StackDeployError::Upload(UploadError::S3Error {
            operation: operation.to_string(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            message,
        })
    }

    /// Returns the existing object's location, if there is one.
    async fn head(&self, key: &str) -> Result<Option<S3Location>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(S3Location {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                version_id: output.version_id().map(ToString::to_string),
            })),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(self.s3_error("head", key, service_err.to_string()))
                }
            }
        }
    }

    /// Puts an object to S3.
    async fn put(&self, key: &str, body: &[u8], options: &UploadOptions) -> Result<S3Location> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body.to_vec()));

        request = match &self.kms_key_id {
            Some(kms_key_id) => request
                .server_side_encryption(ServerSideEncryption::AwsKms)
                .ssekms_key_id(kms_key_id),
            None => request.server_side_encryption(ServerSideEncryption::Aes256),
        };

        if !options.metadata.is_empty() {
            let metadata: HashMap<String, String> = options
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            request = request.set_metadata(Some(metadata));
        }

        let output = request
            .send()
            .await
            .map_err(|e| self.s3_error("put", key, e.to_string()))?;

        Ok(S3Location {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            version_id: output.version_id().map(ToString::to_string),
        })
    }
}

#[async_trait]
impl TemplateUploader for S3TemplateUploader {
    async fn upload_content_addressed(
        &self,
        body: &[u8],
        extension: &str,
        options: &UploadOptions,
    ) -> Result<String> {
        let key = content_key(&self.prefix, body, extension);

        if !options.force_upload {
            if let Some(existing) = self.head(&key).await? {
                info!(
                    "File with same data already exists at s3://{}/{key}, skipping upload",
                    self.bucket
                );
                return Ok(existing.path_style_url(&self.region));
            }
        }

        debug!("Uploading {} bytes to s3://{}/{key}", body.len(), self.bucket);
        let location = self.put(&key, body, options).await?;
        info!("Uploaded template to s3://{}/{key}", self.bucket);

        Ok(location.path_style_url(&self.region))
    }
}
