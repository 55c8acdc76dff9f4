//! Template uploader trait and content addressing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Extension used for uploaded templates.
pub const TEMPLATE_EXTENSION: &str = "template";

/// Per-call upload options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Object metadata attached to the upload.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Upload even if an object with the same content already exists.
    #[serde(default)]
    pub force_upload: bool,
}

/// Content-addressed upload side-channel for large templates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateUploader: Send + Sync {
    /// Uploads `body` under a key derived from its content and returns a
    /// location the provider can read the template from.
    async fn upload_content_addressed(
        &self,
        body: &[u8],
        extension: &str,
        options: &UploadOptions,
    ) -> Result<String>;
}

/// Returns the object key for `body`: `<prefix>/<sha256>.<extension>`.
#[must_use]
pub fn content_key(prefix: &str, body: &[u8], extension: &str) -> String {
    let digest = hex::encode(Sha256::digest(body));
    let prefix = prefix.trim_matches('/');

    let mut key = if prefix.is_empty() {
        digest
    } else {
        format!("{prefix}/{digest}")
    };
    if !extension.is_empty() {
        key.push('.');
        key.push_str(extension);
    }
    key
}
