//! Template upload side-channel.
//!
//! Templates too large to pass inline are uploaded to object storage and
//! referenced by URL.

mod s3;
mod uploader;

pub use s3::{S3Location, S3TemplateUploader};
#[cfg(test)]
pub(crate) use uploader::MockTemplateUploader;
pub use uploader::{content_key, TemplateUploader, UploadOptions, TEMPLATE_EXTENSION};
