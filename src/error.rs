//! Error types for the stackdeploy system.
//!
//! This module provides the error hierarchy for every stage of a
//! deployment: configuration, request validation, provider API calls,
//! change-set computation, pre-flight reconciliation and template upload.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the stackdeploy system.
#[derive(Debug, Error)]
pub enum StackDeployError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Deploy request validation errors.
    #[error("Invalid deploy request: {0}")]
    Validation(#[from] ValidationError),

    /// Provider API errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Change-set lifecycle errors.
    #[error("Change set error: {0}")]
    ChangeSet(#[from] ChangeSetError),

    /// Pre-flight reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Template upload errors.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A stack selected on the command line is not in the configuration.
    #[error("Stack not found in configuration: {name}")]
    UnknownStack {
        /// The requested stack name.
        name: String,
    },
}

/// Errors raised before any network call for a malformed deploy request.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The group name is missing.
    #[error("missing stack name")]
    MissingStackName,

    /// No template source was supplied.
    #[error("one of template, template_file, template_body or use_previous_template is required for {stack}")]
    MissingTemplate {
        /// Stack being deployed.
        stack: String,
    },

    /// More than one template source was supplied.
    #[error("ambiguous template source for {stack}: {sources} were all given")]
    AmbiguousTemplate {
        /// Stack being deployed.
        stack: String,
        /// The conflicting sources.
        sources: String,
    },

    /// The template is too large to inline and no uploader is configured.
    #[error("template for {stack} is {size} bytes, over the {limit} byte inline limit; configure an upload bucket")]
    TemplateTooLarge {
        /// Stack being deployed.
        stack: String,
        /// Template size in bytes.
        size: usize,
        /// Provider inline limit in bytes.
        limit: usize,
    },

    /// The template could not be serialized.
    #[error("failed to serialize template for {stack}: {message}")]
    TemplateSerialization {
        /// Stack being deployed.
        stack: String,
        /// Serializer message.
        message: String,
    },

    /// Approval was requested but nothing can give it.
    #[error("approval requested for {stack} but no approver is configured")]
    MissingApprover {
        /// Stack being deployed.
        stack: String,
    },
}

/// Provider API errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The resource group does not exist.
    #[error("Stack with id {name} does not exist")]
    GroupNotFound {
        /// Name of the missing group.
        name: String,
    },

    /// The provider throttled the request.
    #[error("{operation} was throttled: {message}")]
    Throttled {
        /// Operation that was throttled.
        operation: String,
        /// Provider message.
        message: String,
    },

    /// Network or transport failure.
    #[error("Network error during {operation}: {message}")]
    NetworkError {
        /// Operation that failed.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// The provider rejected the request.
    #[error("{operation} failed: {message}")]
    ApiRequestFailed {
        /// Operation that failed.
        operation: String,
        /// Provider message.
        message: String,
    },

    /// The provider returned a response missing required data.
    #[error("Invalid response from {operation}: {message}")]
    InvalidResponse {
        /// Operation that returned the response.
        operation: String,
        /// Description of the response issue.
        message: String,
    },

    /// The group reached a status that ends a wait unsuccessfully.
    #[error("Stack {group} reached {status} while waiting for {target}")]
    WaitFailed {
        /// Group being waited on.
        group: String,
        /// The status that ended the wait.
        status: String,
        /// The wait target.
        target: String,
        /// Provider status reason, if any.
        reason: Option<String>,
    },

    /// The wall-clock bound of a wait was exceeded.
    #[error("Timed out waiting for {target} on stack {group}")]
    Timeout {
        /// Group being waited on.
        group: String,
        /// The wait target.
        target: String,
    },
}

/// Change-set lifecycle errors.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// The change set has not reached a terminal status yet.
    #[error("change set {name} is still being computed")]
    StillPending {
        /// Change-set identifier.
        name: String,
    },

    /// The provider failed to compute the change set.
    #[error("ChangeSet {name} failed to create: {reason}")]
    Failed {
        /// Change-set identifier.
        name: String,
        /// Raw provider reason.
        reason: String,
    },

    /// The change set entered a deletion-related status while being computed.
    #[error("unexpected {status} status for ChangeSet {name}")]
    UnexpectedDeletion {
        /// Change-set identifier.
        name: String,
        /// Status reported.
        status: String,
    },

    /// The change set reported a status with no defined transition.
    #[error("unexpected ChangeSet Status: {status} ({name}){}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    UnexpectedStatus {
        /// Change-set identifier.
        name: String,
        /// Status reported.
        status: String,
        /// Raw provider reason, if any.
        reason: Option<String>,
    },

    /// The retry budget ran out before the change set was computed.
    #[error("timed out waiting for changeset to be created - {group}")]
    Timeout {
        /// Group the change set belongs to.
        group: String,
    },

    /// The create call returned without an identifier.
    #[error("createChangeSet response for {group} is missing the change set id")]
    MissingId {
        /// Group the change set belongs to.
        group: String,
    },
}

/// Pre-flight reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The group failed to create and replacement was not requested.
    #[error("Stack {group} is in {status} state; enable replace_if_create_failed to delete and recreate it")]
    CreationFailed {
        /// Group name.
        group: String,
        /// Current status.
        status: String,
    },

    /// The operator declined deleting a failed group.
    #[error("Stack {group} already exists in {status} state, but you chose not to delete it")]
    ReplacementDeclined {
        /// Group name.
        group: String,
        /// Current status.
        status: String,
    },

    /// The group is in a status with no defined transition.
    #[error("Stack {group} is in {status} state, which cannot be deployed over")]
    UnexpectedStatus {
        /// Group name.
        group: String,
        /// Current status.
        status: String,
    },
}

/// Template upload errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The object store rejected a request.
    #[error("S3 {operation} error for s3://{bucket}/{key}: {message}")]
    S3Error {
        /// Operation that failed.
        operation: String,
        /// Target bucket.
        bucket: String,
        /// Target key.
        key: String,
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for stackdeploy operations.
pub type Result<T> = std::result::Result<T, StackDeployError>;

impl StackDeployError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is a transient provider failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError::Throttled { .. } | ProviderError::NetworkError { .. })
        )
    }

    /// Returns true if the change set is still being computed.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::ChangeSet(ChangeSetError::StillPending { .. }))
    }

    /// Returns true if the error reports a missing resource group.
    #[must_use]
    pub const fn is_group_not_found(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::GroupNotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ProviderError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
