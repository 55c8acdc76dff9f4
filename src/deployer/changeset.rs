//! Change-set lifecycle.
//!
//! [`ChangeSetCoordinator`] drives one change set from creation to either
//! execution or deletion. A change set is never left behind in a
//! created-but-not-acted-upon state: the provider does not expire them.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::error::{ChangeSetError, Result, StackDeployError, ValidationError};
use crate::params::{ParameterSet, TagSet};
use crate::provider::{
    ChangeSetKind, ChangeSetStatus, ChangeSetSummary, CreateChangeSetRequest, GroupStatus,
    ResourceChange, ResourceGroupClient, TemplateRef, INLINE_TEMPLATE_LIMIT,
};
use crate::retry::RetryPolicy;
use crate::upload::{TemplateUploader, UploadOptions, TEMPLATE_EXTENSION};

/// Lowercased status-reason prefixes meaning "computed, but nothing to do".
///
/// The provider has reported both phrasings over time; both are treated as
/// a no-op change set and the matched reason is returned to the caller.
pub const NO_CHANGES_REASON_PREFIXES: &[&str] = &[
    "no updates are to be performed",
    "the submitted information didn't contain changes",
];

/// Default change-set name prefix.
pub const DEFAULT_CHANGE_SET_PREFIX: &str = "stackdeploy-";

/// Default change-set poll budget: 20 polls, 2 seconds apart.
pub const DEFAULT_CHANGE_SET_POLL: RetryPolicy = RetryPolicy::fixed(20, Duration::from_secs(2));

/// Returns true if a change-set failure reason means there was nothing to change.
#[must_use]
pub fn is_no_changes_reason(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    NO_CHANGES_REASON_PREFIXES
        .iter()
        .any(|prefix| reason.starts_with(prefix))
}

/// What to submit as a change set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSetInput {
    /// Target stack.
    pub group_name: String,
    /// Inline template body.
    pub template_body: Option<String>,
    /// Reuse the template currently applied to the stack.
    pub use_previous_template: bool,
    /// Normalized parameters.
    pub parameters: ParameterSet,
    /// Acknowledged capabilities.
    pub capabilities: Vec<String>,
    /// Service role.
    pub role_arn: Option<String>,
    /// Notification topics.
    pub notification_arns: Vec<String>,
    /// Normalized tags.
    pub tags: TagSet,
}

/// A submitted change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedChangeSet {
    /// Provider-assigned id.
    pub id: String,
    /// Generated name.
    pub name: String,
    /// Create or update.
    pub kind: ChangeSetKind,
}

/// Terminal result of change-set computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedChangeSet {
    /// Whether applying the change set would change anything.
    pub has_changes: bool,
    /// Provider reason, e.g. the matched "no changes" phrase.
    pub status_reason: Option<String>,
}

/// Result of [`ChangeSetCoordinator::create_and_wait_for_change_set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetOutcome {
    /// Provider-assigned id.
    pub id: String,
    /// Generated name.
    pub name: String,
    /// Create or update.
    pub kind: ChangeSetKind,
    /// Whether applying the change set would change anything.
    pub has_changes: bool,
    /// Provider reason attached to the computed status.
    pub status_reason: Option<String>,
}

/// Drives the create/poll/execute/cleanup protocol for one stack.
pub struct ChangeSetCoordinator<'a> {
    /// Provider client.
    client: &'a dyn ResourceGroupClient,
    /// Optional upload side-channel.
    uploader: Option<&'a dyn TemplateUploader>,
    /// Options passed to every upload.
    upload_options: UploadOptions,
    /// Change-set name prefix.
    prefix: String,
    /// Computation poll budget.
    poll_policy: RetryPolicy,
}

impl<'a> ChangeSetCoordinator<'a> {
    /// Creates a coordinator with default settings and no uploader.
    #[must_use]
    pub fn new(client: &'a dyn ResourceGroupClient) -> Self {
        Self {
            client,
            uploader: None,
            upload_options: UploadOptions::default(),
            prefix: DEFAULT_CHANGE_SET_PREFIX.to_string(),
            poll_policy: DEFAULT_CHANGE_SET_POLL,
        }
    }

    /// Uploads templates through `uploader` instead of inlining them.
    #[must_use]
    pub fn with_uploader(
        mut self,
        uploader: Option<&'a dyn TemplateUploader>,
        options: UploadOptions,
    ) -> Self {
        self.uploader = uploader;
        self.upload_options = options;
        self
    }

    /// Sets the change-set name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the computation poll budget.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: RetryPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Returns true if the stack exists in a state that accepts updates.
    ///
    /// A stack in `REVIEW_IN_PROGRESS` exists only because a first change set
    /// was created and never executed; it cannot be updated, so it counts as
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns provider errors other than "does not exist".
    pub async fn determine_existence(&self, group: &str) -> Result<bool> {
        match self.client.describe_group(group).await {
            Ok(Some(description)) => Ok(!description.status.is_review_pending()
                && description.status != GroupStatus::DeleteComplete),
            Ok(None) => Ok(false),
            Err(err) if err.is_group_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Checks that exactly one template source was given.
    fn validate_template_source(input: &ChangeSetInput) -> Result<()> {
        let stack = input.group_name.clone();
        match (&input.template_body, input.use_previous_template) {
            (Some(_), true) => Err(ValidationError::AmbiguousTemplate {
                stack,
                sources: String::from("template_body and use_previous_template"),
            }
            .into()),
            (None, false) => Err(ValidationError::MissingTemplate { stack }.into()),
            _ => Ok(()),
        }
    }

    /// Rejects a template too large to send inline when no uploader is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TemplateTooLarge`].
    pub fn check_template_size(&self, group: &str, body: Option<&str>) -> Result<()> {
        if let Some(body) = body
            && self.uploader.is_none()
            && body.len() > INLINE_TEMPLATE_LIMIT
        {
            return Err(ValidationError::TemplateTooLarge {
                stack: group.to_string(),
                size: body.len(),
                limit: INLINE_TEMPLATE_LIMIT,
            }
            .into());
        }
        Ok(())
    }

    /// Resolves how the template reaches the provider, uploading it when an
    /// uploader is configured.
    async fn template_ref(&self, input: &ChangeSetInput) -> Result<TemplateRef> {
        let Some(body) = &input.template_body else {
            return Ok(TemplateRef::UsePrevious);
        };

        match self.uploader {
            Some(uploader) => {
                let url = uploader
                    .upload_content_addressed(body.as_bytes(), TEMPLATE_EXTENSION, &self.upload_options)
                    .await?;
                debug!("Template for {} uploaded to {url}", input.group_name);
                Ok(TemplateRef::Url(url))
            }
            None => Ok(TemplateRef::Body(body.clone())),
        }
    }

    /// Submits a change set and returns immediately.
    ///
    /// The kind is CREATE when the stack does not usably exist and UPDATE
    /// otherwise. Previous-value parameter requests the provider would reject
    /// are dropped first.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed input (before any provider
    /// call), or any provider or upload error.
    pub async fn create_change_set(&self, input: &ChangeSetInput) -> Result<CreatedChangeSet> {
        let group = &input.group_name;
        if group.trim().is_empty() {
            return Err(ValidationError::MissingStackName.into());
        }
        self.check_template_size(group, input.template_body.as_deref())?;
        Self::validate_template_source(input)?;

        let (kind, parameters) = if self.determine_existence(group).await? {
            let declared = self.client.declared_parameter_names(group).await?;
            (
                ChangeSetKind::Update,
                input.parameters.clone().retain_known_previous(&declared),
            )
        } else {
            (
                ChangeSetKind::Create,
                input.parameters.clone().without_previous_values(),
            )
        };

        let template = self.template_ref(input).await?;
        let now = Utc::now();
        let name = format!("{}{}", self.prefix, now.timestamp_millis());

        let request = CreateChangeSetRequest {
            change_set_name: name.clone(),
            group_name: group.clone(),
            kind,
            template,
            parameters,
            capabilities: input.capabilities.clone(),
            role_arn: input.role_arn.clone(),
            notification_arns: input.notification_arns.clone(),
            tags: input.tags.clone(),
            description: format!(
                "Created at {} UTC",
                now.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
        };

        let id = self.client.create_change_set(&request).await?;
        if id.is_empty() {
            return Err(ChangeSetError::MissingId {
                group: group.clone(),
            }
            .into());
        }

        info!("Created {kind} change set {name} for {group}");
        Ok(CreatedChangeSet { id, name, kind })
    }

    /// Checks the change set once.
    ///
    /// A non-terminal status (or a change set not listed yet) is reported as
    /// [`ChangeSetError::StillPending`] so the retry policy polls again.
    async fn poll_change_set(&self, id: &str, group: &str) -> Result<ComputedChangeSet> {
        let summaries = self.client.list_change_sets(group).await?;
        let pending = || {
            StackDeployError::ChangeSet(ChangeSetError::StillPending {
                name: id.to_string(),
            })
        };

        let Some(ChangeSetSummary {
            status,
            status_reason,
            ..
        }) = summaries
            .into_iter()
            .find(|s| s.id == id || s.name.as_deref() == Some(id))
        else {
            return Err(pending());
        };

        match status {
            ChangeSetStatus::CreateComplete => Ok(ComputedChangeSet {
                has_changes: true,
                status_reason,
            }),
            ChangeSetStatus::CreatePending | ChangeSetStatus::CreateInProgress => Err(pending()),
            ChangeSetStatus::DeletePending
            | ChangeSetStatus::DeleteInProgress
            | ChangeSetStatus::DeleteComplete
            | ChangeSetStatus::DeleteFailed => Err(ChangeSetError::UnexpectedDeletion {
                name: id.to_string(),
                status: status.to_string(),
            }
            .into()),
            ChangeSetStatus::Failed => {
                let reason = status_reason.unwrap_or_default();
                if is_no_changes_reason(&reason) {
                    Ok(ComputedChangeSet {
                        has_changes: false,
                        status_reason: Some(reason),
                    })
                } else {
                    Err(ChangeSetError::Failed {
                        name: id.to_string(),
                        reason,
                    }
                    .into())
                }
            }
            ChangeSetStatus::Unknown(status) => Err(ChangeSetError::UnexpectedStatus {
                name: id.to_string(),
                status,
                reason: status_reason,
            }
            .into()),
        }
    }

    /// Polls until the change set has been computed.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeSetError::Failed`] with the provider reason for a
    /// failed computation, a protocol error for deletion or unknown
    /// statuses, and [`ChangeSetError::Timeout`] once the poll budget is
    /// spent.
    pub async fn wait_for_change_set_computed(
        &self,
        id: &str,
        group: &str,
    ) -> Result<ComputedChangeSet> {
        info!("Waiting for changeset to be created - {group}...");

        let result = self
            .poll_policy
            .run(
                || self.poll_change_set(id, group),
                |err| err.is_pending() || err.is_retryable(),
            )
            .await;

        match result {
            Err(err) if err.is_pending() => Err(ChangeSetError::Timeout {
                group: group.to_string(),
            }
            .into()),
            other => other,
        }
    }

    /// Returns the per-resource changes, for display before approval.
    ///
    /// # Errors
    ///
    /// Returns any provider error.
    pub async fn describe_change_set(&self, id: &str, group: &str) -> Result<Vec<ResourceChange>> {
        let changes = self.client.describe_change_set(id, group).await?;
        debug!("Change set for {group} has {} resource changes", changes.len());
        Ok(changes)
    }

    /// Starts applying the change set without waiting.
    ///
    /// # Errors
    ///
    /// Returns any provider error.
    pub async fn execute_change_set(&self, id: &str, group: &str) -> Result<()> {
        self.client.execute_change_set(id, group).await
    }

    /// Deletes the change set.
    ///
    /// # Errors
    ///
    /// Returns any provider error.
    pub async fn delete_change_set(&self, id: &str, group: &str) -> Result<()> {
        self.client.delete_change_set(id, group).await?;
        debug!("Deleted change set {id} of {group}");
        Ok(())
    }

    /// Waits for the stack to reach the completion status for `kind`.
    ///
    /// # Errors
    ///
    /// Returns the provider's wait error.
    pub async fn wait_for_execution_complete(&self, group: &str, kind: ChangeSetKind) -> Result<()> {
        info!("Waiting for stack create/update to complete - {group}...");
        self.client
            .wait_for_group_status(group, kind.completion_target())
            .await?;
        info!("Successfully created/updated stack - {group}");
        Ok(())
    }

    /// Creates a change set and waits for it to be computed.
    ///
    /// A change set with no changes is deleted before returning, and a
    /// change set whose computation fails is deleted on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::create_change_set`] or
    /// [`Self::wait_for_change_set_computed`].
    pub async fn create_and_wait_for_change_set(
        &self,
        input: &ChangeSetInput,
    ) -> Result<ChangeSetOutcome> {
        let group = &input.group_name;
        let created = self.create_change_set(input).await?;

        let computed = match self.wait_for_change_set_computed(&created.id, group).await {
            Ok(computed) => computed,
            Err(err) => {
                if let Err(cleanup) = self.delete_change_set(&created.id, group).await {
                    warn!("Failed to delete change set {} of {group}: {cleanup}", created.id);
                }
                return Err(err);
            }
        };

        if !computed.has_changes {
            info!(
                "No changes to deploy for {group}: {}",
                computed.status_reason.as_deref().unwrap_or_default()
            );
            self.delete_change_set(&created.id, group).await?;
        }

        Ok(ChangeSetOutcome {
            id: created.id,
            name: created.name,
            kind: created.kind,
            has_changes: computed.has_changes,
            status_reason: computed.status_reason,
        })
    }
}
