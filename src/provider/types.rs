//! Provider data types.
//!
//! These types mirror what the declarative-infrastructure service reports
//! about stacks, change sets and stack events, reduced to the fields the
//! deployment state machine needs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::params::{ParameterSet, TagSet};

/// Resource type the provider uses for a stack's own event records.
pub const GROUP_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

/// Largest template body the provider accepts inline, in bytes.
pub const INLINE_TEMPLATE_LIMIT: usize = 51_200;

/// Stack status as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupStatus {
    /// `CREATE_IN_PROGRESS`
    CreateInProgress,
    /// `CREATE_FAILED`
    CreateFailed,
    /// `CREATE_COMPLETE`
    CreateComplete,
    /// `ROLLBACK_IN_PROGRESS`
    RollbackInProgress,
    /// `ROLLBACK_FAILED`
    RollbackFailed,
    /// `ROLLBACK_COMPLETE`
    RollbackComplete,
    /// `DELETE_IN_PROGRESS`
    DeleteInProgress,
    /// `DELETE_FAILED`
    DeleteFailed,
    /// `DELETE_COMPLETE`
    DeleteComplete,
    /// `UPDATE_IN_PROGRESS`
    UpdateInProgress,
    /// `UPDATE_COMPLETE_CLEANUP_IN_PROGRESS`
    UpdateCompleteCleanupInProgress,
    /// `UPDATE_COMPLETE`
    UpdateComplete,
    /// `UPDATE_FAILED`
    UpdateFailed,
    /// `UPDATE_ROLLBACK_IN_PROGRESS`
    UpdateRollbackInProgress,
    /// `UPDATE_ROLLBACK_FAILED`
    UpdateRollbackFailed,
    /// `UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS`
    UpdateRollbackCompleteCleanupInProgress,
    /// `UPDATE_ROLLBACK_COMPLETE`
    UpdateRollbackComplete,
    /// `REVIEW_IN_PROGRESS`: first change set created but never executed.
    ReviewInProgress,
    /// `IMPORT_IN_PROGRESS`
    ImportInProgress,
    /// `IMPORT_COMPLETE`
    ImportComplete,
    /// `IMPORT_ROLLBACK_IN_PROGRESS`
    ImportRollbackInProgress,
    /// `IMPORT_ROLLBACK_FAILED`
    ImportRollbackFailed,
    /// `IMPORT_ROLLBACK_COMPLETE`
    ImportRollbackComplete,
    /// Any status this crate does not know about.
    Unknown(String),
}

impl GroupStatus {
    /// Parses a provider status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_FAILED" => Self::CreateFailed,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "ROLLBACK_IN_PROGRESS" => Self::RollbackInProgress,
            "ROLLBACK_FAILED" => Self::RollbackFailed,
            "ROLLBACK_COMPLETE" => Self::RollbackComplete,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_FAILED" => Self::DeleteFailed,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => Self::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => Self::UpdateComplete,
            "UPDATE_FAILED" => Self::UpdateFailed,
            "UPDATE_ROLLBACK_IN_PROGRESS" => Self::UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_FAILED" => Self::UpdateRollbackFailed,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                Self::UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => Self::UpdateRollbackComplete,
            "REVIEW_IN_PROGRESS" => Self::ReviewInProgress,
            "IMPORT_IN_PROGRESS" => Self::ImportInProgress,
            "IMPORT_COMPLETE" => Self::ImportComplete,
            "IMPORT_ROLLBACK_IN_PROGRESS" => Self::ImportRollbackInProgress,
            "IMPORT_ROLLBACK_FAILED" => Self::ImportRollbackFailed,
            "IMPORT_ROLLBACK_COMPLETE" => Self::ImportRollbackComplete,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the provider spelling of this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateFailed => "CREATE_FAILED",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            Self::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::ReviewInProgress => "REVIEW_IN_PROGRESS",
            Self::ImportInProgress => "IMPORT_IN_PROGRESS",
            Self::ImportComplete => "IMPORT_COMPLETE",
            Self::ImportRollbackInProgress => "IMPORT_ROLLBACK_IN_PROGRESS",
            Self::ImportRollbackFailed => "IMPORT_ROLLBACK_FAILED",
            Self::ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE",
            Self::Unknown(status) => status,
        }
    }

    /// Returns true for any `*_IN_PROGRESS` status.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.as_str().ends_with("_IN_PROGRESS")
    }

    /// Returns true when the stack exists only because its first change set
    /// was created and never executed.
    #[must_use]
    pub const fn is_review_pending(&self) -> bool {
        matches!(self, Self::ReviewInProgress)
    }

    /// Returns true when the stack never finished creating and must be
    /// deleted before it can be deployed again.
    #[must_use]
    pub const fn is_creation_failed(&self) -> bool {
        matches!(
            self,
            Self::CreateFailed
                | Self::RollbackFailed
                | Self::RollbackComplete
                | Self::RollbackInProgress
        )
    }

    /// Returns true for resting statuses a change set can be applied on top of.
    #[must_use]
    pub const fn is_stable(&self) -> bool {
        matches!(
            self,
            Self::CreateComplete
                | Self::UpdateComplete
                | Self::UpdateRollbackComplete
                | Self::ImportComplete
                | Self::ImportRollbackComplete
        )
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single stack output as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputEntry {
    /// Output key.
    pub key: Option<String>,
    /// Output value.
    pub value: Option<String>,
}

/// Description of an existing stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    /// Provider-assigned stack id.
    pub id: Option<String>,
    /// Stack name.
    pub name: String,
    /// Current status.
    pub status: GroupStatus,
    /// Reason attached to the current status.
    pub status_reason: Option<String>,
    /// Outputs (populated after a successful apply).
    pub outputs: Vec<OutputEntry>,
}

/// Whether a change set creates a new stack or updates an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeSetKind {
    /// The stack does not usably exist yet.
    Create,
    /// The stack exists in a stable status.
    Update,
}

impl ChangeSetKind {
    /// Returns the provider spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
        }
    }

    /// Returns the wait target that marks this kind of change set applied.
    #[must_use]
    pub const fn completion_target(self) -> WaitTarget {
        match self {
            Self::Create => WaitTarget::CreateComplete,
            Self::Update => WaitTarget::UpdateComplete,
        }
    }
}

impl fmt::Display for ChangeSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change-set computation status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSetStatus {
    /// `CREATE_PENDING`
    CreatePending,
    /// `CREATE_IN_PROGRESS`
    CreateInProgress,
    /// `CREATE_COMPLETE`
    CreateComplete,
    /// `DELETE_PENDING`
    DeletePending,
    /// `DELETE_IN_PROGRESS`
    DeleteInProgress,
    /// `DELETE_COMPLETE`
    DeleteComplete,
    /// `DELETE_FAILED`
    DeleteFailed,
    /// `FAILED`
    Failed,
    /// Any status this crate does not know about.
    Unknown(String),
}

impl ChangeSetStatus {
    /// Parses a provider status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "CREATE_PENDING" => Self::CreatePending,
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "DELETE_PENDING" => Self::DeletePending,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            "DELETE_FAILED" => Self::DeleteFailed,
            "FAILED" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the provider spelling of this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreatePending => "CREATE_PENDING",
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::DeletePending => "DELETE_PENDING",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::Failed => "FAILED",
            Self::Unknown(status) => status,
        }
    }
}

impl fmt::Display for ChangeSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a change-set listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetSummary {
    /// Provider-assigned change-set id.
    pub id: String,
    /// Change-set name.
    pub name: Option<String>,
    /// Computation status.
    pub status: ChangeSetStatus,
    /// Reason attached to the status.
    pub status_reason: Option<String>,
}

/// Attribute-level detail of a resource change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeDetail {
    /// Changed attribute (`Properties`, `Tags`, ...).
    pub attribute: Option<String>,
    /// Property name, for property changes.
    pub name: Option<String>,
    /// `Never`, `Conditionally` or `Always`.
    pub requires_recreation: Option<String>,
}

/// Per-resource entry of a computed change set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceChange {
    /// `Add`, `Modify`, `Remove`, ...
    pub action: Option<String>,
    /// Logical id in the template.
    pub logical_id: Option<String>,
    /// Physical id of the existing resource.
    pub physical_id: Option<String>,
    /// Resource type.
    pub resource_type: Option<String>,
    /// `True`, `False` or `Conditional`.
    pub replacement: Option<String>,
    /// Attribute-level details.
    pub details: Vec<ChangeDetail>,
}

/// A timestamped status transition of one resource in a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    /// Stack id.
    pub group_id: String,
    /// Stack name.
    pub group_name: String,
    /// Event id.
    pub event_id: String,
    /// Logical resource id.
    pub logical_id: String,
    /// Physical resource id.
    pub physical_id: Option<String>,
    /// Resource type.
    pub resource_type: Option<String>,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
    /// Resource status.
    pub status: String,
    /// Human-readable reason.
    pub reason: Option<String>,
    /// Serialized resource properties.
    pub properties: Option<String>,
}

impl StatusEvent {
    /// Returns true if this event is the stack's own record rather than
    /// one of its resources.
    #[must_use]
    pub fn is_group_event(&self) -> bool {
        self.resource_type.as_deref() == Some(GROUP_RESOURCE_TYPE)
            && self.logical_id == self.group_name
            && self.physical_id.as_deref() == Some(self.group_id.as_str())
    }

    /// Returns true if the status is transient.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status.contains("IN_PROGRESS")
    }
}

/// One page of stack events, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPage {
    /// Events on this page, newest first.
    pub events: Vec<StatusEvent>,
    /// Token for the next (older) page.
    pub next_token: Option<String>,
}

/// How the template reaches the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    /// Inline template body.
    Body(String),
    /// Location of an uploaded template.
    Url(String),
    /// Reuse the template currently applied to the stack.
    UsePrevious,
}

/// Arguments of the provider's create-change-set call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChangeSetRequest {
    /// Generated change-set name.
    pub change_set_name: String,
    /// Target stack.
    pub group_name: String,
    /// Create or update.
    pub kind: ChangeSetKind,
    /// Template reference.
    pub template: TemplateRef,
    /// Filtered parameters.
    pub parameters: ParameterSet,
    /// Acknowledged capabilities.
    pub capabilities: Vec<String>,
    /// Service role the provider assumes.
    pub role_arn: Option<String>,
    /// Notification topics.
    pub notification_arns: Vec<String>,
    /// Stack tags.
    pub tags: TagSet,
    /// Change-set description.
    pub description: String,
}

/// Terminal condition a stack wait is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitTarget {
    /// `CREATE_COMPLETE`
    CreateComplete,
    /// `UPDATE_COMPLETE`
    UpdateComplete,
    /// `UPDATE_ROLLBACK_COMPLETE`, or `ROLLBACK_COMPLETE` after a failed create
    RollbackComplete,
    /// `DELETE_COMPLETE` (or the stack disappearing)
    DeleteComplete,
    /// `IMPORT_COMPLETE`
    ImportComplete,
    /// `IMPORT_ROLLBACK_COMPLETE`
    ImportRollbackComplete,
}

/// Result of checking a status against a wait target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The target status was reached.
    Reached,
    /// The stack reached a status the target can no longer follow.
    Failed,
    /// Keep waiting.
    Pending,
}

impl WaitTarget {
    /// Returns the wait target for an in-flight operation, or `None` for
    /// statuses that are not in progress (and for `REVIEW_IN_PROGRESS`,
    /// which is not an operation).
    #[must_use]
    pub const fn for_in_progress(status: &GroupStatus) -> Option<Self> {
        match status {
            GroupStatus::CreateInProgress => Some(Self::CreateComplete),
            GroupStatus::RollbackInProgress
            | GroupStatus::UpdateRollbackInProgress
            | GroupStatus::UpdateRollbackCompleteCleanupInProgress => Some(Self::RollbackComplete),
            GroupStatus::UpdateInProgress | GroupStatus::UpdateCompleteCleanupInProgress => {
                Some(Self::UpdateComplete)
            }
            GroupStatus::DeleteInProgress => Some(Self::DeleteComplete),
            GroupStatus::ImportInProgress => Some(Self::ImportComplete),
            GroupStatus::ImportRollbackInProgress => Some(Self::ImportRollbackComplete),
            _ => None,
        }
    }

    /// Checks a stack status against this target.
    #[must_use]
    pub const fn outcome(self, status: &GroupStatus) -> WaitOutcome {
        use GroupStatus as S;

        match (self, status) {
            (Self::CreateComplete, S::CreateComplete)
            | (Self::UpdateComplete, S::UpdateComplete)
            | (Self::RollbackComplete, S::UpdateRollbackComplete | S::RollbackComplete)
            | (Self::DeleteComplete, S::DeleteComplete)
            | (Self::ImportComplete, S::ImportComplete)
            | (Self::ImportRollbackComplete, S::ImportRollbackComplete) => WaitOutcome::Reached,

            (
                Self::CreateComplete,
                S::CreateFailed
                | S::DeleteComplete
                | S::DeleteFailed
                | S::RollbackFailed
                | S::RollbackComplete,
            )
            | (
                Self::UpdateComplete,
                S::UpdateFailed | S::UpdateRollbackFailed | S::UpdateRollbackComplete,
            )
            | (
                Self::RollbackComplete,
                S::UpdateFailed | S::UpdateRollbackFailed | S::RollbackFailed | S::DeleteFailed,
            )
            | (Self::DeleteComplete, S::DeleteFailed)
            | (
                Self::ImportComplete,
                S::ImportRollbackInProgress | S::ImportRollbackFailed | S::ImportRollbackComplete,
            )
            | (Self::ImportRollbackComplete, S::ImportRollbackFailed) => WaitOutcome::Failed,

            _ => WaitOutcome::Pending,
        }
    }

    /// Returns the status name this target waits for.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::RollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::ImportComplete => "IMPORT_COMPLETE",
            Self::ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE",
        }
    }
}

impl fmt::Display for WaitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_provider_spelling() {
        for raw in ["UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS", "REVIEW_IN_PROGRESS"] {
            assert_eq!(GroupStatus::parse(raw).as_str(), raw);
        }
        assert_eq!(
            GroupStatus::parse("SOMETHING_NEW"),
            GroupStatus::Unknown(String::from("SOMETHING_NEW"))
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(GroupStatus::RollbackInProgress.is_creation_failed());
        assert!(GroupStatus::RollbackInProgress.is_in_progress());
        assert!(GroupStatus::ReviewInProgress.is_review_pending());
        assert!(GroupStatus::UpdateRollbackComplete.is_stable());
        assert!(!GroupStatus::RollbackComplete.is_stable());
    }

    #[test]
    fn test_in_progress_wait_targets() {
        assert_eq!(
            WaitTarget::for_in_progress(&GroupStatus::CreateInProgress),
            Some(WaitTarget::CreateComplete)
        );
        assert_eq!(
            WaitTarget::for_in_progress(&GroupStatus::UpdateRollbackInProgress),
            Some(WaitTarget::RollbackComplete)
        );
        assert_eq!(
            WaitTarget::for_in_progress(&GroupStatus::UpdateCompleteCleanupInProgress),
            Some(WaitTarget::UpdateComplete)
        );
        assert_eq!(WaitTarget::for_in_progress(&GroupStatus::ReviewInProgress), None);
    }

    #[test]
    fn test_wait_outcomes() {
        let target = WaitTarget::UpdateComplete;
        assert_eq!(target.outcome(&GroupStatus::UpdateComplete), WaitOutcome::Reached);
        assert_eq!(
            target.outcome(&GroupStatus::UpdateRollbackComplete),
            WaitOutcome::Failed
        );
        assert_eq!(target.outcome(&GroupStatus::UpdateInProgress), WaitOutcome::Pending);
    }
}
