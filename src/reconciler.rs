//! Pre-flight reconciliation of an existing stack.
//!
//! Before a change set is created the target stack has to be either absent
//! or stable. This module inspects the stack's current status and drives it
//! there: waiting out in-flight operations, replacing stacks whose creation
//! failed, and refreshing the stack policy on stable stacks.

use tracing::{debug, info};

use crate::error::{ReconcileError, Result, StackDeployError};
use crate::events::EventMonitor;
use crate::orchestrator::Approver;
use crate::provider::{GroupDescription, GroupStatus, ResourceGroupClient, WaitTarget};

/// Coarse state of a stack, as far as deploying over it is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupState {
    /// No stack by that name.
    Absent,
    /// The first change set was created but never executed.
    ReviewPending,
    /// Ready for an update.
    Stable(GroupStatus),
    /// Creation failed; the stack must be deleted before it can be created.
    CreationFailed(GroupStatus),
    /// Another operation is running.
    InProgress(GroupStatus),
    /// No defined way forward.
    Unrecoverable(GroupStatus),
}

impl GroupState {
    /// Classifies a described stack.
    #[must_use]
    pub fn classify(description: Option<&GroupDescription>) -> Self {
        let Some(description) = description else {
            return Self::Absent;
        };
        let status = description.status.clone();

        if status.is_review_pending() {
            Self::ReviewPending
        } else if status == GroupStatus::DeleteComplete {
            Self::Absent
        } else if status.is_creation_failed() {
            Self::CreationFailed(status)
        } else if status.is_stable() {
            Self::Stable(status)
        } else if status.is_in_progress() {
            Self::InProgress(status)
        } else {
            Self::Unrecoverable(status)
        }
    }

    /// Returns the stack status, if the stack exists.
    #[must_use]
    pub const fn status(&self) -> Option<&GroupStatus> {
        match self {
            Self::Absent | Self::ReviewPending => None,
            Self::Stable(status)
            | Self::CreationFailed(status)
            | Self::InProgress(status)
            | Self::Unrecoverable(status) => Some(status),
        }
    }
}

/// What reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// State found before reconciling.
    pub initial: GroupState,
    /// In-flight operation that was waited out.
    pub waited_for: Option<WaitTarget>,
    /// Whether a failed stack was deleted.
    pub replaced: bool,
    /// Whether the stack policy was applied.
    pub policy_applied: bool,
}

impl ReconcileReport {
    const fn new(initial: GroupState) -> Self {
        Self {
            initial,
            waited_for: None,
            replaced: false,
            policy_applied: false,
        }
    }
}

/// Drives a stack to absent or stable.
pub struct Reconciler<'a> {
    /// Provider client.
    client: &'a dyn ResourceGroupClient,
    /// Watches waits and deletions.
    monitor: &'a EventMonitor,
    /// Confirms replacement, when set.
    approver: Option<&'a dyn Approver>,
    /// Whether failed stacks may be deleted.
    replace_if_create_failed: bool,
    /// Stack policy to apply to stable stacks.
    protection_policy: Option<&'a str>,
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(client: &'a dyn ResourceGroupClient, monitor: &'a EventMonitor) -> Self {
        Self {
            client,
            monitor,
            approver: None,
            replace_if_create_failed: false,
            protection_policy: None,
        }
    }

    /// Sets the approver consulted before replacing a failed stack.
    #[must_use]
    pub const fn with_approver(mut self, approver: Option<&'a dyn Approver>) -> Self {
        self.approver = approver;
        self
    }

    /// Allows deleting stacks whose creation failed.
    #[must_use]
    pub const fn with_replacement(mut self, replace_if_create_failed: bool) -> Self {
        self.replace_if_create_failed = replace_if_create_failed;
        self
    }

    /// Sets the stack policy applied to stable stacks.
    #[must_use]
    pub const fn with_protection_policy(mut self, policy: Option<&'a str>) -> Self {
        self.protection_policy = policy;
        self
    }

    /// Reconciles `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack cannot be deployed over, if a wait or
    /// deletion fails, or if replacement was not allowed or was declined.
    pub async fn reconcile(&self, group: &str) -> Result<ReconcileReport> {
        let description = match self.client.describe_group(group).await {
            Ok(description) => description,
            Err(err) if err.is_group_not_found() => None,
            Err(err) => return Err(err),
        };

        let state = GroupState::classify(description.as_ref());
        debug!("Stack {group} classified as {state:?}");
        let mut report = ReconcileReport::new(state.clone());

        match state {
            GroupState::Absent | GroupState::ReviewPending => {}
            GroupState::Stable(_) => self.apply_policy(group, &mut report).await?,
            GroupState::CreationFailed(status) => {
                self.replace(group, &status, &mut report).await?;
            }
            GroupState::InProgress(status) => {
                let target = WaitTarget::for_in_progress(&status).ok_or_else(|| {
                    StackDeployError::Reconcile(ReconcileError::UnexpectedStatus {
                        group: group.to_string(),
                        status: status.to_string(),
                    })
                })?;
                self.wait(group, &status, target).await?;
                report.waited_for = Some(target);

                if target != WaitTarget::DeleteComplete {
                    self.apply_policy(group, &mut report).await?;
                }
            }
            GroupState::Unrecoverable(status) => {
                return Err(StackDeployError::Reconcile(ReconcileError::UnexpectedStatus {
                    group: group.to_string(),
                    status: status.to_string(),
                }));
            }
        }

        Ok(report)
    }

    /// Waits out an in-flight operation under the event monitor.
    async fn wait(&self, group: &str, status: &GroupStatus, target: WaitTarget) -> Result<()> {
        info!("Stack {group} is {status}, waiting for {target}");
        self.monitor
            .watch_during(group, self.client.wait_for_group_status(group, target))
            .await
    }

    /// Deletes a stack whose creation failed.
    async fn replace(
        &self,
        group: &str,
        status: &GroupStatus,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if !self.replace_if_create_failed {
            return Err(StackDeployError::Reconcile(ReconcileError::CreationFailed {
                group: group.to_string(),
                status: status.to_string(),
            }));
        }

        if let Some(approver) = self.approver
            && !approver.approve_replacement(group, status).await?
        {
            return Err(StackDeployError::Reconcile(ReconcileError::ReplacementDeclined {
                group: group.to_string(),
                status: status.to_string(),
            }));
        }

        if let Some(target) = WaitTarget::for_in_progress(status) {
            self.wait(group, status, target).await?;
            report.waited_for = Some(target);
        }

        info!("Deleting stack {group} ({status}) before creating it again");
        self.monitor
            .watch_during(group, async {
                self.client.delete_group(group).await?;
                self.client
                    .wait_for_group_status(group, WaitTarget::DeleteComplete)
                    .await
            })
            .await?;

        report.replaced = true;
        Ok(())
    }

    async fn apply_policy(&self, group: &str, report: &mut ReconcileReport) -> Result<()> {
        if let Some(policy) = self.protection_policy {
            debug!("Applying stack policy to {group}");
            self.client.set_protection_policy(group, policy).await?;
            report.policy_applied = true;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.initial.status() {
            Some(status) => write!(f, "found {status}")?,
            None => write!(f, "found no usable stack")?,
        }
        if let Some(target) = self.waited_for {
            write!(f, ", waited for {target}")?;
        }
        if self.replaced {
            write!(f, ", deleted it")?;
        }
        if self.policy_applied {
            write!(f, ", applied stack policy")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::events::{EventWatcher, NullSink, WatchSettings};
    use crate::orchestrator::MockApprover;
    use crate::provider::fake::{Call, FakeProvider};
    use crate::retry::RetryPolicy;

    fn monitor_for(fake: &Arc<FakeProvider>) -> EventMonitor {
        let settings = WatchSettings {
            poll_delay: Duration::from_millis(1),
            retry: RetryPolicy::fixed(1, Duration::ZERO),
        };
        let client: Arc<dyn ResourceGroupClient> = fake.clone();
        EventMonitor::new(EventWatcher::new(client, settings), Arc::new(NullSink))
    }

    fn described(status: &str) -> GroupDescription {
        GroupDescription {
            id: None,
            name: String::from("app"),
            status: GroupStatus::parse(status),
            status_reason: None,
            outputs: Vec::new(),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(GroupState::classify(None), GroupState::Absent);
        assert_eq!(
            GroupState::classify(Some(&described("REVIEW_IN_PROGRESS"))),
            GroupState::ReviewPending
        );
        assert_eq!(
            GroupState::classify(Some(&described("UPDATE_ROLLBACK_COMPLETE"))),
            GroupState::Stable(GroupStatus::UpdateRollbackComplete)
        );
        assert_eq!(
            GroupState::classify(Some(&described("ROLLBACK_IN_PROGRESS"))),
            GroupState::CreationFailed(GroupStatus::RollbackInProgress)
        );
        assert_eq!(
            GroupState::classify(Some(&described("UPDATE_IN_PROGRESS"))),
            GroupState::InProgress(GroupStatus::UpdateInProgress)
        );
        assert_eq!(
            GroupState::classify(Some(&described("UPDATE_ROLLBACK_FAILED"))),
            GroupState::Unrecoverable(GroupStatus::UpdateRollbackFailed)
        );
    }

    #[tokio::test]
    async fn test_stable_stack_gets_policy() {
        let fake = Arc::new(FakeProvider::new().with_group("app", GroupStatus::UpdateComplete));
        let monitor = monitor_for(&fake);

        let report = Reconciler::new(fake.as_ref(), &monitor)
            .with_protection_policy(Some("{}"))
            .reconcile("app")
            .await
            .expect("reconcile");

        assert!(report.policy_applied);
        assert_eq!(
            fake.count(|c| matches!(c, Call::SetProtectionPolicy(g, body) if g == "app" && body == "{}")),
            1
        );
    }

    #[tokio::test]
    async fn test_absent_stack_is_left_alone() {
        let fake = Arc::new(FakeProvider::new());
        let monitor = monitor_for(&fake);

        let report = Reconciler::new(fake.as_ref(), &monitor)
            .with_protection_policy(Some("{}"))
            .reconcile("app")
            .await
            .expect("reconcile");

        assert_eq!(report.initial, GroupState::Absent);
        assert!(!report.policy_applied);
        assert_eq!(fake.calls(), vec![Call::DescribeGroup(String::from("app"))]);
    }

    #[tokio::test]
    async fn test_in_progress_update_is_waited_out() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_group("app", GroupStatus::UpdateRollbackInProgress)
                .with_missing_events(),
        );
        let monitor = monitor_for(&fake);

        let report = Reconciler::new(fake.as_ref(), &monitor)
            .reconcile("app")
            .await
            .expect("reconcile");

        assert_eq!(report.waited_for, Some(WaitTarget::RollbackComplete));
        assert_eq!(
            fake.count(|c| matches!(c, Call::WaitForGroupStatus(_, WaitTarget::RollbackComplete))),
            1
        );
        assert_eq!(fake.status_of("app"), Some(GroupStatus::UpdateRollbackComplete));
    }

    #[tokio::test]
    async fn test_creation_failed_without_opt_in_is_an_error() {
        let fake = Arc::new(FakeProvider::new().with_group("app", GroupStatus::RollbackComplete));
        let monitor = monitor_for(&fake);

        let err = Reconciler::new(fake.as_ref(), &monitor)
            .reconcile("app")
            .await
            .expect_err("creation failed");

        assert!(matches!(
            err,
            StackDeployError::Reconcile(ReconcileError::CreationFailed { .. })
        ));
        assert_eq!(fake.count(|c| matches!(c, Call::DeleteGroup(_))), 0);
    }

    #[tokio::test]
    async fn test_creation_failed_is_replaced_after_confirmation() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_group("app", GroupStatus::CreateFailed)
                .with_missing_events(),
        );
        let monitor = monitor_for(&fake);
        let mut approver = MockApprover::new();
        approver
            .expect_approve_replacement()
            .withf(|group, status| group == "app" && *status == GroupStatus::CreateFailed)
            .times(1)
            .returning(|_, _| Ok(true));

        let report = Reconciler::new(fake.as_ref(), &monitor)
            .with_approver(Some(&approver as &dyn Approver))
            .with_replacement(true)
            .reconcile("app")
            .await
            .expect("reconcile");

        assert!(report.replaced);
        assert_eq!(fake.count(|c| matches!(c, Call::DeleteGroup(g) if g == "app")), 1);
        assert_eq!(fake.status_of("app"), None);
    }

    #[tokio::test]
    async fn test_declined_replacement_keeps_stack() {
        let fake = Arc::new(FakeProvider::new().with_group("app", GroupStatus::RollbackComplete));
        let monitor = monitor_for(&fake);
        let mut approver = MockApprover::new();
        approver
            .expect_approve_replacement()
            .returning(|_, _| Ok(false));

        let err = Reconciler::new(fake.as_ref(), &monitor)
            .with_approver(Some(&approver as &dyn Approver))
            .with_replacement(true)
            .reconcile("app")
            .await
            .expect_err("declined");

        assert!(matches!(
            err,
            StackDeployError::Reconcile(ReconcileError::ReplacementDeclined { .. })
        ));
        assert_eq!(fake.count(|c| matches!(c, Call::DeleteGroup(_))), 0);
    }

    #[tokio::test]
    async fn test_failed_wait_is_surfaced() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_group("app", GroupStatus::CreateInProgress)
                .with_missing_events()
                .with_wait_failure("ROLLBACK_COMPLETE"),
        );
        let monitor = monitor_for(&fake);

        let err = Reconciler::new(fake.as_ref(), &monitor)
            .reconcile("app")
            .await
            .expect_err("wait failed");

        assert!(matches!(
            err,
            StackDeployError::Provider(crate::error::ProviderError::WaitFailed { .. })
        ));
    }
}
