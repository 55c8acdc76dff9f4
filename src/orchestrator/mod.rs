//! Deployment entry point.
//!
//! The [`Orchestrator`] sequences one deployment: validate the request,
//! resolve the template, reconcile the existing stack, compute a change set,
//! optionally ask for approval, execute under the event monitor, and read
//! outputs.

mod approval;
mod request;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(test)]
pub(crate) use approval::MockApprover;
pub use approval::Approver;
pub use request::{DeployOutcome, DeployRequest, Disposition, TemplateSource};

use crate::deployer::{
    ChangeSetCoordinator, ChangeSetOutcome, DEFAULT_CHANGE_SET_POLL, DEFAULT_CHANGE_SET_PREFIX,
};
use crate::error::{ProviderError, Result, StackDeployError, ValidationError};
use crate::events::{EventMonitor, EventSink, EventWatcher, NullSink, WatchSettings};
use crate::provider::{ChangeSetKind, ResourceGroupClient, StatusEvent, WaitTarget};
use crate::reconciler::Reconciler;
use crate::retry::RetryPolicy;
use crate::upload::{TemplateUploader, UploadOptions};

/// Deploys stacks through change sets.
#[derive(Clone)]
pub struct Orchestrator {
    /// Provider client.
    client: Arc<dyn ResourceGroupClient>,
    /// Optional template upload side-channel.
    uploader: Option<Arc<dyn TemplateUploader>>,
    /// Options passed to every upload.
    upload_options: UploadOptions,
    /// Approval gate.
    approver: Option<Arc<dyn Approver>>,
    /// Destination of live events and failure reports.
    sink: Arc<dyn EventSink>,
    /// Event polling behaviour.
    watch_settings: WatchSettings,
    /// Change-set name prefix.
    change_set_prefix: String,
    /// Change-set computation poll budget.
    change_set_poll: RetryPolicy,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.client.backend_type())
            .field("uploader", &self.uploader.is_some())
            .field("approver", &self.approver.is_some())
            .field("change_set_prefix", &self.change_set_prefix)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with no uploader, no approver and a silent
    /// event sink.
    #[must_use]
    pub fn new(client: Arc<dyn ResourceGroupClient>) -> Self {
        Self {
            client,
            uploader: None,
            upload_options: UploadOptions::default(),
            approver: None,
            sink: Arc::new(NullSink),
            watch_settings: WatchSettings::default(),
            change_set_prefix: DEFAULT_CHANGE_SET_PREFIX.to_string(),
            change_set_poll: DEFAULT_CHANGE_SET_POLL,
        }
    }

    /// Uploads templates through `uploader`.
    #[must_use]
    pub fn with_uploader(mut self, uploader: Arc<dyn TemplateUploader>, options: UploadOptions) -> Self {
        self.uploader = Some(uploader);
        self.upload_options = options;
        self
    }

    /// Sets the approval gate.
    #[must_use]
    pub fn with_approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approver = Some(approver);
        self
    }

    /// Sets where live events and failure reports go.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the event polling behaviour.
    #[must_use]
    pub const fn with_watch_settings(mut self, settings: WatchSettings) -> Self {
        self.watch_settings = settings;
        self
    }

    /// Sets the change-set name prefix.
    #[must_use]
    pub fn with_change_set_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.change_set_prefix = prefix.into();
        self
    }

    /// Sets the change-set computation poll budget.
    #[must_use]
    pub const fn with_change_set_poll(mut self, policy: RetryPolicy) -> Self {
        self.change_set_poll = policy;
        self
    }

    /// Returns the provider client.
    #[must_use]
    pub fn client(&self) -> &dyn ResourceGroupClient {
        self.client.as_ref()
    }

    fn watcher(&self) -> EventWatcher {
        EventWatcher::new(Arc::clone(&self.client), self.watch_settings)
    }

    fn monitor(&self) -> EventMonitor {
        EventMonitor::new(self.watcher(), Arc::clone(&self.sink))
    }

    fn coordinator(&self) -> ChangeSetCoordinator<'_> {
        ChangeSetCoordinator::new(self.client.as_ref())
            .with_uploader(self.uploader.as_deref(), self.upload_options.clone())
            .with_prefix(self.change_set_prefix.as_str())
            .with_poll_policy(self.change_set_poll)
    }

    /// Deploys one stack, asking for approval if the request says so.
    ///
    /// # Errors
    ///
    /// Returns validation, reconciliation, change-set and provider errors.
    /// An operator declining the changes is not an error; it yields
    /// [`Disposition::Aborted`].
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome> {
        self.deploy_with(request, request.approve.unwrap_or(false)).await
    }

    /// Deploys several stacks concurrently, without approval.
    ///
    /// Every deployment runs to completion even if another fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure, in request order, after all deployments
    /// have settled. Use [`Orchestrator::deploy_all`] to keep every result.
    pub async fn deploy_many(&self, requests: &[DeployRequest]) -> Result<Vec<DeployOutcome>> {
        self.deploy_all(requests).await.into_iter().collect()
    }

    /// Deploys several stacks concurrently, without approval, and returns
    /// each stack's result in request order.
    pub async fn deploy_all(&self, requests: &[DeployRequest]) -> Vec<Result<DeployOutcome>> {
        let results = join_all(requests.iter().map(|request| self.deploy_with(request, false))).await;

        for (request, result) in requests.iter().zip(&results) {
            if let Err(err) = result {
                error!("Deployment of {} failed: {err}", request.name);
            }
        }

        results
    }

    async fn deploy_with(&self, request: &DeployRequest, approve: bool) -> Result<DeployOutcome> {
        let name = request.name.as_str();
        let approver = match (approve, self.approver.as_deref()) {
            (false, _) => None,
            (true, Some(approver)) => Some(approver),
            (true, None) => {
                return Err(ValidationError::MissingApprover {
                    stack: name.to_string(),
                }
                .into());
            }
        };
        let template_body = request.resolve_template_body().await?;
        let policy = request.policy_body();
        let monitor = self.monitor();
        let coordinator = self.coordinator();
        coordinator.check_template_size(name, template_body.as_deref())?;

        info!("Deploying stack {name}");

        let report = Reconciler::new(self.client.as_ref(), &monitor)
            .with_approver(approver)
            .with_replacement(request.replace_if_create_failed)
            .with_protection_policy(policy.as_deref())
            .reconcile(name)
            .await?;
        info!("Stack {name}: {report}");

        let input = request.change_set_input(template_body);
        let change_set = coordinator.create_and_wait_for_change_set(&input).await?;

        if !change_set.has_changes {
            info!("Stack {name} is already in the desired state");
            return self
                .finish(request, change_set, Disposition::NoChanges)
                .await;
        }

        if let Some(approver) = approver {
            let reviewed = async {
                let changes = coordinator.describe_change_set(&change_set.id, name).await?;
                approver.approve_changes(name, &changes).await
            };

            match reviewed.await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Changes to {name} were declined");
                    self.abort(&monitor, &coordinator, &change_set, name).await?;
                    return self.finish(request, change_set, Disposition::Aborted).await;
                }
                Err(err) => {
                    if let Err(cleanup) = self.abort(&monitor, &coordinator, &change_set, name).await {
                        warn!("Could not clean up {name} after a failed review: {cleanup}");
                    }
                    return Err(err);
                }
            }
        }

        monitor
            .watch_during(name, async {
                coordinator.execute_change_set(&change_set.id, name).await?;
                coordinator
                    .wait_for_execution_complete(name, change_set.kind)
                    .await
            })
            .await?;

        if change_set.kind == ChangeSetKind::Create
            && let Some(policy) = policy.as_deref()
        {
            info!("Applying stack policy to new stack {name}");
            self.client.set_protection_policy(name, policy).await?;
        }

        self.finish(request, change_set, Disposition::Executed).await
    }

    /// Removes the unexecuted change set, or the review-pending stack that
    /// holds it.
    async fn abort(
        &self,
        monitor: &EventMonitor,
        coordinator: &ChangeSetCoordinator<'_>,
        change_set: &ChangeSetOutcome,
        name: &str,
    ) -> Result<()> {
        match change_set.kind {
            ChangeSetKind::Update => coordinator.delete_change_set(&change_set.id, name).await,
            ChangeSetKind::Create => {
                info!("Deleting review-pending stack {name}");
                monitor
                    .watch_during(name, async {
                        self.client.delete_group(name).await?;
                        self.client
                            .wait_for_group_status(name, WaitTarget::DeleteComplete)
                            .await
                    })
                    .await
            }
        }
    }

    async fn finish(
        &self,
        request: &DeployRequest,
        change_set: ChangeSetOutcome,
        disposition: Disposition,
    ) -> Result<DeployOutcome> {
        let outputs = if disposition != Disposition::Aborted && request.read_outputs.unwrap_or(false) {
            self.group_outputs(&request.name).await?
        } else {
            BTreeMap::new()
        };

        Ok(DeployOutcome {
            stack: request.name.clone(),
            change_set_name: change_set.name,
            kind: change_set.kind,
            has_changes: change_set.has_changes,
            disposition,
            outputs,
        })
    }

    /// Streams `group`'s events newer than `since`, oldest first, until the
    /// stack settles or `cancel` fires.
    pub fn watch_events(
        &self,
        group: &str,
        since: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StatusEvent> + Send + use<> {
        self.watcher().watch(group, since, cancel)
    }

    /// Renders the failure events of `group`'s current operation.
    ///
    /// # Errors
    ///
    /// Returns any provider error.
    pub async fn diagnose_failure(&self, group: &str) -> Result<String> {
        crate::events::diagnose_failure(self.client.as_ref(), group).await
    }

    /// Returns the outputs of `group` that carry both a key and a value.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::GroupNotFound`] if the stack does not exist,
    /// or any other provider error.
    pub async fn group_outputs(&self, group: &str) -> Result<BTreeMap<String, String>> {
        let description = self.client.describe_group(group).await?.ok_or_else(|| {
            StackDeployError::Provider(ProviderError::GroupNotFound {
                name: group.to_string(),
            })
        })?;

        Ok(description
            .outputs
            .into_iter()
            .filter_map(|output| Some((output.key?, output.value?)))
            .collect())
    }
}
