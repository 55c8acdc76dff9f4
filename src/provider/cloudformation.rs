//! `CloudFormation`-backed provider client.
//!
//! This module implements [`ResourceGroupClient`] over the AWS SDK. Waits are
//! an externally implemented poll loop over `DescribeStacks` with a
//! wall-clock bound.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::primitives::DateTime as SdkDateTime;
use aws_sdk_cloudformation::types::{
    Capability, ChangeSetType, Parameter as SdkParameter, Stack, StackEvent, Tag as SdkTag,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::client::ResourceGroupClient;
use super::types::{
    ChangeDetail, ChangeSetKind, ChangeSetStatus, ChangeSetSummary, CreateChangeSetRequest,
    EventPage, GroupDescription, GroupStatus, OutputEntry, ResourceChange, StatusEvent,
    TemplateRef, WaitOutcome, WaitTarget,
};
use crate::error::{ProviderError, Result, StackDeployError};

/// Default wall-clock bound for a stack wait (stack operations can
/// legitimately take this long).
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default interval between `DescribeStacks` polls during a wait.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(5);

/// Error codes the service uses for throttling.
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Loads the shared AWS configuration, optionally overriding the region.
pub async fn load_sdk_config(region: Option<&str>) -> aws_config::SdkConfig {
    if let Some(region) = region {
        aws_config::from_env()
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await
    } else {
        aws_config::load_from_env().await
    }
}

/// `CloudFormation` provider client.
#[derive(Debug, Clone)]
pub struct CloudFormationClient {
    /// SDK client.
    client: Client,
    /// Wall-clock bound for stack waits.
    wait_timeout: Duration,
    /// Interval between wait polls.
    wait_interval: Duration,
}

/// Translates an SDK failure into the crate's provider errors.
fn map_sdk_error<E, R>(operation: &str, group: &str, err: SdkError<E, R>) -> StackDeployError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    if matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
    ) {
        return StackDeployError::Provider(ProviderError::NetworkError {
            operation: operation.to_string(),
            message: DisplayErrorContext(&err).to_string(),
        });
    }

    let code = err.code().map(ToString::to_string);
    let message = err
        .message()
        .map_or_else(|| DisplayErrorContext(&err).to_string(), ToString::to_string);

    if code
        .as_deref()
        .is_some_and(|c| THROTTLING_CODES.contains(&c))
    {
        return StackDeployError::Provider(ProviderError::Throttled {
            operation: operation.to_string(),
            message,
        });
    }

    if code.as_deref() != Some("ChangeSetNotFound") && message.contains("does not exist") {
        return StackDeployError::Provider(ProviderError::GroupNotFound {
            name: group.to_string(),
        });
    }

    StackDeployError::Provider(ProviderError::api_error(operation, message))
}

/// Converts an SDK timestamp.
fn to_chrono(timestamp: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

impl CloudFormationClient {
    /// Creates a new client from the environment's AWS configuration.
    pub async fn new(region: Option<&str>) -> Self {
        let config = load_sdk_config(region).await;
        Self::with_client(Client::new(&config))
    }

    /// Creates a client from an existing SDK client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self {
            client,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            wait_interval: DEFAULT_WAIT_INTERVAL,
        }
    }

    /// Overrides the stack wait bound and poll interval.
    #[must_use]
    pub const fn with_wait_bounds(mut self, timeout: Duration, interval: Duration) -> Self {
        self.wait_timeout = timeout;
        self.wait_interval = interval;
        self
    }

    /// Builds the SDK tag list.
    fn sdk_tags(request: &CreateChangeSetRequest) -> Vec<SdkTag> {
        request
            .tags
            .as_slice()
            .iter()
            .map(|tag| SdkTag::builder().key(&tag.key).value(&tag.value).build())
            .collect()
    }
}

/// Converts a described stack. Name and status are always present in a
/// well-formed response.
fn to_group_description(stack: &Stack) -> Result<GroupDescription> {
    let name = stack.stack_name().ok_or_else(|| {
        StackDeployError::Provider(ProviderError::invalid_response(
            "DescribeStacks",
            "stack is missing its name",
        ))
    })?;
    let status = stack.stack_status().ok_or_else(|| {
        StackDeployError::Provider(ProviderError::invalid_response(
            "DescribeStacks",
            format!("stack {name} is missing its status"),
        ))
    })?;

    Ok(GroupDescription {
        id: stack.stack_id().map(ToString::to_string),
        name: name.to_string(),
        status: GroupStatus::parse(status.as_str()),
        status_reason: stack.stack_status_reason().map(ToString::to_string),
        outputs: stack
            .outputs()
            .iter()
            .map(|o| OutputEntry {
                key: o.output_key().map(ToString::to_string),
                value: o.output_value().map(ToString::to_string),
            })
            .collect(),
    })
}

/// Converts a stack event, skipping records without identity or time.
fn to_status_event(event: &StackEvent) -> Option<StatusEvent> {
    Some(StatusEvent {
        group_id: event.stack_id()?.to_string(),
        group_name: event.stack_name()?.to_string(),
        event_id: event.event_id()?.to_string(),
        logical_id: event.logical_resource_id().unwrap_or_default().to_string(),
        physical_id: event.physical_resource_id().map(ToString::to_string),
        resource_type: event.resource_type().map(ToString::to_string),
        timestamp: to_chrono(event.timestamp()?)?,
        status: event
            .resource_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        reason: event.resource_status_reason().map(ToString::to_string),
        properties: event.resource_properties().map(ToString::to_string),
    })
}

#[async_trait]
impl ResourceGroupClient for CloudFormationClient {
    async fn describe_group(&self, name: &str) -> Result<Option<GroupDescription>> {
        let result = self.client.describe_stacks().stack_name(name).send().await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let err = map_sdk_error("DescribeStacks", name, err);
                if err.is_group_not_found() {
                    debug!("Stack {name} does not exist");
                    return Ok(None);
                }
                return Err(err);
            }
        };

        let Some(stack) = output.stacks().first() else {
            return Ok(None);
        };

        to_group_description(stack).map(Some)
    }

    async fn declared_parameter_names(&self, name: &str) -> Result<HashSet<String>> {
        let output = self
            .client
            .get_template_summary()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetTemplateSummary", name, e))?;

        Ok(output
            .parameters()
            .iter()
            .filter_map(|p| p.parameter_key().map(ToString::to_string))
            .collect())
    }

    async fn create_change_set(&self, request: &CreateChangeSetRequest) -> Result<String> {
        let group = &request.group_name;
        let change_set_type = match request.kind {
            ChangeSetKind::Create => ChangeSetType::Create,
            ChangeSetKind::Update => ChangeSetType::Update,
        };

        let parameters: Vec<SdkParameter> = request
            .parameters
            .as_slice()
            .iter()
            .map(|p| {
                SdkParameter::builder()
                    .parameter_key(&p.key)
                    .set_parameter_value(p.value.clone())
                    .use_previous_value(p.use_previous_value)
                    .build()
            })
            .collect();

        let mut builder = self
            .client
            .create_change_set()
            .change_set_name(&request.change_set_name)
            .stack_name(group)
            .change_set_type(change_set_type)
            .description(&request.description)
            .set_parameters(Some(parameters))
            .set_capabilities(Some(
                request
                    .capabilities
                    .iter()
                    .map(|c| Capability::from(c.as_str()))
                    .collect(),
            ))
            .set_role_arn(request.role_arn.clone());

        if !request.notification_arns.is_empty() {
            builder = builder.set_notification_arns(Some(request.notification_arns.clone()));
        }
        if !request.tags.is_empty() {
            builder = builder.set_tags(Some(Self::sdk_tags(request)));
        }

        builder = match &request.template {
            TemplateRef::Body(body) => builder.template_body(body),
            TemplateRef::Url(url) => builder.template_url(url),
            TemplateRef::UsePrevious => builder.use_previous_template(true),
        };

        let output = builder
            .send()
            .await
            .map_err(|e| map_sdk_error("CreateChangeSet", group, e))?;

        info!(
            "Created {} change set {} for stack {group}",
            request.kind, request.change_set_name
        );

        output.id().map(ToString::to_string).ok_or_else(|| {
            StackDeployError::Provider(ProviderError::invalid_response(
                "CreateChangeSet",
                "response is missing the change set id",
            ))
        })
    }

    async fn list_change_sets(&self, group: &str) -> Result<Vec<ChangeSetSummary>> {
        let mut summaries = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_change_sets()
                .stack_name(group)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("ListChangeSets", group, e))?;

            summaries.extend(output.summaries().iter().filter_map(|s| {
                Some(ChangeSetSummary {
                    id: s.change_set_id()?.to_string(),
                    name: s.change_set_name().map(ToString::to_string),
                    status: ChangeSetStatus::parse(
                        s.status().map_or("", |status| status.as_str()),
                    ),
                    status_reason: s.status_reason().map(ToString::to_string),
                })
            }));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(summaries)
    }

    async fn describe_change_set(&self, id: &str, group: &str) -> Result<Vec<ResourceChange>> {
        let mut changes = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_change_set()
                .change_set_name(id)
                .stack_name(group)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("DescribeChangeSet", group, e))?;

            changes.extend(
                output
                    .changes()
                    .iter()
                    .filter_map(|c| c.resource_change())
                    .map(|rc| ResourceChange {
                        action: rc.action().map(|a| a.as_str().to_string()),
                        logical_id: rc.logical_resource_id().map(ToString::to_string),
                        physical_id: rc.physical_resource_id().map(ToString::to_string),
                        resource_type: rc.resource_type().map(ToString::to_string),
                        replacement: rc.replacement().map(|r| r.as_str().to_string()),
                        details: rc
                            .details()
                            .iter()
                            .map(|d| ChangeDetail {
                                attribute: d
                                    .target()
                                    .and_then(|t| t.attribute())
                                    .map(|a| a.as_str().to_string()),
                                name: d.target().and_then(|t| t.name()).map(ToString::to_string),
                                requires_recreation: d
                                    .target()
                                    .and_then(|t| t.requires_recreation())
                                    .map(|r| r.as_str().to_string()),
                            })
                            .collect(),
                    }),
            );

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(changes)
    }

    async fn delete_change_set(&self, id: &str, group: &str) -> Result<()> {
        self.client
            .delete_change_set()
            .change_set_name(id)
            .stack_name(group)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteChangeSet", group, e))?;

        debug!("Deleted change set {id}");
        Ok(())
    }

    async fn execute_change_set(&self, id: &str, group: &str) -> Result<()> {
        self.client
            .execute_change_set()
            .change_set_name(id)
            .stack_name(group)
            .send()
            .await
            .map_err(|e| map_sdk_error("ExecuteChangeSet", group, e))?;

        info!("Executing change set {id} on stack {group}");
        Ok(())
    }

    async fn wait_for_group_status(&self, name: &str, target: WaitTarget) -> Result<()> {
        let start = Instant::now();

        loop {
            match self.describe_group(name).await? {
                None if target == WaitTarget::DeleteComplete => return Ok(()),
                None => {
                    return Err(StackDeployError::Provider(ProviderError::GroupNotFound {
                        name: name.to_string(),
                    }));
                }
                Some(group) => match target.outcome(&group.status) {
                    WaitOutcome::Reached => return Ok(()),
                    WaitOutcome::Failed => {
                        return Err(StackDeployError::Provider(ProviderError::WaitFailed {
                            group: name.to_string(),
                            status: group.status.to_string(),
                            target: target.to_string(),
                            reason: group.status_reason,
                        }));
                    }
                    WaitOutcome::Pending => {
                        debug!("Stack {name} is {}, waiting for {target}", group.status);
                    }
                },
            }

            if start.elapsed() > self.wait_timeout {
                return Err(StackDeployError::Provider(ProviderError::Timeout {
                    group: name.to_string(),
                    target: target.to_string(),
                }));
            }

            tokio::time::sleep(self.wait_interval).await;
        }
    }

    async fn list_events(&self, group: &str, page_token: Option<&str>) -> Result<EventPage> {
        let output = self
            .client
            .describe_stack_events()
            .stack_name(group)
            .set_next_token(page_token.map(ToString::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeStackEvents", group, e))?;

        let events = output
            .stack_events()
            .iter()
            .filter_map(to_status_event)
            .collect();

        Ok(EventPage {
            events,
            next_token: output.next_token().map(ToString::to_string),
        })
    }

    async fn set_protection_policy(&self, group: &str, policy_body: &str) -> Result<()> {
        self.client
            .set_stack_policy()
            .stack_name(group)
            .stack_policy_body(policy_body)
            .send()
            .await
            .map_err(|e| map_sdk_error("SetStackPolicy", group, e))?;

        info!("Set stack policy on {group}");
        Ok(())
    }

    async fn delete_group(&self, name: &str) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteStack", name, e))?;

        info!("Deleting stack {name}");
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "cloudformation"
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_cloudformation::types::{Output, ResourceStatus, StackStatus};

    use super::*;

    #[test]
    fn test_group_description_from_stack() {
        let stack = Stack::builder()
            .stack_id("arn:aws:cloudformation:us-east-1:123:stack/app/1")
            .stack_name("app")
            .stack_status(StackStatus::UpdateRollbackComplete)
            .outputs(Output::builder().output_key("Url").output_value("https://app").build())
            .outputs(Output::builder().output_key("Orphan").build())
            .build();

        let group = to_group_description(&stack).expect("described");

        assert_eq!(group.name, "app");
        assert_eq!(group.status, GroupStatus::UpdateRollbackComplete);
        assert_eq!(group.outputs.len(), 2);
        assert_eq!(group.outputs[1].value, None);
    }

    #[test]
    fn test_stack_without_status_is_invalid() {
        let stack = Stack::builder().stack_name("app").build();

        let err = to_group_description(&stack).expect_err("no status");

        assert!(matches!(err, StackDeployError::Provider(_)));
    }

    #[test]
    fn test_status_event_from_stack_event() {
        let event = StackEvent::builder()
            .stack_id("arn:aws:cloudformation:us-east-1:123:stack/app/1")
            .stack_name("app")
            .event_id("e-1")
            .logical_resource_id("app")
            .physical_resource_id("arn:aws:cloudformation:us-east-1:123:stack/app/1")
            .resource_type("AWS::CloudFormation::Stack")
            .resource_status(ResourceStatus::UpdateComplete)
            .timestamp(SdkDateTime::from_secs(1_700_000_000))
            .build();

        let converted = to_status_event(&event).expect("converted");

        assert_eq!(converted.event_id, "e-1");
        assert_eq!(converted.status, "UPDATE_COMPLETE");
        assert_eq!(converted.timestamp.timestamp(), 1_700_000_000);
        assert!(converted.is_group_event());
    }

    #[test]
    fn test_event_without_timestamp_is_skipped() {
        let event = StackEvent::builder()
            .stack_id("arn:aws:cloudformation:us-east-1:123:stack/app/1")
            .stack_name("app")
            .event_id("e-1")
            .build();

        assert!(to_status_event(&event).is_none());
    }
}
