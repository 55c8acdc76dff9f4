//! Scriptable in-memory provider used by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::client::ResourceGroupClient;
use super::types::{
    ChangeSetKind, ChangeSetStatus, ChangeSetSummary, CreateChangeSetRequest, EventPage,
    GroupDescription, GroupStatus, OutputEntry, ResourceChange, StatusEvent, WaitTarget,
    GROUP_RESOURCE_TYPE,
};
use crate::error::{ProviderError, Result, StackDeployError};

/// A call made against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DescribeGroup(String),
    DeclaredParameters(String),
    CreateChangeSet(CreateChangeSetRequest),
    ListChangeSets(String),
    DescribeChangeSet(String),
    DeleteChangeSet(String),
    ExecuteChangeSet(String),
    WaitForGroupStatus(String, WaitTarget),
    ListEvents(Option<String>),
    SetProtectionPolicy(String, String),
    DeleteGroup(String),
}

#[derive(Debug, Default)]
struct FakeState {
    groups: HashMap<String, GroupDescription>,
    declared: HashMap<String, HashSet<String>>,
    change_set_statuses: VecDeque<(ChangeSetStatus, Option<String>)>,
    last_change_set: Option<String>,
    changes: Vec<ResourceChange>,
    events: Vec<StatusEvent>,
    page_size: usize,
    events_missing: bool,
    event_failures: usize,
    wait_failure: Option<String>,
    next_id: u32,
    calls: Vec<Call>,
}

/// In-memory [`ResourceGroupClient`] that records every call.
#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

/// Returns the stack id the fake assigns to `name`.
pub fn group_id(name: &str) -> String {
    format!("arn:aws:cloudformation:us-east-1:123456789012:stack/{name}/fake")
}

/// Builds an event record.
pub fn event(
    group: &str,
    logical_id: &str,
    status: &str,
    timestamp: &str,
    reason: Option<&str>,
) -> StatusEvent {
    let is_group = logical_id == group;
    StatusEvent {
        group_id: group_id(group),
        group_name: group.to_string(),
        event_id: format!("{logical_id}-{status}-{timestamp}"),
        logical_id: logical_id.to_string(),
        physical_id: Some(if is_group {
            group_id(group)
        } else {
            format!("{logical_id}-physical")
        }),
        resource_type: Some(if is_group {
            GROUP_RESOURCE_TYPE.to_string()
        } else {
            String::from("AWS::EC2::SecurityGroup")
        }),
        timestamp: parse_time(timestamp),
        status: status.to_string(),
        reason: reason.map(ToString::to_string),
        properties: None,
    }
}

/// Parses an RFC 3339 fixture timestamp.
pub fn parse_time(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .expect("valid fixture timestamp")
        .with_timezone(&Utc)
}

impl FakeProvider {
    /// Creates an empty fake where no stack exists.
    pub fn new() -> Self {
        let fake = Self::default();
        fake.lock().page_size = 100;
        fake
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake provider lock")
    }

    /// Adds an existing stack.
    pub fn with_group(self, name: &str, status: GroupStatus) -> Self {
        self.lock().groups.insert(
            name.to_string(),
            GroupDescription {
                id: Some(group_id(name)),
                name: name.to_string(),
                status,
                status_reason: None,
                outputs: Vec::new(),
            },
        );
        self
    }

    /// Sets outputs on an existing stack.
    pub fn with_outputs(self, name: &str, outputs: &[(Option<&str>, Option<&str>)]) -> Self {
        if let Some(group) = self.lock().groups.get_mut(name) {
            group.outputs = outputs
                .iter()
                .map(|(k, v)| OutputEntry {
                    key: k.map(ToString::to_string),
                    value: v.map(ToString::to_string),
                })
                .collect();
        }
        self
    }

    /// Declares template parameters for a stack.
    pub fn with_declared_parameters(self, name: &str, keys: &[&str]) -> Self {
        self.lock().declared.insert(
            name.to_string(),
            keys.iter().map(|k| (*k).to_string()).collect(),
        );
        self
    }

    /// Scripts the change-set statuses returned by successive polls.
    ///
    /// The last entry repeats once the script runs out.
    pub fn with_change_set_statuses(self, statuses: &[(&str, Option<&str>)]) -> Self {
        self.lock().change_set_statuses = statuses
            .iter()
            .map(|(s, r)| (ChangeSetStatus::parse(s), r.map(ToString::to_string)))
            .collect();
        self
    }

    /// Sets the resource changes returned by `describe_change_set`.
    pub fn with_changes(self, changes: Vec<ResourceChange>) -> Self {
        self.lock().changes = changes;
        self
    }

    /// Sets the event history (newest first) and page size.
    pub fn with_events(self, events: Vec<StatusEvent>, page_size: usize) -> Self {
        {
            let mut state = self.lock();
            state.events = events;
            state.page_size = page_size;
        }
        self
    }

    /// Makes event reads fail as if the stack did not exist.
    pub fn with_missing_events(self) -> Self {
        self.lock().events_missing = true;
        self
    }

    /// Makes the next `count` event reads fail as throttled.
    pub fn with_event_failures(self, count: usize) -> Self {
        self.lock().event_failures = count;
        self
    }

    /// Makes every stack wait fail with the given status.
    pub fn with_wait_failure(self, status: &str) -> Self {
        self.lock().wait_failure = Some(status.to_string());
        self
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Counts calls matching a predicate.
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Returns the create-change-set requests made so far.
    pub fn created(&self) -> Vec<CreateChangeSetRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::CreateChangeSet(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the current status of a stack.
    pub fn status_of(&self, name: &str) -> Option<GroupStatus> {
        self.lock().groups.get(name).map(|g| g.status.clone())
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl ResourceGroupClient for FakeProvider {
    async fn describe_group(&self, name: &str) -> Result<Option<GroupDescription>> {
        self.record(Call::DescribeGroup(name.to_string()));
        Ok(self.lock().groups.get(name).cloned())
    }

    async fn declared_parameter_names(&self, name: &str) -> Result<HashSet<String>> {
        self.record(Call::DeclaredParameters(name.to_string()));
        Ok(self.lock().declared.get(name).cloned().unwrap_or_default())
    }

    async fn create_change_set(&self, request: &CreateChangeSetRequest) -> Result<String> {
        self.record(Call::CreateChangeSet(request.clone()));
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!(
            "arn:aws:cloudformation:us-east-1:123456789012:changeSet/{}/{}",
            request.change_set_name, state.next_id
        );
        state.last_change_set = Some(id.clone());

        if request.kind == ChangeSetKind::Create && !state.groups.contains_key(&request.group_name)
        {
            state.groups.insert(
                request.group_name.clone(),
                GroupDescription {
                    id: Some(group_id(&request.group_name)),
                    name: request.group_name.clone(),
                    status: GroupStatus::ReviewInProgress,
                    status_reason: None,
                    outputs: Vec::new(),
                },
            );
        }
        Ok(id)
    }

    async fn list_change_sets(&self, group: &str) -> Result<Vec<ChangeSetSummary>> {
        self.record(Call::ListChangeSets(group.to_string()));
        let mut state = self.lock();
        let Some(id) = state.last_change_set.clone() else {
            return Ok(Vec::new());
        };
        let (status, status_reason) = if state.change_set_statuses.len() > 1 {
            state.change_set_statuses.pop_front()
        } else {
            state.change_set_statuses.front().cloned()
        }
        .unwrap_or((ChangeSetStatus::CreateComplete, None));

        Ok(vec![ChangeSetSummary {
            id,
            name: None,
            status,
            status_reason,
        }])
    }

    async fn describe_change_set(&self, id: &str, _group: &str) -> Result<Vec<ResourceChange>> {
        self.record(Call::DescribeChangeSet(id.to_string()));
        Ok(self.lock().changes.clone())
    }

    async fn delete_change_set(&self, id: &str, _group: &str) -> Result<()> {
        self.record(Call::DeleteChangeSet(id.to_string()));
        Ok(())
    }

    async fn execute_change_set(&self, id: &str, _group: &str) -> Result<()> {
        self.record(Call::ExecuteChangeSet(id.to_string()));
        Ok(())
    }

    async fn wait_for_group_status(&self, name: &str, target: WaitTarget) -> Result<()> {
        self.record(Call::WaitForGroupStatus(name.to_string(), target));
        let mut state = self.lock();

        if let Some(status) = state.wait_failure.clone() {
            return Err(StackDeployError::Provider(ProviderError::WaitFailed {
                group: name.to_string(),
                status,
                target: target.to_string(),
                reason: None,
            }));
        }

        if target == WaitTarget::DeleteComplete {
            state.groups.remove(name);
        } else if let Some(group) = state.groups.get_mut(name) {
            group.status = GroupStatus::parse(target.as_str());
        }
        Ok(())
    }

    async fn list_events(&self, group: &str, page_token: Option<&str>) -> Result<EventPage> {
        self.record(Call::ListEvents(page_token.map(ToString::to_string)));
        let mut state = self.lock();

        if state.event_failures > 0 {
            state.event_failures -= 1;
            return Err(StackDeployError::Provider(ProviderError::Throttled {
                operation: String::from("DescribeStackEvents"),
                message: String::from("Rate exceeded"),
            }));
        }

        if state.events_missing {
            return Err(StackDeployError::Provider(ProviderError::GroupNotFound {
                name: group.to_string(),
            }));
        }

        let start: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + state.page_size).min(state.events.len());
        let events = state.events.get(start..end).unwrap_or_default().to_vec();
        let next_token = (end < state.events.len()).then(|| end.to_string());

        Ok(EventPage { events, next_token })
    }

    async fn set_protection_policy(&self, group: &str, policy_body: &str) -> Result<()> {
        self.record(Call::SetProtectionPolicy(
            group.to_string(),
            policy_body.to_string(),
        ));
        Ok(())
    }

    async fn delete_group(&self, name: &str) -> Result<()> {
        self.record(Call::DeleteGroup(name.to_string()));
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "fake"
    }
}
