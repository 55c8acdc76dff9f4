//! Provider client trait definition.
//!
//! This module defines the capability interface the deployment core
//! consumes from the declarative-infrastructure service.

use std::collections::HashSet;

use async_trait::async_trait;

use super::types::{
    ChangeSetSummary, CreateChangeSetRequest, EventPage, GroupDescription, ResourceChange,
    WaitTarget,
};
use crate::error::Result;

/// Trait for declarative-infrastructure provider backends.
#[async_trait]
pub trait ResourceGroupClient: Send + Sync {
    /// Describes a stack.
    ///
    /// Returns `None` if the stack does not exist.
    async fn describe_group(&self, name: &str) -> Result<Option<GroupDescription>>;

    /// Returns the parameter names declared by the stack's current template.
    async fn declared_parameter_names(&self, name: &str) -> Result<HashSet<String>>;

    /// Submits a change set and returns its provider-assigned id.
    ///
    /// Computation happens asynchronously after this returns.
    async fn create_change_set(&self, request: &CreateChangeSetRequest) -> Result<String>;

    /// Lists the change sets attached to a stack.
    async fn list_change_sets(&self, group: &str) -> Result<Vec<ChangeSetSummary>>;

    /// Returns the per-resource changes of a computed change set.
    async fn describe_change_set(&self, id: &str, group: &str) -> Result<Vec<ResourceChange>>;

    /// Deletes a change set.
    async fn delete_change_set(&self, id: &str, group: &str) -> Result<()>;

    /// Starts applying a change set.
    async fn execute_change_set(&self, id: &str, group: &str) -> Result<()>;

    /// Blocks until the stack reaches `target`.
    ///
    /// Fails if the stack reaches a status `target` can no longer follow,
    /// or if the wait bound is exceeded.
    async fn wait_for_group_status(&self, name: &str, target: WaitTarget) -> Result<()>;

    /// Fetches one page of stack events, newest first.
    async fn list_events(&self, group: &str, page_token: Option<&str>) -> Result<EventPage>;

    /// Sets the stack policy.
    async fn set_protection_policy(&self, group: &str, policy_body: &str) -> Result<()>;

    /// Starts deleting a stack.
    async fn delete_group(&self, name: &str) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
