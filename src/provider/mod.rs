//! Provider module for the declarative-infrastructure service.
//!
//! This module provides the capability interface the deployment core
//! consumes, the data types it exchanges, and the `CloudFormation` binding.

mod client;
mod cloudformation;
mod types;

#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod fake;

pub use client::ResourceGroupClient;
pub use cloudformation::{
    load_sdk_config, CloudFormationClient, DEFAULT_WAIT_INTERVAL, DEFAULT_WAIT_TIMEOUT,
};
pub use types::{
    ChangeDetail, ChangeSetKind, ChangeSetStatus, ChangeSetSummary, CreateChangeSetRequest,
    EventPage, GroupDescription, GroupStatus, OutputEntry, ResourceChange, StatusEvent,
    TemplateRef, WaitOutcome, WaitTarget, GROUP_RESOURCE_TYPE, INLINE_TEMPLATE_LIMIT,
};
