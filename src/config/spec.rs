//! Configuration specification types for the deployment file.
//!
//! This module defines the structs that map to `stackdeploy.yaml`: shared
//! defaults, the optional template upload bucket, polling budgets and the
//! list of stacks to deploy.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deployer::DEFAULT_CHANGE_SET_PREFIX;
use crate::error::{ConfigError, Result, StackDeployError};
use crate::events::WatchSettings;
use crate::orchestrator::DeployRequest;
use crate::retry::RetryPolicy;
use crate::upload::UploadOptions;

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Settings shared by every stack.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Template upload bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadConfig>,
    /// Polling budgets.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Stacks to deploy.
    #[serde(default)]
    pub stacks: Vec<DeployRequest>,
}

/// Settings shared by every stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultsConfig {
    /// AWS region (falls back to the SDK's default chain).
    #[serde(default)]
    pub region: Option<String>,
    /// Change-set name prefix.
    #[serde(default = "default_change_set_prefix")]
    pub change_set_prefix: String,
    /// Stream stack events while waiting.
    #[serde(default = "default_true")]
    pub log_events: bool,
    /// Ask for approval before executing changes.
    #[serde(default)]
    pub approve: bool,
    /// Read stack outputs after deploying.
    #[serde(default)]
    pub read_outputs: bool,
}

/// Template upload bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadConfig {
    /// S3 bucket name.
    pub bucket: String,
    /// Key prefix inside the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
    /// KMS key for server-side encryption (AES256 when unset).
    #[serde(default)]
    pub kms_key_id: Option<String>,
    /// Upload even when the object already exists.
    #[serde(default)]
    pub force_upload: bool,
    /// Metadata attached to every uploaded object.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Polling budgets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    /// Seconds between change-set status checks.
    #[serde(default = "default_change_set_interval")]
    pub change_set_interval_secs: u64,
    /// Change-set status checks before giving up.
    #[serde(default = "default_change_set_attempts")]
    pub change_set_attempts: u32,
    /// Milliseconds between event fetches.
    #[serde(default = "default_event_poll_delay")]
    pub event_poll_delay_ms: u64,
    /// Attempts for a failing event fetch.
    #[serde(default = "default_event_retry_attempts")]
    pub event_retry_attempts: u32,
    /// First backoff of a failing event fetch, in milliseconds.
    #[serde(default = "default_event_retry_base")]
    pub event_retry_base_ms: u64,
    /// Backoff cap of a failing event fetch, in milliseconds.
    #[serde(default = "default_event_retry_max")]
    pub event_retry_max_ms: u64,
    /// Seconds to wait for a stack operation.
    #[serde(default = "default_stack_wait_timeout")]
    pub stack_wait_timeout_secs: u64,
    /// Seconds between stack status checks.
    #[serde(default = "default_stack_wait_interval")]
    pub stack_wait_interval_secs: u64,
}

// Default value functions for serde

fn default_change_set_prefix() -> String {
    DEFAULT_CHANGE_SET_PREFIX.to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_change_set_interval() -> u64 {
    2
}

const fn default_change_set_attempts() -> u32 {
    20
}

const fn default_event_poll_delay() -> u64 {
    500
}

const fn default_event_retry_attempts() -> u32 {
    3
}

const fn default_event_retry_base() -> u64 {
    2_000
}

const fn default_event_retry_max() -> u64 {
    8_000
}

const fn default_stack_wait_timeout() -> u64 {
    3_600
}

const fn default_stack_wait_interval() -> u64 {
    5
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            region: None,
            change_set_prefix: default_change_set_prefix(),
            log_events: true,
            approve: false,
            read_outputs: false,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            change_set_interval_secs: default_change_set_interval(),
            change_set_attempts: default_change_set_attempts(),
            event_poll_delay_ms: default_event_poll_delay(),
            event_retry_attempts: default_event_retry_attempts(),
            event_retry_base_ms: default_event_retry_base(),
            event_retry_max_ms: default_event_retry_max(),
            stack_wait_timeout_secs: default_stack_wait_timeout(),
            stack_wait_interval_secs: default_stack_wait_interval(),
        }
    }
}

impl PollingConfig {
    /// Returns the change-set computation poll budget.
    #[must_use]
    pub const fn change_set_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.change_set_attempts,
            Duration::from_secs(self.change_set_interval_secs),
        )
    }

    /// Returns the event watcher settings.
    #[must_use]
    pub const fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            poll_delay: Duration::from_millis(self.event_poll_delay_ms),
            retry: RetryPolicy::exponential(
                self.event_retry_attempts,
                Duration::from_millis(self.event_retry_base_ms),
                Duration::from_millis(self.event_retry_max_ms),
            ),
        }
    }

    /// Returns the wall-clock bound on a stack operation.
    #[must_use]
    pub const fn stack_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.stack_wait_timeout_secs)
    }

    /// Returns the interval between stack status checks.
    #[must_use]
    pub const fn stack_wait_interval(&self) -> Duration {
        Duration::from_secs(self.stack_wait_interval_secs)
    }
}

impl UploadConfig {
    /// Returns the per-call upload options.
    #[must_use]
    pub fn options(&self) -> UploadOptions {
        UploadOptions {
            metadata: self.metadata.clone(),
            force_upload: self.force_upload,
        }
    }
}

impl DeployConfig {
    /// Returns every stack with the shared defaults filled in.
    #[must_use]
    pub fn requests(&self) -> Vec<DeployRequest> {
        self.stacks.iter().map(|stack| self.with_defaults(stack)).collect()
    }

    /// Returns the named stacks with defaults filled in, in the order
    /// given, or every stack when `names` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStack`] for a name not in the file.
    pub fn select(&self, names: &[String]) -> Result<Vec<DeployRequest>> {
        if names.is_empty() {
            return Ok(self.requests());
        }

        names
            .iter()
            .map(|name| {
                self.stack(name)
                    .map(|stack| self.with_defaults(stack))
                    .ok_or_else(|| {
                        StackDeployError::Config(ConfigError::UnknownStack { name: name.clone() })
                    })
            })
            .collect()
    }

    /// Returns a stack by name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&DeployRequest> {
        self.stacks.iter().find(|stack| stack.name == name)
    }

    fn with_defaults(&self, stack: &DeployRequest) -> DeployRequest {
        let mut request = stack.clone();
        request.approve.get_or_insert(self.defaults.approve);
        request.read_outputs.get_or_insert(self.defaults.read_outputs);
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_unset_fields_only() {
        let config: DeployConfig = serde_yaml::from_str(
            "
defaults:
  approve: true
  read_outputs: true
stacks:
  - name: web
    template_body: '{}'
  - name: db
    template_body: '{}'
    approve: false
",
        )
        .expect("config");

        let requests = config.requests();
        assert_eq!(requests[0].approve, Some(true));
        assert_eq!(requests[0].read_outputs, Some(true));
        assert_eq!(requests[1].approve, Some(false));
        assert!(config.defaults.log_events);
        assert_eq!(config.defaults.change_set_prefix, DEFAULT_CHANGE_SET_PREFIX);
    }

    #[test]
    fn test_select_keeps_requested_order() {
        let config: DeployConfig = serde_yaml::from_str(
            "
stacks:
  - name: web
    use_previous_template: true
  - name: db
    use_previous_template: true
",
        )
        .expect("config");

        let selected = config
            .select(&[String::from("db"), String::from("web")])
            .expect("selection");
        let names: Vec<&str> = selected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["db", "web"]);

        let err = config.select(&[String::from("cache")]).expect_err("unknown");
        assert!(err.to_string().contains("cache"));
    }

    #[test]
    fn test_polling_defaults() {
        let polling = PollingConfig::default();
        assert_eq!(
            polling.change_set_policy(),
            RetryPolicy::fixed(20, Duration::from_secs(2))
        );
        assert_eq!(polling.watch_settings(), WatchSettings::default());
        assert_eq!(polling.stack_wait_timeout(), Duration::from_secs(3_600));
    }
}
