//! Configuration validation for deployment files.
//!
//! This module checks a parsed configuration before any network call:
//! stack names, template sources, upload bucket naming and polling budgets.

use std::collections::HashSet;

use tracing::debug;

use super::spec::{DeployConfig, PollingConfig, UploadConfig};
use crate::error::{ConfigError, Result, StackDeployError};
use crate::orchestrator::{DeployRequest, TemplateSource};
use crate::provider::INLINE_TEMPLATE_LIMIT;

/// Capabilities the provider understands.
const KNOWN_CAPABILITIES: &[&str] = &[
    "CAPABILITY_IAM",
    "CAPABILITY_NAMED_IAM",
    "CAPABILITY_AUTO_EXPAND",
];

/// Longest stack name the provider accepts.
const MAX_STACK_NAME_LEN: usize = 128;

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Whether referenced template files must exist.
    check_files: bool,
}

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ConfigIssue>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ConfigIssue {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a validator that also checks template files exist.
    #[must_use]
    pub const fn new() -> Self {
        Self { check_files: true }
    }

    /// Skips the template file existence check.
    #[must_use]
    pub const fn without_file_checks(mut self) -> Self {
        self.check_files = false;
        self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found; the returned result also carries any
    /// warnings.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(StackDeployError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Runs every check and returns all errors and warnings found.
    #[must_use]
    pub fn check(&self, config: &DeployConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_defaults(config, &mut result);
        if let Some(upload) = &config.upload {
            Self::validate_upload(upload, &mut result);
        }
        Self::validate_polling(&config.polling, &mut result);
        self.validate_stacks(config, &mut result);

        result
    }

    fn validate_defaults(config: &DeployConfig, result: &mut ValidationResult) {
        let prefix = &config.defaults.change_set_prefix;
        if !prefix.is_empty() && !is_valid_change_set_prefix(prefix) {
            result.errors.push(ConfigIssue {
                field: String::from("defaults.change_set_prefix"),
                message: format!(
                    "Change set prefix '{prefix}' is invalid. Must start with a letter and contain only letters, digits and hyphens."
                ),
            });
        }
    }

    fn validate_upload(upload: &UploadConfig, result: &mut ValidationResult) {
        if !is_valid_bucket_name(&upload.bucket) {
            result.errors.push(ConfigIssue {
                field: String::from("upload.bucket"),
                message: format!(
                    "Bucket name '{}' is invalid. Must be 3-63 lowercase letters, digits, dots or hyphens.",
                    upload.bucket
                ),
            });
        }
    }

    fn validate_polling(polling: &PollingConfig, result: &mut ValidationResult) {
        let budgets = [
            ("polling.change_set_attempts", u64::from(polling.change_set_attempts)),
            ("polling.event_retry_attempts", u64::from(polling.event_retry_attempts)),
            ("polling.stack_wait_timeout_secs", polling.stack_wait_timeout_secs),
            ("polling.stack_wait_interval_secs", polling.stack_wait_interval_secs),
        ];

        for (field, value) in budgets {
            if value == 0 {
                result.errors.push(ConfigIssue {
                    field: field.to_string(),
                    message: format!("{field} must be at least 1"),
                });
            }
        }
    }

    fn validate_stacks(&self, config: &DeployConfig, result: &mut ValidationResult) {
        if config.stacks.is_empty() {
            result.warnings.push(String::from("No stacks defined in configuration"));
            return;
        }

        let mut seen_names = HashSet::new();

        for (i, stack) in config.stacks.iter().enumerate() {
            let prefix = format!("stacks[{i}]");

            if !seen_names.insert(stack.name.as_str()) {
                result.errors.push(ConfigIssue {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate stack name: {}", stack.name),
                });
            }

            if !is_valid_stack_name(&stack.name) {
                result.errors.push(ConfigIssue {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Stack name '{}' is invalid. Must start with a letter, contain only letters, digits and hyphens, and be at most {MAX_STACK_NAME_LEN} characters.",
                        stack.name
                    ),
                });
            }

            self.validate_template(stack, config.upload.is_some(), &prefix, result);

            for capability in &stack.capabilities {
                if !KNOWN_CAPABILITIES.contains(&capability.as_str()) {
                    result.warnings.push(format!(
                        "{prefix}.capabilities: unknown capability '{capability}'"
                    ));
                }
            }
        }
    }

    fn validate_template(
        &self,
        stack: &DeployRequest,
        has_uploader: bool,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        match stack.template_source() {
            Ok(TemplateSource::File(path)) => {
                if self.check_files && !path.exists() {
                    result.errors.push(ConfigIssue {
                        field: format!("{prefix}.template_file"),
                        message: format!("Template file not found: {}", path.display()),
                    });
                }
            }
            Ok(TemplateSource::Body(body)) => {
                if !has_uploader && body.len() > INLINE_TEMPLATE_LIMIT {
                    result.errors.push(ConfigIssue {
                        field: format!("{prefix}.template_body"),
                        message: format!(
                            "Template is {} bytes, over the {INLINE_TEMPLATE_LIMIT} byte inline limit; configure an upload bucket",
                            body.len()
                        ),
                    });
                }
            }
            Ok(TemplateSource::Inline(_) | TemplateSource::UsePrevious) => {}
            Err(err) => result.errors.push(ConfigIssue {
                field: format!("{prefix}.template"),
                message: err.to_string(),
            }),
        }
    }
}

/// Stack names start with a letter and contain letters, digits and hyphens.
fn is_valid_stack_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_alphabetic()
        && name.len() <= MAX_STACK_NAME_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_change_set_prefix(prefix: &str) -> bool {
    is_valid_stack_name(prefix)
}

/// S3 bucket naming: 3-63 characters of lowercase letters, digits, dots and
/// hyphens, starting and ending with a letter or digit.
fn is_valid_bucket_name(name: &str) -> bool {
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());

    (3..=63).contains(&name.len())
        && edge_ok(name.chars().next())
        && edge_ok(name.chars().last())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
        && !name.contains("..")
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> DeployConfig {
        ConfigParser::new().parse_yaml(yaml, None).expect("config")
    }

    #[test]
    fn test_valid_stack_name() {
        assert!(is_valid_stack_name("web"));
        assert!(is_valid_stack_name("Clarity-Master-2"));
        assert!(!is_valid_stack_name(""));
        assert!(!is_valid_stack_name("2fast"));
        assert!(!is_valid_stack_name("web_app"));
        assert!(!is_valid_stack_name(&"a".repeat(129)));
    }

    #[test]
    fn test_valid_bucket_name() {
        assert!(is_valid_bucket_name("my-templates"));
        assert!(is_valid_bucket_name("templates.example.com"));
        assert!(!is_valid_bucket_name("ab"));
        assert!(!is_valid_bucket_name("My-Templates"));
        assert!(!is_valid_bucket_name("-templates"));
        assert!(!is_valid_bucket_name("templates..x"));
    }

    #[test]
    fn test_collects_all_errors() {
        let config = parse(
            "
polling:
  change_set_attempts: 0
stacks:
  - name: web
    template_body: '{}'
  - name: web
    template_body: '{}'
    use_previous_template: true
  - name: db_main
",
        );

        let validator = ConfigValidator::new().without_file_checks();
        let result = validator.check(&config);

        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "polling.change_set_attempts",
                "stacks[1].name",
                "stacks[1].template",
                "stacks[2].name",
                "stacks[2].template",
            ]
        );
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_missing_template_file() {
        let config = parse(
            "
stacks:
  - name: web
    template_file: /nonexistent/web.yaml
",
        );

        let err = ConfigValidator::new().validate(&config).expect_err("missing file");
        assert!(err.to_string().contains("Template file not found"));
        assert!(ConfigValidator::new().without_file_checks().validate(&config).is_ok());
    }

    #[test]
    fn test_large_inline_body_needs_upload() {
        let body = format!("{{\"Description\":\"{}\"}}", "x".repeat(INLINE_TEMPLATE_LIMIT));
        let mut config = parse("stacks: []");
        let mut stack = DeployRequest::new("web");
        stack.template_body = Some(body);
        config.stacks.push(stack);

        assert!(ConfigValidator::new().validate(&config).is_err());

        config.upload = Some(UploadConfig {
            bucket: String::from("my-templates"),
            ..UploadConfig::default()
        });
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_capability_warns() {
        let config = parse(
            "
stacks:
  - name: web
    use_previous_template: true
    capabilities: [CAPABILITY_IAM, CAPABILITY_EVERYTHING]
",
        );

        let result = ConfigValidator::new().validate(&config).expect("valid");
        assert_eq!(result.warning_count(), 1);
        assert!(result.warnings[0].contains("CAPABILITY_EVERYTHING"));
    }
}
