//! Deploy requests and outcomes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deployer::ChangeSetInput;
use crate::error::{ConfigError, Result, StackDeployError, ValidationError};
use crate::params::{ParameterInput, ParameterSet, TagInput, TagSet};
use crate::provider::ChangeSetKind;

/// Everything needed to deploy one stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Stack name.
    pub name: String,

    /// Inline template document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Value>,

    /// Path to a template file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,

    /// Raw template text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_body: Option<String>,

    /// Keep the template currently applied to the stack.
    #[serde(default)]
    pub use_previous_template: bool,

    /// Template parameters, as a map or a list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterInput>,

    /// Stack tags, as a map or a list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagInput>,

    /// Acknowledged capabilities (e.g. `CAPABILITY_IAM`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,

    /// Service role the provider assumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,

    /// Notification topics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notification_arns: Vec<String>,

    /// Stack policy, as a JSON document or its text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_policy: Option<Value>,

    /// Read the stack outputs after deploying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_outputs: Option<bool>,

    /// Delete and recreate a stack whose creation failed.
    #[serde(default)]
    pub replace_if_create_failed: bool,

    /// Ask for approval before executing changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve: Option<bool>,
}

/// Where a request's template comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateSource<'a> {
    /// Inline document.
    Inline(&'a Value),
    /// File on disk.
    File(&'a Path),
    /// Raw text.
    Body(&'a str),
    /// The template already applied to the stack.
    UsePrevious,
}

impl DeployRequest {
    /// Creates a request for `name` with no template source.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Checks the stack name and returns the single template source.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name, for no template
    /// source, or for more than one.
    pub fn template_source(&self) -> Result<TemplateSource<'_>> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingStackName.into());
        }

        let mut sources = Vec::new();
        if let Some(template) = &self.template {
            sources.push(("template", TemplateSource::Inline(template)));
        }
        if let Some(path) = &self.template_file {
            sources.push(("template_file", TemplateSource::File(path)));
        }
        if let Some(body) = &self.template_body {
            sources.push(("template_body", TemplateSource::Body(body)));
        }
        if self.use_previous_template {
            sources.push(("use_previous_template", TemplateSource::UsePrevious));
        }

        match sources.as_slice() {
            [] => Err(ValidationError::MissingTemplate {
                stack: self.name.clone(),
            }
            .into()),
            [(_, source)] => Ok(*source),
            many => Err(ValidationError::AmbiguousTemplate {
                stack: self.name.clone(),
                sources: many
                    .iter()
                    .map(|(field, _)| *field)
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .into()),
        }
    }

    /// Returns the template text, or `None` when reusing the previous
    /// template.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad template source, a config error
    /// for a missing file, and an I/O error for an unreadable one.
    pub async fn resolve_template_body(&self) -> Result<Option<String>> {
        match self.template_source()? {
            TemplateSource::Inline(template) => serde_json::to_string(template)
                .map(Some)
                .map_err(|e| {
                    ValidationError::TemplateSerialization {
                        stack: self.name.clone(),
                        message: e.to_string(),
                    }
                    .into()
                }),
            TemplateSource::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(body) => Ok(Some(body)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(StackDeployError::Config(ConfigError::FileNotFound {
                        path: path.to_path_buf(),
                    }))
                }
                Err(err) => Err(err.into()),
            },
            TemplateSource::Body(body) => Ok(Some(body.to_string())),
            TemplateSource::UsePrevious => Ok(None),
        }
    }

    /// Returns the stack policy as text.
    #[must_use]
    pub fn policy_body(&self) -> Option<String> {
        self.stack_policy.as_ref().map(|policy| match policy {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }

    /// Builds the change-set input for a resolved template body.
    #[must_use]
    pub fn change_set_input(&self, template_body: Option<String>) -> ChangeSetInput {
        ChangeSetInput {
            group_name: self.name.clone(),
            use_previous_template: template_body.is_none() && self.use_previous_template,
            template_body,
            parameters: self
                .parameters
                .clone()
                .map(ParameterSet::normalize)
                .unwrap_or_default(),
            capabilities: self.capabilities.clone(),
            role_arn: self.role_arn.clone(),
            notification_arns: self.notification_arns.clone(),
            tags: self.tags.clone().map(TagSet::normalize).unwrap_or_default(),
        }
    }
}

/// How a deployment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The change set was executed.
    Executed,
    /// The stack already matched the template.
    NoChanges,
    /// The operator declined the changes.
    Aborted,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Executed => write!(f, "executed"),
            Self::NoChanges => write!(f, "no changes"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Result of deploying one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployOutcome {
    /// Stack name.
    pub stack: String,
    /// Change-set name.
    pub change_set_name: String,
    /// Whether the stack was created or updated.
    pub kind: ChangeSetKind,
    /// Whether the change set had changes.
    pub has_changes: bool,
    /// How the deployment ended.
    pub disposition: Disposition,
    /// Stack outputs, when requested.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    fn request() -> DeployRequest {
        DeployRequest::new("app")
    }

    #[test]
    fn test_requires_a_template_source() {
        let err = request().template_source().expect_err("no source");
        assert!(matches!(
            err,
            StackDeployError::Validation(ValidationError::MissingTemplate { .. })
        ));
    }

    #[test]
    fn test_requires_a_name() {
        let mut req = DeployRequest::new("  ");
        req.use_previous_template = true;
        assert!(matches!(
            req.template_source(),
            Err(StackDeployError::Validation(ValidationError::MissingStackName))
        ));
    }

    #[test]
    fn test_rejects_two_sources() {
        let mut req = request();
        req.template_body = Some(String::from("{}"));
        req.use_previous_template = true;

        let err = req.template_source().expect_err("ambiguous");
        match err {
            StackDeployError::Validation(ValidationError::AmbiguousTemplate { sources, .. }) => {
                assert_eq!(sources, "template_body, use_previous_template");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_inline_template_is_serialized() {
        let mut req = request();
        req.template = Some(json!({"Resources": {"Topic": {"Type": "AWS::SNS::Topic"}}}));

        let body = req.resolve_template_body().await.expect("body");
        assert_eq!(
            body.as_deref(),
            Some(r#"{"Resources":{"Topic":{"Type":"AWS::SNS::Topic"}}}"#)
        );
    }

    #[tokio::test]
    async fn test_template_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "Resources: {{}}").expect("write");
        let mut req = request();
        req.template_file = Some(file.path().to_path_buf());

        let body = req.resolve_template_body().await.expect("body");
        assert_eq!(body.as_deref(), Some("Resources: {}"));
    }

    #[tokio::test]
    async fn test_missing_template_file() {
        let mut req = request();
        req.template_file = Some(PathBuf::from("/nonexistent/stack.yaml"));

        let err = req.resolve_template_body().await.expect_err("missing");
        assert!(matches!(
            err,
            StackDeployError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_change_set_input_normalizes_inputs() {
        let mut req: DeployRequest = serde_yaml::from_str(
            "
name: app
use_previous_template: true
parameters:
  Env: prod
  Port: 8080
  Subnets: [a, b]
tags:
  team: web
",
        )
        .expect("request");
        req.stack_policy = Some(json!({"Statement": []}));

        let input = req.change_set_input(None);

        assert!(input.use_previous_template);
        let params: Vec<(&str, Option<&str>)> = input
            .parameters
            .as_slice()
            .iter()
            .map(|p| (p.key.as_str(), p.value.as_deref()))
            .collect();
        assert_eq!(
            params,
            vec![("Env", Some("prod")), ("Port", Some("8080")), ("Subnets", Some("a,b"))]
        );
        assert_eq!(input.tags.as_slice()[0].key, "team");
        assert_eq!(req.policy_body().as_deref(), Some(r#"{"Statement":[]}"#));
    }
}
