//! Parameter and tag normalization.
//!
//! Callers may describe parameters and tags either as an ordered key/value
//! map or as an explicit list of entries. Everything downstream works on a
//! single canonical form: an ordered list of key/value structs.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single template parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub key: String,
    /// Parameter value (absent when reusing the previous value).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Reuse the value currently applied to the stack.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub use_previous_value: bool,
}

/// A single resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// Parameters as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterInput {
    /// Explicit list of entries.
    List(Vec<Parameter>),
    /// Ordered map of name to JSON value.
    Map(IndexMap<String, Value>),
}

/// Tags as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagInput {
    /// Explicit list of entries.
    List(Vec<Tag>),
    /// Ordered map of key to JSON value.
    Map(IndexMap<String, Value>),
}

/// Normalized, ordered parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet(Vec<Parameter>);

/// Normalized, ordered tag list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<Tag>);

/// Coerces a JSON value to the string the provider expects.
///
/// `null` yields `None` so the entry is dropped.
fn coerce(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // List-typed parameters are comma delimited
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(coerce)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

impl Parameter {
    /// Creates a parameter with an explicit value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            use_previous_value: false,
        }
    }

    /// Creates a parameter that reuses the stack's current value.
    #[must_use]
    pub fn use_previous(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            use_previous_value: true,
        }
    }
}

impl Tag {
    /// Creates a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl ParameterSet {
    /// Normalizes caller input into the canonical list form.
    ///
    /// Map entries with a `null` value are dropped; list entries are kept
    /// as given. Source order is preserved.
    #[must_use]
    pub fn normalize(input: ParameterInput) -> Self {
        match input {
            ParameterInput::List(list) => Self(list),
            ParameterInput::Map(map) => Self(
                map.iter()
                    .filter_map(|(key, value)| coerce(value).map(|v| Parameter::new(key, v)))
                    .collect(),
            ),
        }
    }

    /// Drops every "use previous value" request.
    ///
    /// Required when creating a new stack, which has no previous values.
    #[must_use]
    pub fn without_previous_values(self) -> Self {
        Self(self.0.into_iter().filter(|p| !p.use_previous_value).collect())
    }

    /// Drops "use previous value" requests for names the stack does not
    /// currently declare.
    #[must_use]
    pub fn retain_known_previous(self, declared: &HashSet<String>) -> Self {
        Self(
            self.0
                .into_iter()
                .filter(|p| !p.use_previous_value || declared.contains(&p.key))
                .collect(),
        )
    }

    /// Returns the parameters as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Parameter] {
        &self.0
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the canonical list as caller input.
    #[must_use]
    pub fn into_input(self) -> ParameterInput {
        ParameterInput::List(self.0)
    }
}

impl TagSet {
    /// Normalizes caller input into the canonical list form.
    #[must_use]
    pub fn normalize(input: TagInput) -> Self {
        match input {
            TagInput::List(list) => Self(list),
            TagInput::Map(map) => Self(
                map.iter()
                    .filter_map(|(key, value)| coerce(value).map(|v| Tag::new(key, v)))
                    .collect(),
            ),
        }
    }

    /// Returns the tags as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Tag] {
        &self.0
    }

    /// Returns true if there are no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Parameter>> for ParameterSet {
    fn from(list: Vec<Parameter>) -> Self {
        Self(list)
    }
}

impl From<Vec<Tag>> for TagSet {
    fn from(list: Vec<Tag>) -> Self {
        Self(list)
    }
}
