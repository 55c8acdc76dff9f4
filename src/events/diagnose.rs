//! Failure diagnosis.
//!
//! After a failed operation the stack's event history holds the reason.
//! This module picks out the events that explain the failure and renders
//! each as a small block of labelled fields.

use std::fmt::Write;
use std::sync::LazyLock;

use colored::Colorize;
use regex::Regex;
use serde_json::{Map, Value};

use super::history::current_events;
use crate::error::Result;
use crate::provider::{ResourceGroupClient, StatusEvent};

/// Label column width.
const PADDING: usize = 25;

/// Wrap width for status reasons.
const REASON_WIDTH: usize = 80;

/// Statuses that explain a failure.
#[allow(clippy::expect_used)]
static FAILURE_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(CREATE|UPDATE)_FAILED|ROLLBACK_IN_PROGRESS").expect("valid failure status pattern")
});

/// Reasons that only echo a sibling's failure.
#[allow(clippy::expect_used)]
static NOISY_REASON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)resource creation cancell?ed|the following resource\(?s?\)? failed")
        .expect("valid noisy reason pattern")
});

/// Returns true if the event explains a failure.
#[must_use]
pub fn is_failure_event(event: &StatusEvent) -> bool {
    FAILURE_STATUS.is_match(&event.status)
        && !event
            .reason
            .as_deref()
            .is_some_and(|reason| NOISY_REASON.is_match(reason))
}

/// Wraps `text` to `width` columns, preferring to break on whitespace in
/// the second half of a line.
#[must_use]
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let width = width.max(2);
    let mut lines = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        if chars.len() - start <= width {
            lines.push(chars[start..].iter().collect());
            break;
        }

        let end = (start + width / 2 + 1..=start + width)
            .rev()
            .find(|&i| chars[i].is_whitespace())
            .unwrap_or(start + width);

        lines.push(chars[start..end].iter().collect());
        start = if chars[end].is_whitespace() { end + 1 } else { end };
    }

    lines
}

/// Renders one failure event.
#[must_use]
pub fn render_failure(event: &StatusEvent) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{:<PADDING$} {}", "ResourceStatus", event.status.red());
    let _ = writeln!(
        out,
        "{:<PADDING$} {}",
        "ResourceType",
        event.resource_type.as_deref().unwrap_or_default()
    );
    let _ = writeln!(out, "{:<PADDING$} {}", "LogicalResourceId", event.logical_id.bold());
    let _ = writeln!(
        out,
        "{:<PADDING$} {}",
        "PhysicalResourceId",
        event.physical_id.as_deref().unwrap_or_default().bold()
    );

    if let Some(reason) = event.reason.as_deref().filter(|r| !r.is_empty()) {
        out.push_str("ResourceStatusReason\n");
        for line in wrap_text(reason, REASON_WIDTH) {
            let _ = writeln!(out, "  {}", line.bold());
        }
    }

    if let Some(properties) = event.properties.as_deref().filter(|p| !p.is_empty()) {
        out.push_str("ResourceProperties\n");
        match serde_json::from_str::<Map<String, Value>>(properties) {
            Ok(parsed) => {
                for (name, value) in parsed {
                    let value = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    let _ = writeln!(
                        out,
                        "  {} {}",
                        format!("{name:<width$}", width = PADDING - 2).bright_black(),
                        value.bold()
                    );
                }
            }
            Err(_) => {
                let _ = writeln!(out, "  {properties}");
            }
        }
    }

    out
}

/// Renders every failure event of the stack's current operation, oldest
/// last as the provider reports them. Returns an empty string when nothing
/// failed.
///
/// # Errors
///
/// Returns any provider error.
pub async fn diagnose_failure(client: &dyn ResourceGroupClient, group: &str) -> Result<String> {
    let events = current_events(client, group, None).await?;

    Ok(events
        .iter()
        .filter(|event| is_failure_event(event))
        .map(|event| render_failure(event) + "\n")
        .collect())
}
