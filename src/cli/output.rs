//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use std::collections::BTreeMap;
use std::fmt::Write;

use colored::Colorize;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::orchestrator::{DeployOutcome, Disposition};
use crate::provider::ResourceChange;

use super::commands::OutputFormat;

/// Longest cell shown in the change table.
const MAX_CELL_WIDTH: usize = 48;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Resource change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Logical ID")]
    logical_id: String,
    #[tabled(rename = "Physical ID")]
    physical_id: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Replacement")]
    replacement: String,
}

/// Deployment outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Stack")]
    stack: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Change Set")]
    change_set: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the selected format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats the outcomes of a deploy run.
    #[must_use]
    pub fn format_outcomes(&self, outcomes: &[DeployOutcome]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcomes).unwrap_or_default(),
            OutputFormat::Text => Self::format_outcomes_text(outcomes),
        }
    }

    fn format_outcomes_text(outcomes: &[DeployOutcome]) -> String {
        if outcomes.is_empty() {
            return String::from("No stacks deployed.\n");
        }

        let rows: Vec<OutcomeRow> = outcomes
            .iter()
            .map(|o| OutcomeRow {
                stack: o.stack.clone(),
                kind: o.kind.as_str().to_lowercase(),
                result: Self::format_disposition(o.disposition),
                change_set: o.change_set_name.clone(),
            })
            .collect();

        let mut output = Table::new(rows).to_string();
        output.push('\n');

        for outcome in outcomes.iter().filter(|o| !o.outputs.is_empty()) {
            let _ = write!(output, "\nOutputs of {}:\n", outcome.stack.bold());
            output.push_str(&Self::format_outputs_text(&outcome.outputs));
        }

        output
    }

    /// Formats a stack's outputs.
    #[must_use]
    pub fn format_outputs(&self, outputs: &BTreeMap<String, String>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outputs).unwrap_or_default(),
            OutputFormat::Text => {
                if outputs.is_empty() {
                    String::from("   No outputs.\n")
                } else {
                    Self::format_outputs_text(outputs)
                }
            }
        }
    }

    fn format_outputs_text(outputs: &BTreeMap<String, String>) -> String {
        let width = outputs.keys().map(String::len).max().unwrap_or(0);
        let mut output = String::new();
        for (key, value) in outputs {
            let _ = writeln!(output, "   {key:<width$}  {value}");
        }
        output
    }

    /// Formats the resource changes of a change set awaiting approval.
    #[must_use]
    pub fn format_changes(&self, stack: &str, changes: &[ResourceChange]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "stack": stack,
                "changes": changes,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => Self::format_changes_text(stack, changes),
        }
    }

    fn format_changes_text(stack: &str, changes: &[ResourceChange]) -> String {
        let mut output = String::new();
        let _ = write!(output, "\nChanges for stack {}:\n\n", stack.bold());

        if changes.is_empty() {
            output.push_str("   No resource changes.\n");
            return output;
        }

        let rows: Vec<ChangeRow> = changes
            .iter()
            .map(|c| ChangeRow {
                action: Self::format_action(c.action.as_deref()),
                logical_id: Self::cell(c.logical_id.as_deref()),
                physical_id: Self::cell(c.physical_id.as_deref()),
                resource_type: Self::cell(c.resource_type.as_deref()),
                replacement: Self::format_replacement(c.replacement.as_deref()),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let replaced = changes
            .iter()
            .filter(|c| matches!(c.replacement.as_deref(), Some("True" | "Conditional")))
            .count();
        if replaced > 0 {
            let _ = write!(
                output,
                "\n{} {replaced} resource(s) may be replaced.\n",
                "⚠".yellow()
            );
        }

        output
    }

    /// Formats a configuration validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "valid": result.is_valid(),
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid!\n", "✓".green())
                } else {
                    let mut output = format!(
                        "{} Configuration has {} error(s):\n",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                    output
                };

                if show_warnings && result.warning_count() > 0 {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output
            }
        }
    }

    /// Formats a failure diagnosis.
    #[must_use]
    pub fn format_diagnosis(&self, stack: &str, report: &str) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "stack": stack,
                "report": report,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_empty() {
                    format!("{} No failure events for stack {stack}.\n", "✓".green())
                } else {
                    format!(
                        "{} Failures for stack {}:\n\n{report}\n",
                        "✗".red(),
                        stack.bold()
                    )
                }
            }
        }
    }

    fn format_disposition(disposition: Disposition) -> String {
        match disposition {
            Disposition::Executed => format!("{} executed", "✓".green()),
            Disposition::NoChanges => "no changes".dimmed().to_string(),
            Disposition::Aborted => format!("{} aborted", "✗".yellow()),
        }
    }

    fn format_action(action: Option<&str>) -> String {
        match action {
            Some("Add") => "+add".green().to_string(),
            Some("Modify") => "~modify".yellow().to_string(),
            Some("Remove") => "-remove".red().to_string(),
            Some(other) => other.to_lowercase(),
            None => String::from("-"),
        }
    }

    fn format_replacement(replacement: Option<&str>) -> String {
        match replacement {
            Some("True") => "yes".red().to_string(),
            Some("Conditional") => "conditional".yellow().to_string(),
            Some("False") => String::from("no"),
            Some(other) => other.to_string(),
            None => String::from("-"),
        }
    }

    fn cell(value: Option<&str>) -> String {
        value.map_or_else(|| String::from("-"), |v| Self::truncate(v, MAX_CELL_WIDTH))
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}
