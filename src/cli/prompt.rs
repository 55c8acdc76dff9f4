//! Interactive approval on the terminal.

use std::io::Write;

use async_trait::async_trait;

use crate::error::{Result, StackDeployError};
use crate::orchestrator::Approver;
use crate::provider::{GroupStatus, ResourceChange};

use super::commands::OutputFormat;
use super::output::OutputFormatter;

/// Approver that shows changes on stderr and reads the answer from stdin.
#[derive(Debug)]
pub struct StdinApprover {
    /// Formatter for the change table.
    formatter: OutputFormatter,
}

impl StdinApprover {
    /// Creates a new terminal approver.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            formatter: OutputFormatter::new(OutputFormat::Text),
        }
    }

    async fn ask(question: String) -> Result<bool> {
        tokio::task::spawn_blocking(move || -> Result<bool> {
            eprint!("{question} [y/N]: ");
            std::io::stderr().flush()?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            Ok(is_yes(&input))
        })
        .await
        .map_err(|e| StackDeployError::internal(format!("Approval prompt failed: {e}")))?
    }
}

impl Default for StdinApprover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Approver for StdinApprover {
    async fn approve_changes(&self, group: &str, changes: &[ResourceChange]) -> Result<bool> {
        eprintln!("{}", self.formatter.format_changes(group, changes));
        Self::ask(format!("Execute these changes on {group}?")).await
    }

    async fn approve_replacement(&self, group: &str, status: &GroupStatus) -> Result<bool> {
        Self::ask(format!(
            "Stack {group} is in {status} and must be deleted before it can be created again. Delete it?"
        ))
        .await
    }
}

/// Accepts `y` or `yes` in any case.
fn is_yes(input: &str) -> bool {
    let answer = input.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}
