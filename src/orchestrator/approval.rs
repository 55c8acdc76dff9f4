//! Operator approval gates.

use async_trait::async_trait;

use crate::error::Result;
use crate::provider::{GroupStatus, ResourceChange};

/// Asks an operator to confirm destructive or state-changing steps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Approver: Send + Sync {
    /// Shows the computed changes of `group` and returns whether to
    /// execute them.
    ///
    /// # Errors
    ///
    /// Returns an error if the operator could not be asked.
    async fn approve_changes(&self, group: &str, changes: &[ResourceChange]) -> Result<bool>;

    /// Asks whether `group`, stuck in the failed-creation `status`, may be
    /// deleted so it can be created again.
    ///
    /// # Errors
    ///
    /// Returns an error if the operator could not be asked.
    async fn approve_replacement(&self, group: &str, status: &GroupStatus) -> Result<bool>;
}
