// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stackdeploy
//!
//! Change-set based deployment of `CloudFormation` stacks.
//!
//! ## Overview
//!
//! Stackdeploy turns a YAML description of stacks into safe, observable
//! deployments:
//!
//! - Every deploy goes through a change set, so nothing changes before the
//!   diff has been computed (and optionally approved)
//! - Stacks left in transient or failed states are reconciled first
//! - Stack events stream to the terminal while operations run
//! - Failed operations are diagnosed from the event history
//!
//! ## Architecture
//!
//! 1. **Request**: a [`DeployRequest`] from `stackdeploy.yaml`
//! 2. **Reconcile**: wait out or replace the existing stack
//! 3. **Change set**: create, poll and (after approval) execute
//! 4. **Monitor**: stream events and report failures
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`provider`]: Provider trait and the `CloudFormation` client
//! - [`upload`]: Template upload to S3
//! - [`deployer`]: Change-set lifecycle
//! - [`reconciler`]: Pre-deploy stack state reconciliation
//! - [`events`]: Event streaming, printing and failure diagnosis
//! - [`orchestrator`]: Deployment sequencing
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! defaults:
//!   region: eu-west-1
//!
//! upload:
//!   bucket: my-templates
//!
//! stacks:
//!   - name: network
//!     template_file: templates/network.yaml
//!     parameters:
//!       CidrBlock: 10.0.0.0/16
//!     tags:
//!       team: platform
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod deployer;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod params;
pub mod provider;
pub mod reconciler;
pub mod retry;
pub mod upload;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DeployConfig};
pub use error::{Result, StackDeployError};
pub use events::{EventMonitor, EventWatcher};
pub use orchestrator::{Approver, DeployOutcome, DeployRequest, Disposition, Orchestrator};
pub use provider::{CloudFormationClient, ResourceGroupClient};
pub use reconciler::Reconciler;
pub use upload::{S3TemplateUploader, TemplateUploader};
