//! CLI module for the stackdeploy tool.
//!
//! This module provides the command-line interface for deploying
//! `CloudFormation` stacks through change sets.

mod commands;
mod output;
mod prompt;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
pub use prompt::StdinApprover;
