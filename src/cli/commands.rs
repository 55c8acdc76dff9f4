//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stackdeploy - change-set based `CloudFormation` deployments.
#[derive(Parser, Debug)]
#[command(name = "stackdeploy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "STACKDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    /// AWS region (overrides the configuration file).
    #[arg(short, long, global = true)]
    pub region: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy stacks from the configuration.
    Deploy {
        /// Stacks to deploy (defaults to every stack in the file).
        #[arg(short = 's', long = "stack")]
        stacks: Vec<String>,

        /// Skip the approval prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Stream a stack's events until it settles.
    Watch {
        /// Stack name.
        stack: String,

        /// Only show events after this time (RFC 3339).
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },

    /// Show the failure events of a stack's last operation.
    Diagnose {
        /// Stack name.
        stack: String,
    },

    /// Print a stack's outputs.
    Outputs {
        /// Stack name.
        stack: String,
    },

    /// Validate the deployment configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
