//! Configuration module for stackdeploy.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `stackdeploy.yaml`
//! - Environment and `.env` overrides
//! - Validation of configuration values

mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{DefaultsConfig, DeployConfig, PollingConfig, UploadConfig};
pub use validator::{ConfigIssue, ConfigValidator, ValidationResult};
