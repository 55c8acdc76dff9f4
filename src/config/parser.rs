//! Configuration parser for loading deployment files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::spec::{DeployConfig, UploadConfig};
use crate::error::{ConfigError, Result, StackDeployError};

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "stackdeploy.yaml",
    "stackdeploy.yml",
    "deploy.yaml",
    "deploy.yml",
];

/// Configuration parser for loading deployment configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// Relative `template_file` entries are resolved against the base path,
    /// or the file's own directory when no base path is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(StackDeployError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StackDeployError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut config = self.parse_yaml(&content, Some(path))?;

        let base = self
            .base_path
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf));
        if let Some(base) = base {
            Self::resolve_template_paths(&mut config, &base);
        }

        Ok(config)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StackDeployError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed configuration with {} stacks", config.stacks.len());
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognised variables: `STACKDEPLOY_REGION`,
    /// `STACKDEPLOY_UPLOAD_BUCKET`, `STACKDEPLOY_UPLOAD_PREFIX` and
    /// `STACKDEPLOY_CHANGE_SET_PREFIX`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies overrides from `lookup` to the configuration.
    fn apply_overrides(config: &mut DeployConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(region) = lookup("STACKDEPLOY_REGION") {
            debug!("Overriding defaults.region from environment");
            config.defaults.region = Some(region);
        }

        if let Some(prefix) = lookup("STACKDEPLOY_CHANGE_SET_PREFIX") {
            debug!("Overriding defaults.change_set_prefix from environment");
            config.defaults.change_set_prefix = prefix;
        }

        if let Some(bucket) = lookup("STACKDEPLOY_UPLOAD_BUCKET") {
            debug!("Overriding upload.bucket from environment");
            config.upload.get_or_insert_with(UploadConfig::default).bucket = bucket;
        }

        if let Some(prefix) = lookup("STACKDEPLOY_UPLOAD_PREFIX") {
            if let Some(upload) = config.upload.as_mut() {
                debug!("Overriding upload.prefix from environment");
                upload.prefix = Some(prefix);
            } else {
                debug!("Ignoring STACKDEPLOY_UPLOAD_PREFIX without an upload bucket");
            }
        }
    }

    /// Makes relative template paths absolute against `base`.
    fn resolve_template_paths(config: &mut DeployConfig, base: &Path) {
        for stack in &mut config.stacks {
            if let Some(file) = stack.template_file.as_mut()
                && file.is_relative()
            {
                *file = base.join(&*file);
            }
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StackDeployError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StackDeployError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
