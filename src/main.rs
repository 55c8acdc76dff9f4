//! Stackdeploy CLI entrypoint.
//!
//! This is the main entrypoint for the stackdeploy command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::process::ExitCode;
use std::sync::Arc;

use stackdeploy::cli::{Cli, Commands, LogFormat, OutputFormat, OutputFormatter, StdinApprover};
use stackdeploy::config::{find_config_file, ConfigParser, ConfigValidator, DeployConfig};
use stackdeploy::error::Result;
use stackdeploy::events::{EventPrinter, EventSink, NullSink, StderrSink};
use stackdeploy::orchestrator::Orchestrator;
use stackdeploy::provider::{CloudFormationClient, ResourceGroupClient};
use stackdeploy::upload::S3TemplateUploader;

use chrono::{DateTime, Utc};
use clap::Parser;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();
    let region = cli.region.as_deref();

    match cli.command {
        Commands::Deploy { stacks, yes } => {
            cmd_deploy(config_path, region, &stacks, yes, &formatter).await
        }
        Commands::Watch { stack, since } => {
            cmd_watch(config_path, region, &stack, since, &formatter).await
        }
        Commands::Diagnose { stack } => cmd_diagnose(config_path, region, &stack, &formatter).await,
        Commands::Outputs { stack } => cmd_outputs(config_path, region, &stack, &formatter).await,
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
    }
}

/// Deploy stacks.
async fn cmd_deploy(
    config_path: Option<&PathBuf>,
    region: Option<&str>,
    stacks: &[String],
    yes: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut requests = config.select(stacks)?;

    if requests.is_empty() {
        eprintln!("No stacks to deploy.");
        return Ok(());
    }

    if yes {
        for request in &mut requests {
            request.approve = Some(false);
        }
    }

    let orchestrator = build_orchestrator(&config, region).await;

    let outcomes = if let [request] = requests.as_slice() {
        let orchestrator = orchestrator.with_approver(Arc::new(StdinApprover::new()));
        vec![orchestrator.deploy(request).await?]
    } else {
        if requests.iter().any(|r| r.approve == Some(true)) {
            warn!("Approval is skipped when deploying several stacks; use --stack to deploy one at a time");
        }
        info!("Deploying {} stacks", requests.len());

        let mut outcomes = Vec::new();
        let mut first_error = None;
        for result in orchestrator.deploy_all(&requests).await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        if !outcomes.is_empty() {
            emit(&formatter.format_outcomes(&outcomes))?;
        }
        return first_error.map_or(Ok(()), Err);
    };

    emit(&formatter.format_outcomes(&outcomes))
}

/// Stream a stack's events.
async fn cmd_watch(
    config_path: Option<&PathBuf>,
    region: Option<&str>,
    stack: &str,
    since: Option<DateTime<Utc>>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config_or_default(config_path)?;
    let orchestrator = build_orchestrator(&config, region).await;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let printer = EventPrinter::new();
    let mut events = pin!(orchestrator.watch_events(stack, since, cancel));

    if formatter.format() == OutputFormat::Text {
        eprintln!("{}", printer.header());
    }

    while let Some(event) = events.next().await {
        match formatter.format() {
            OutputFormat::Json => emit(&serde_json::to_string(&event).unwrap_or_default())?,
            OutputFormat::Text => eprintln!("{}", printer.render(&event)),
        }
    }

    debug!("Stopped watching {stack}");
    Ok(())
}

/// Show failure events.
async fn cmd_diagnose(
    config_path: Option<&PathBuf>,
    region: Option<&str>,
    stack: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config_or_default(config_path)?;
    let orchestrator = build_orchestrator(&config, region).await;

    let report = orchestrator.diagnose_failure(stack).await?;
    emit(&formatter.format_diagnosis(stack, &report))
}

/// Print stack outputs.
async fn cmd_outputs(
    config_path: Option<&PathBuf>,
    region: Option<&str>,
    stack: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config_or_default(config_path)?;
    let orchestrator = build_orchestrator(&config, region).await;

    let outputs = orchestrator.group_outputs(stack).await?;
    emit(&formatter.format_outputs(&outputs))
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().check(&config);
    emit(&formatter.format_validation(&result, show_warnings))?;

    if formatter.format() == OutputFormat::Text {
        eprintln!("\nConfiguration summary:");
        eprintln!(
            "  Region: {}",
            config.defaults.region.as_deref().unwrap_or("(from environment)")
        );
        eprintln!(
            "  Upload bucket: {}",
            config.upload.as_ref().map_or("(none)", |u| u.bucket.as_str())
        );
        eprintln!("  Stacks: {}", config.stacks.len());
    }

    // Surface the first error as the exit status.
    ConfigValidator::new().validate(&config).map(|_| ())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Returns the directory holding the configuration file.
fn config_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or_else(|| Path::new("."))
}

/// Loads, overrides and validates the configuration.
fn load_config(config_path: Option<&PathBuf>) -> Result<DeployConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    Ok(config)
}

/// Loads the configuration when one is given or found, for commands that
/// only need region and polling settings.
fn load_config_or_default(config_path: Option<&PathBuf>) -> Result<DeployConfig> {
    if config_path.is_none() && find_config_file(".").is_err() {
        debug!("No configuration file found, using defaults");
        return Ok(DeployConfig::default());
    }
    load_config(config_path)
}

/// Builds the orchestrator from configuration.
async fn build_orchestrator(config: &DeployConfig, region: Option<&str>) -> Orchestrator {
    let region = region.or(config.defaults.region.as_deref());
    let polling = &config.polling;

    let client: Arc<dyn ResourceGroupClient> = Arc::new(
        CloudFormationClient::new(region)
            .await
            .with_wait_bounds(polling.stack_wait_timeout(), polling.stack_wait_interval()),
    );

    let sink: Arc<dyn EventSink> = if config.defaults.log_events {
        Arc::new(StderrSink::new(true))
    } else {
        Arc::new(NullSink)
    };

    let mut orchestrator = Orchestrator::new(client)
        .with_event_sink(sink)
        .with_watch_settings(polling.watch_settings())
        .with_change_set_prefix(config.defaults.change_set_prefix.clone())
        .with_change_set_poll(polling.change_set_policy());

    if let Some(upload) = &config.upload {
        let uploader = S3TemplateUploader::new(&upload.bucket, upload.prefix.as_deref(), region)
            .await
            .with_kms_key(upload.kms_key_id.clone());
        orchestrator = orchestrator.with_uploader(Arc::new(uploader), upload.options());
    }

    orchestrator
}

/// Writes a command result to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text.trim_end())?;
    Ok(())
}
