//! # Queue-Relay CLI
//!
//! Command-line interface for operating a Queue-Relay deployment.
//!
//! This module provides CLI commands for:
//! - Validating transport options and showing the resolved destination
//! - Inspecting the filesystem failure log
//!
//! Options are read from an optional file (TOML, YAML or JSON, chosen by
//! extension) overlaid with `QUEUE_RELAY__*` environment variables, for
//! example `QUEUE_RELAY__REPEAT__MAXATTEMPTS=5`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use queue_relay_core::adapters::FilesystemFailureLogStorage;
use queue_relay_core::{
    ConfigurationError, Destination, FailureId, FailureLogStorage, FailureRecord, StorageError,
    TransportOptions,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Prefix of the environment variables overlaid on the options file
pub const ENV_PREFIX: &str = "QUEUE_RELAY";

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue-Relay CLI - Message transport between queues and envelope handlers
#[derive(Parser)]
#[command(name = "queue-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operate the Queue-Relay message transport")]
pub struct Cli {
    /// Transport options file path
    #[arg(short, long, env = "QUEUE_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Transport option commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Failure log commands
    Failures {
        #[command(subcommand)]
        action: FailureCommands,
    },
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Load and validate transport options, then print them with the resolved destination
    Check {
        /// Options file to check, overriding --config
        #[arg(long)]
        file: Option<PathBuf>,

        /// Output format for the resolved configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Failure log subcommands
#[derive(Subcommand)]
pub enum FailureCommands {
    /// Show a single failure record
    Show {
        /// Failure identifier
        id: String,

        /// Failure log directory
        #[arg(short, long, env = "QUEUE_RELAY_FAILURE_STORE")]
        store: PathBuf,

        /// Output format
        #[arg(short = 'f', long, default_value = "text")]
        format: OutputFormat,
    },

    /// List the stored failure records, oldest first
    List {
        /// Failure log directory
        #[arg(short, long, env = "QUEUE_RELAY_FAILURE_STORE")]
        store: PathBuf,

        /// Output format
        #[arg(short = 'f', long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failure log error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {0:#}")]
    Output(#[from] anyhow::Error),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },
}

impl CliError {
    /// Process exit code for this error class
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Storage(_) => 2,
            Self::Io(_) | Self::Output(_) => 3,
            Self::InvalidArgument { .. } => 4,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration could not be loaded: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid transport options: {0}")]
    Invalid(#[from] ConfigurationError),
}

// ============================================================================
// Configuration
// ============================================================================

/// Transport options together with the destination they resolve to
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfiguration {
    pub options: TransportOptions,
    pub destination: Destination,
}

/// Load transport options from an optional file and the environment, then validate them
pub fn load_options(path: Option<&Path>) -> Result<ResolvedConfiguration, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        info!(path = %path.display(), "Loading transport options");
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let options: TransportOptions = settings.try_deserialize()?;
    let destination = options.validate()?;

    debug!(
        topic = %destination.topic,
        queues = destination.queues.len(),
        "Transport options resolved"
    );

    Ok(ResolvedConfiguration {
        options,
        destination,
    })
}

/// Render the resolved configuration in the requested format
pub fn render_configuration(
    resolved: &ResolvedConfiguration,
    format: ConfigFormat,
) -> Result<String, CliError> {
    let rendered = match format {
        ConfigFormat::Yaml => {
            serde_yaml::to_string(resolved).context("rendering configuration as YAML")?
        }
        ConfigFormat::Json => serde_json::to_string_pretty(resolved)
            .context("rendering configuration as JSON")?,
    };
    Ok(rendered)
}

// ============================================================================
// Failure Log
// ============================================================================

async fn open_store(store: &Path) -> Result<FilesystemFailureLogStorage, CliError> {
    if !store.is_dir() {
        return Err(CliError::InvalidArgument {
            arg: "--store".to_string(),
            message: format!("'{}' is not a directory", store.display()),
        });
    }
    Ok(FilesystemFailureLogStorage::new(store.to_path_buf()).await?)
}

/// Render a single failure record
pub async fn show_failure(
    store: &Path,
    id: &str,
    format: OutputFormat,
) -> Result<String, CliError> {
    let id: FailureId = id.parse().map_err(|_| CliError::InvalidArgument {
        arg: "id".to_string(),
        message: format!("'{}' is not a failure identifier", id),
    })?;

    let storage = open_store(store).await?;
    let record = storage.get_by_identifier(&id).await?;

    match format {
        OutputFormat::Text => Ok(describe_record(&record)),
        OutputFormat::Json => {
            Ok(serde_json::to_string_pretty(&record).context("rendering failure as JSON")?)
        }
        OutputFormat::Yaml => {
            Ok(serde_yaml::to_string(&record).context("rendering failure as YAML")?)
        }
    }
}

/// Render every stored failure record, oldest first
pub async fn list_failures(store: &Path, format: OutputFormat) -> Result<String, CliError> {
    let storage = open_store(store).await?;

    let mut records = Vec::new();
    for id in storage.list_identifiers().await? {
        records.push(storage.get_by_identifier(&id).await?);
    }

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                return Ok("No failures recorded".to_string());
            }
            let lines: Vec<String> = records.iter().map(summarize_record).collect();
            Ok(lines.join("\n"))
        }
        OutputFormat::Json => {
            Ok(serde_json::to_string_pretty(&records).context("rendering failures as JSON")?)
        }
        OutputFormat::Yaml => {
            Ok(serde_yaml::to_string(&records).context("rendering failures as YAML")?)
        }
    }
}

fn summarize_record(record: &FailureRecord) -> String {
    format!(
        "{}  {}  {}  {}: {}",
        record.id, record.created_at, record.event_type, record.queue_name, record.error.message
    )
}

fn describe_record(record: &FailureRecord) -> String {
    let mut lines = vec![
        format!("Id:         {}", record.id),
        format!("Event:      {}", record.event_type),
        format!("Queue:      {}", record.queue_name),
        format!("Message:    {}", record.message.message_id),
        format!("Deliveries: {}", record.message.delivery_count),
        format!("Recorded:   {}", record.created_at),
    ];

    if let (Some(attempt), Some(limit)) = (record.attempt, record.limit) {
        lines.push(format!("Attempts:   {} of {}", attempt, limit));
    }

    lines.push(format!(
        "Error:      [{}] {}",
        record.error.kind, record.error.message
    ));
    for cause in &record.error.chain {
        lines.push(format!("  caused by: {}", cause));
    }

    if record.envelope.is_some() {
        lines.push("Envelope:   present".to_string());
    }

    lines.join("\n")
}

// ============================================================================
// Entry Points
// ============================================================================

/// Install the global tracing subscriber, writing to stderr
pub fn initialize_logging(level: &str, json: bool) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "--log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(e) = result {
        debug!(error = %e, "Tracing subscriber already installed");
    }
    Ok(())
}

/// Execute a parsed command and return its output
pub async fn run(cli: Cli) -> Result<String, CliError> {
    match cli.command {
        Commands::Config {
            action: ConfigCommands::Check { file, format },
        } => {
            let path = file.or(cli.config);
            let resolved = load_options(path.as_deref())?;
            render_configuration(&resolved, format)
        }
        Commands::Failures {
            action: FailureCommands::Show { id, store, format },
        } => show_failure(&store, &id, format).await,
        Commands::Failures {
            action: FailureCommands::List { store, format },
        } => list_failures(&store, format).await,
    }
}

/// Parse the process arguments, initialise logging and run the command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    initialize_logging(&cli.log_level, cli.json_logs)?;

    let output = run(cli).await?;
    println!("{}", output);
    Ok(())
}
