// crates/propsync-cli/src/main.rs
// ============================================================================
// Module: PropSync CLI Entry Point
// Description: Command dispatcher for serving the backend and checking
//              configuration.
// Purpose: Provide the operational entry point for the PropSync server.
// Dependencies: axum, clap, propsync-config, propsync-server, tokio
// ============================================================================

//! ## Overview
//! The CLI has two commands: `serve` boots the configured store, builds
//! the REST router and broadcast hub, and serves until interrupted;
//! `check` loads and validates a configuration and opens the configured
//! store without binding a listener.
//! Diagnostics go to stderr; failures exit non-zero.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use propsync_config::PropsyncConfig;
use propsync_config::StoreType;
use propsync_core::AuditRecorder;
use propsync_core::EntityGateway;
use propsync_core::MemoryAuditLog;
use propsync_core::MemoryGateway;
use propsync_server::AppState;
use propsync_server::build_router;
use propsync_store_sqlite::SqliteStore;
use propsync_sync::SyncHub;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "propsync", version, about = "Property entity sync backend")]
struct Cli {
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the REST backend and WebSocket relay.
    Serve(ServeCommand),
    /// Load and validate a configuration, then exit.
    Check(CheckCommand),
}

/// Arguments for the `serve` command.
#[derive(clap::Args, Debug)]
struct ServeCommand {
    /// Configuration file path; defaults to `propsync.toml` when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Arguments for the `check` command.
#[derive(clap::Args, Debug)]
struct CheckCommand {
    /// Configuration file path; defaults to `propsync.toml` when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// CLI failure carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// User-facing failure description.
    message: String,
}

impl CliError {
    /// Creates an error from a message.
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            let _ = writeln!(std::io::stderr(), "error: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Check(command) => command_check(&command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let (gateway, audit) = build_store(&config)?;
    let state = AppState {
        gateway,
        audit,
        hub: Arc::new(SyncHub::new()),
    };
    let max_body_bytes = usize::try_from(config.server.max_body_bytes).unwrap_or(usize::MAX);
    let app = build_router(state, max_body_bytes);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(|err| CliError::new(format!("bind to {} failed: {err}", config.server.bind)))?;
    let addr = listener
        .local_addr()
        .map_err(|err| CliError::new(format!("local address unavailable: {err}")))?;
    let _ = writeln!(std::io::stderr(), "propsync listening on {addr}");
    axum::serve(listener, app)
        .await
        .map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Check Command
// ============================================================================

/// Executes the `check` command.
fn command_check(command: &CheckCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let summary = check_store(&config)?;
    let _ = writeln!(std::io::stderr(), "configuration ok: {summary}");
    Ok(ExitCode::SUCCESS)
}

/// Opens the configured store and returns its summary, discarding the
/// handles. A config that validates but points at an unopenable store
/// fails here rather than at serve time.
fn check_store(config: &PropsyncConfig) -> CliResult<String> {
    let (_gateway, _audit) = build_store(config)?;
    Ok(store_summary(config))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates the configuration.
fn load_config(path: Option<&std::path::Path>) -> CliResult<PropsyncConfig> {
    let config = PropsyncConfig::load(path)
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    config.validate().map_err(|err| CliError::new(format!("config invalid: {err}")))?;
    Ok(config)
}

/// Builds the gateway and audit recorder for the configured store.
fn build_store(
    config: &PropsyncConfig,
) -> CliResult<(Arc<dyn EntityGateway>, Arc<dyn AuditRecorder>)> {
    match config.store.store_type {
        StoreType::Memory => Ok((Arc::new(MemoryGateway::new()), Arc::new(MemoryAuditLog::new()))),
        StoreType::Sqlite => {
            let sqlite_config = config
                .store
                .sqlite_config()
                .map_err(|err| CliError::new(format!("config invalid: {err}")))?;
            let store = SqliteStore::open(&sqlite_config)
                .map_err(|err| CliError::new(format!("store open failed: {err}")))?;
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
    }
}

/// Describes the configured store for diagnostics.
fn store_summary(config: &PropsyncConfig) -> String {
    match config.store.store_type {
        StoreType::Memory => "memory store".to_string(),
        StoreType::Sqlite => {
            let path = config
                .store
                .path
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |path| path.display().to_string());
            format!("sqlite store at {path}")
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
