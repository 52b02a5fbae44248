// crates/signet-cli/src/main.rs
// ============================================================================
// Module: Signet CLI Entry Point
// Description: Command dispatcher for the Signet identity issuer.
// Purpose: Provide a safe CLI for serving and configuration tasks.
// Dependencies: clap, signet-core, signet-server, tokio
// ============================================================================

//! ## Overview
//! The CLI serves the issuer, validates configuration files, and generates
//! secret material. Serving refuses non-loopback binds unless the operator
//! explicitly opts in through the environment, so an issuer is never exposed
//! by accident. Security posture: inputs are untrusted and must be
//! validated; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use signet_core::AeadKey;
use signet_server::AppState;
use signet_server::SignetConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment opt-in for non-loopback binds.
const ALLOW_NON_LOOPBACK_ENV: &str = "SIGNET_ALLOW_NON_LOOPBACK";

// ============================================================================
// SECTION: CLI Shape
// ============================================================================

/// Signet identity issuer.
#[derive(Debug, Parser)]
#[command(name = "signet", version, about = "Multi-tenant OAuth 2.0 / OIDC identity issuer")]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the issuer.
    Serve {
        /// Configuration file path.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a configuration file and exit.
    ValidateConfig {
        /// Configuration file path.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate a fresh base64 secret for cookie or encryption keys.
    Keygen,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures mapped onto exit codes.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),
    /// Startup wiring failed.
    #[error("startup error: {0}")]
    Startup(String),
    /// Refused to bind a non-loopback address without the explicit opt-in.
    #[error("refusing non-loopback bind {0}; set {ALLOW_NON_LOOPBACK_ENV}=1 to allow")]
    NonLoopbackBind(String),
    /// Serving failed.
    #[error("serve error: {0}")]
    Serve(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Process entry point.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "signet failed");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches the parsed command.
fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Serve { config } => serve(config),
        Command::ValidateConfig { config } => {
            let loaded = SignetConfig::load(config.as_deref())
                .map_err(|err| CliError::Config(err.to_string()))?;
            tracing::info!(issuer = %loaded.server.issuer, "configuration is valid");
            Ok(())
        }
        Command::Keygen => {
            tracing::info!(secret = %AeadKey::generate().to_base64(), "generated secret");
            Ok(())
        }
    }
}

/// Loads configuration, enforces the bind policy, and serves.
fn serve(config: Option<PathBuf>) -> Result<(), CliError> {
    let config = SignetConfig::load(config.as_deref())
        .map_err(|err| CliError::Config(err.to_string()))?;
    enforce_local_only(&config)?;
    let state = AppState::build(config).map_err(|err| CliError::Startup(err.to_string()))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Startup(err.to_string()))?;
    runtime
        .block_on(signet_server::serve(state))
        .map_err(|err| CliError::Serve(err.to_string()))
}

/// Fails closed on non-loopback binds without the explicit opt-in.
fn enforce_local_only(config: &SignetConfig) -> Result<(), CliError> {
    if config.server.bind.ip().is_loopback() {
        return Ok(());
    }
    let allowed = std::env::var(ALLOW_NON_LOOPBACK_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if allowed {
        tracing::warn!(bind = %config.server.bind, "serving on a non-loopback address");
        return Ok(());
    }
    Err(CliError::NonLoopbackBind(config.server.bind.to_string()))
}
