// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Sigil CLI - signed HTTP calls from the command line.
//!
//! # Examples
//!
//! ```bash
//! # One-shot request with OAuth credentials from the default profile
//! sigil request https://api.example.com/1/statuses/home.json
//!
//! # Explicit credentials, JSON output
//! sigil --format json --pretty request https://api.example.com/1/me \
//!     --consumer-key ck --consumer-secret cs --token t --token-secret ts
//!
//! # Show the signature without sending anything
//! sigil sign https://api.example.com/1/me -p count=5
//!
//! # Follow a line-delimited stream
//! sigil stream https://stream.example.com/1/filter --per-callback 10
//!
//! # Poll every 30 seconds, skipping while under 10% of the rate limit
//! sigil watch https://api.example.com/1/me --interval 30 --skip-below 10
//!
//! # Persist defaults and secrets
//! sigil config set authority https://api.example.com
//! sigil credentials set default consumer-secret kd94hf93k423kf44
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{config, credentials, request, sign, stream, watch};

// ============================================================================
// CLI Definition
// ============================================================================

/// Sigil CLI - signed, retrying, cache-aware HTTP calls.
#[derive(Parser)]
#[command(name = "sigil")]
#[command(about = "Signed HTTP client CLI")]
#[command(long_about = r"
Sigil issues HTTP calls signed with OAuth 1.0a or Basic credentials.

Secrets come from flags or from the keychain profile; other defaults come
from the settings file (see `sigil config path`).

Examples:
  sigil request https://api.example.com/1/me     # One-shot call
  sigil sign https://api.example.com/1/me        # Signature only, no I/O
  sigil stream https://stream.example.com/feed   # Line-delimited stream
  sigil watch https://api.example.com/1/me -i 30 # Periodic re-issue
")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Send one request and print the response.
    #[command(visible_alias = "r")]
    Request(request::RequestArgs),

    /// Follow a streaming response.
    #[command(visible_alias = "s")]
    Stream(stream::StreamArgs),

    /// Re-issue a request on an interval.
    #[command(visible_alias = "w")]
    Watch(watch::WatchArgs),

    /// Print the OAuth signature for a call without sending it.
    Sign(sign::SignArgs),

    /// Manage configuration.
    Config(config::ConfigArgs),

    /// Manage keychain-stored secrets.
    Credentials(credentials::CredentialsArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// The server answered with a non-2xx status.
    HttpStatus = 2,
    /// Invalid input, caught before any I/O.
    Validation = 3,
    /// Timeout.
    Timeout = 4,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("sigil=debug,sigil_http=debug,sigil_store=debug,info")
    } else {
        EnvFilter::new("sigil=warn,sigil_http=warn,sigil_store=warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Request(args) => request::run(args, &cli).await,
        Commands::Stream(args) => stream::run(args, &cli).await,
        Commands::Watch(args) => watch::run(args, &cli).await,
        Commands::Sign(args) => sign::run(args, &cli).await,
        Commands::Config(args) => config::run(args, &cli).await,
        Commands::Credentials(args) => credentials::run(args, &cli),
    };

    match result {
        Ok(code) => {
            if code != ExitCode::Success {
                std::process::exit(code as i32);
            }
        }
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            let code = match e.downcast_ref::<sigil_http::ClientError>() {
                Some(sigil_http::ClientError::Validation(_) | sigil_http::ClientError::InvalidUrl(_)) => {
                    ExitCode::Validation
                }
                _ => ExitCode::Error,
            };
            std::process::exit(code as i32);
        }
    }

    Ok(())
}
