//! Credentials command - keychain-stored secrets.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use sigil_store::keychain::{self, SecretKind};
use tracing::info;

use crate::output::JsonFormatter;
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the credentials command.
#[derive(Args)]
pub struct CredentialsArgs {
    #[command(subcommand)]
    pub action: CredentialsAction,
}

/// Credentials subcommands.
#[derive(Subcommand)]
pub enum CredentialsAction {
    /// Store a secret.
    Set {
        /// Profile name.
        profile: String,
        /// consumer-secret, token-secret, or password.
        kind: SecretKind,
        /// Secret value; read from stdin when omitted.
        value: Option<String>,
    },

    /// Delete a secret.
    Delete {
        /// Profile name.
        profile: String,
        /// consumer-secret, token-secret, or password.
        kind: SecretKind,
    },

    /// Show which secrets a profile holds.
    Status {
        /// Profile name.
        #[arg(default_value = sigil_store::DEFAULT_PROFILE)]
        profile: String,
    },
}

/// Runs the credentials command.
pub fn run(args: &CredentialsArgs, cli: &Cli) -> Result<ExitCode> {
    match &args.action {
        CredentialsAction::Set {
            profile,
            kind,
            value,
        } => {
            let secret = match value {
                Some(value) => value.clone(),
                None => read_secret()?,
            };
            keychain::store_secret(profile, *kind, &secret)?;
            info!(profile = %profile, kind = %kind, "Secret stored");
            if !cli.quiet {
                println!("Stored {kind} for profile '{profile}'");
            }
        }
        CredentialsAction::Delete { profile, kind } => {
            keychain::delete_secret(profile, *kind)?;
            if !cli.quiet {
                println!("Deleted {kind} for profile '{profile}'");
            }
        }
        CredentialsAction::Status { profile } => {
            let present: Vec<(SecretKind, bool)> = SecretKind::ALL
                .iter()
                .map(|kind| (*kind, keychain::has_secret(profile, *kind)))
                .collect();
            match cli.format {
                OutputFormat::Text => {
                    println!("Profile '{profile}'");
                    for (kind, stored) in &present {
                        println!("  {:<16} {}", kind.account(), if *stored { "✓" } else { "−" });
                    }
                }
                OutputFormat::Json => {
                    let map: serde_json::Map<String, serde_json::Value> = present
                        .iter()
                        .map(|(kind, stored)| (kind.account().to_string(), (*stored).into()))
                        .collect();
                    let output = serde_json::json!({ "profile": profile, "secrets": map });
                    println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
                }
            }
        }
    }
    Ok(ExitCode::Success)
}

fn read_secret() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("reading secret from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
