//! CLI for the seedpush notification service.

mod commands;
mod http;

use anyhow::Result;
use clap::{Parser, Subcommand};
use seedpush_core::config::{self, SeedpushConfig};

use commands::{run_serve, run_status, run_vapid};

/// Top-level CLI for seedpush.
#[derive(Debug, Parser)]
#[command(name = "seedpush")]
#[command(about = "seedpush: Transmission front end with push notifications on completion", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Connect to Transmission, restore tracked jobs and serve the HTTP API.
    Serve {
        /// Port to listen on (overrides config and LISTEN_PORT).
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
        /// Public base URI used in notification icons (overrides config and BASE_URI).
        #[arg(long, value_name = "URI")]
        base_uri: Option<String>,
    },

    /// Show the jobs recorded in the state file.
    Status {
        /// Only show jobs of this session.
        #[arg(long)]
        session: Option<String>,
    },

    /// Print the VAPID public key, generating a key pair if none exists.
    Vapid,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        cfg.apply_env(|name| std::env::var(name).ok())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Serve { port, base_uri } => {
                apply_serve_overrides(&mut cfg, port, base_uri);
                run_serve(&cfg).await?;
            }
            CliCommand::Status { session } => run_status(&cfg, session.as_deref())?,
            CliCommand::Vapid => run_vapid(&cfg)?,
        }

        Ok(())
    }
}

fn apply_serve_overrides(cfg: &mut SeedpushConfig, port: Option<u16>, base_uri: Option<String>) {
    if let Some(port) = port {
        cfg.listen_port = port;
    }
    if let Some(uri) = base_uri {
        cfg.base_uri = uri;
    }
}

#[cfg(test)]
mod tests;
