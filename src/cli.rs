//! CLI argument parsing via clap.

use chatbridge::types::ProviderId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Backend bridge for AI chat: OAuth linking, model providers and streaming
/// chat with tools.
#[derive(Debug, Parser)]
#[command(
    name = "chatbridge",
    version,
    after_help = chatbridge::build_info::HELP_BUILD_METADATA
)]
pub struct Args {
    /// Path to config file (default: ./chatbridge.toml or ~/.config/chatbridge/chatbridge.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `chatbridge=trace` (default: CHATBRIDGE_LOG, RUST_LOG, info).
    #[arg(long = "log", global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the bridge protocol as JSON lines on stdin/stdout (default).
    Serve,
    /// Link a provider account through the browser.
    Login {
        #[arg(value_parser = parse_provider)]
        provider: ProviderId,
    },
    /// Remove a linked provider account.
    Logout {
        #[arg(value_parser = parse_provider)]
        provider: ProviderId,
    },
    /// Show linked accounts and configured model providers.
    Status,
    /// Write a commented default config file if none exists.
    Init,
}

fn parse_provider(raw: &str) -> Result<ProviderId, String> {
    raw.parse()
}
