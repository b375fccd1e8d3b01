//! CLI entry point for chatbridge.

mod cli;

use chatbridge::app::Services;
use chatbridge::auth::system_launcher;
use chatbridge::bridge::stdio::serve_stdio;
use chatbridge::build_info;
use chatbridge::config::{default_global_config_path, load_config, write_default_config, Config};
use chatbridge::types::ProviderId;
use clap::Parser;
use cli::{Args, Command};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CHATBRIDGE_LOG";

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log.as_deref());

    if let Some(Command::Init) = args.command {
        run_init(args.config.as_deref());
        return;
    }

    let loaded = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(source = ?loaded.source, "configuration loaded");

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(&loaded.config).await,
        Command::Login { provider } => run_login(&loaded.config, provider).await,
        Command::Logout { provider } => run_logout(&loaded.config, provider).await,
        Command::Status => run_status(&loaded.config).await,
        Command::Init => Ok(()),
    };
    if let Err(message) = result {
        eprintln!("error: {message}");
        std::process::exit(1);
    }
}

/// stderr only: stdout carries the bridge protocol.
fn init_logging(flag: Option<&str>) {
    let directive = flag
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_ENV).ok())
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_init(explicit: Option<&std::path::Path>) {
    let Some(path) = explicit
        .map(|p| p.to_path_buf())
        .or_else(default_global_config_path)
    else {
        eprintln!("error: cannot determine a config directory; pass --config <path>");
        std::process::exit(1);
    };
    match write_default_config(&path) {
        Ok(true) => println!("Wrote {}", path.display()),
        Ok(false) => println!("{} already exists", path.display()),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_serve(config: &Config) -> Result<(), String> {
    tracing::info!(build = %build_info::banner(), "starting bridge");
    let services = Services::from_config(config, system_launcher());
    serve_stdio(services.bridge)
        .await
        .map_err(|e| format!("bridge i/o: {e}"))
}

async fn run_login(config: &Config, provider: ProviderId) -> Result<(), String> {
    let services = Services::from_config(config, system_launcher());
    eprintln!("Opening the {provider} sign-in page in your browser...");
    let linked = services
        .oauth
        .link_provider(provider)
        .await
        .map_err(|e| e.to_string())?;
    let who = linked
        .profile
        .email
        .clone()
        .unwrap_or_else(|| linked.profile.id.clone());
    println!("Linked {provider} as {who}.");
    Ok(())
}

async fn run_logout(config: &Config, provider: ProviderId) -> Result<(), String> {
    let services = Services::from_config(config, system_launcher());
    services
        .oauth
        .unlink_provider(provider)
        .await
        .map_err(|e| e.to_string())?;
    println!("Unlinked {provider}.");
    Ok(())
}

async fn run_status(config: &Config) -> Result<(), String> {
    let services = Services::from_config(config, system_launcher());
    println!("{}", build_info::banner());
    println!("data dir: {}", services.data_dir.display());

    let linked = services.oauth.get_linked_providers().await;
    println!("linked accounts:");
    for provider in ProviderId::ALL {
        match linked.iter().find(|l| l.provider == provider) {
            Some(entry) => println!(
                "  {provider}: {} ({:?})",
                entry.profile.email.as_deref().unwrap_or(&entry.profile.id),
                entry.state
            ),
            None => println!("  {provider}: not linked"),
        }
    }

    let providers = services.registry.load_providers(false).await;
    println!("model providers:");
    if providers.is_empty() {
        println!("  none configured");
    }
    for entry in providers {
        let credential = match entry.token.as_deref() {
            Some(masked) => masked.to_string(),
            None => entry.source.to_string(),
        };
        let enabled = entry.models.iter().filter(|m| m.enabled).count();
        println!(
            "  {}: {} [{}], {enabled}/{} models enabled",
            entry.provider,
            if entry.enabled { "enabled" } else { "disabled" },
            credential,
            entry.models.len()
        );
    }
    Ok(())
}
