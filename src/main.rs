//! wsbridge CLI - talk to a WebSocket server from the terminal.
//!
//! This is the main binary entry point. See the `wsbridge` library for the
//! session itself.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use wsbridge::config::{Config, Overrides};
use wsbridge::constants::{ENV_LOG_FILE, ENV_ORIGIN};
use wsbridge::session;

// CLI
#[derive(Parser, Debug)]
#[command(name = "wsbridge")]
#[command(version)]
#[command(about = "Interactive terminal client for a WebSocket endpoint")]
struct Cli {
    /// WebSocket URL (ws://, wss://; http(s):// is converted)
    url: String,

    /// Origin header sent with the handshake (default: derived from URL)
    #[arg(short, long, env = ENV_ORIGIN)]
    origin: Option<String>,

    /// Prompt shown in front of the input line
    #[arg(long)]
    prompt: Option<String>,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// Path to a JSON config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl From<Cli> for Overrides {
    fn from(cli: Cli) -> Self {
        Self {
            url: cli.url,
            origin: cli.origin,
            prompt: cli.prompt,
            no_color: cli.no_color,
            config_path: cli.config,
        }
    }
}

/// Logs go to `WSBRIDGE_LOG_FILE` when set so they stay off the prompt line;
/// otherwise to stderr, warnings only unless `RUST_LOG` says otherwise.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    builder.format_timestamp_secs();

    if let Ok(path) = std::env::var(ENV_LOG_FILE) {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create log file at {path}"))?;
        builder
            .target(env_logger::Target::Pipe(Box::new(log_file)))
            .filter_level(log::LevelFilter::Debug)
            .parse_default_env();
    }

    builder.init();
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(&Overrides::from(cli))?;
    log::info!("Bridging to {} (origin {})", config.url, config.origin);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let outcome = runtime.block_on(session::run(&config));

    // A plain-stdin read may still be parked on a blocking thread.
    runtime.shutdown_background();

    if outcome.is_clean_exit() {
        log::info!("Session ended: {outcome}");
        return Ok(ExitCode::SUCCESS);
    }

    log::error!("Session failed: {outcome}");
    eprintln!("Error: {outcome}");
    Ok(ExitCode::FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_url_and_origin() {
        let cli = Cli::try_parse_from(["wsbridge", "ws://localhost:1234", "-o", "http://x"]).unwrap();
        let overrides = Overrides::from(cli);

        assert_eq!(overrides.url, "ws://localhost:1234");
        assert_eq!(overrides.origin.as_deref(), Some("http://x"));
        assert!(!overrides.no_color);
    }

    #[test]
    fn test_cli_requires_url() {
        assert!(Cli::try_parse_from(["wsbridge"]).is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "wsbridge",
            "wss://example.com",
            "--no-color",
            "--prompt",
            "ws> ",
            "--config",
            "/tmp/wsbridge.json",
        ])
        .unwrap();

        assert!(cli.no_color);
        assert_eq!(cli.prompt.as_deref(), Some("ws> "));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/wsbridge.json")));
    }
}
