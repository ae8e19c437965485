//! # cadbridge-agent
//!
//! Stdio host for the cadbridge engine. Reads one JSON call per stdin line,
//! runs it against an in-memory document on the execution thread, and
//! writes one envelope per stdout line. Logs go to stderr.

#![deny(unsafe_code)]

mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadbridge_commands::CommandRegistry;
use cadbridge_core::errors::INVALID_PARAMS;
use cadbridge_core::memory_host::MemoryHost;
use cadbridge_engine::{Dispatcher, ExecuteCall, ResultEnvelope};
use cadbridge_guards::{AdaptiveThrottle, SelectionCache};
use cadbridge_settings::{
    EngineSettings, load_settings, load_settings_from_path, load_wait_config, wait_config_path,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// cadbridge stdio agent.
#[derive(Parser, Debug)]
#[command(name = "cadbridge-agent", about = "Run cadbridge commands over stdio")]
struct Cli {
    /// Settings file (defaults to `~/.cadbridge/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Title of the in-memory document.
    #[arg(long, default_value = "Untitled")]
    document: String,
}

fn load(cli: &Cli) -> Result<EngineSettings> {
    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => load_settings().context("failed to load settings")?,
    };
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

fn throttle(settings: &EngineSettings) -> AdaptiveThrottle {
    let path = wait_config_path();
    let throttle = match load_wait_config(&path) {
        Ok(config) => AdaptiveThrottle::from_wait_config(settings.throttle.clone(), &config),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "ignoring unreadable wait config");
            AdaptiveThrottle::new(settings.throttle.clone())
        }
    };
    throttle.with_persistence(path)
}

/// Parse one input line into a call; malformed lines get an error envelope.
fn parse_line(line: &str) -> Result<ExecuteCall, ResultEnvelope> {
    serde_json::from_str::<ExecuteCall>(line).map_err(|e| {
        ResultEnvelope::error(INVALID_PARAMS, format!("malformed call: {e}"), None)
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    cadbridge_core::logging::init_subscriber(level);

    let selection = Arc::new(SelectionCache::new());
    let mut registry = CommandRegistry::new();
    demo::register_all(&mut registry, &selection);
    tracing::info!(commands = registry.len(), "command registry built");

    let dispatcher =
        Arc::new(Dispatcher::new(Arc::new(registry), &settings).with_selection_cache(selection));
    let (handle, thread) = cadbridge_engine::spawn(
        MemoryHost::with_document(&cli.document, None),
        dispatcher,
        Arc::new(throttle(&settings)),
        &settings.executor,
    )?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope = match parse_line(&line) {
            Ok(call) => handle.execute(call).await,
            Err(envelope) => envelope,
        };
        let mut out = serde_json::to_string(&envelope).context("failed to encode envelope")?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    drop(handle);
    let host = tokio::task::spawn_blocking(move || thread.join())
        .await?
        .map_err(|_| anyhow::anyhow!("execution thread panicked"))?;
    tracing::info!(elements = host.elements().len(), "shutdown complete");
    Ok(())
}
