//! tabwarden binary: stdio host for the focus-enforcement engine

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabwarden::bridge::{write_outgoing, StdioBridge, TabRegistry};
use tabwarden::engine::{
    spawn_poller, ControlDispatcher, EnforcementEngine, EngineConfig, PolicyStorage, PolicyStore,
    PolicyUpdate, PolicyWatcher,
};
use tabwarden::platform_dirs;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "tabwarden",
    about = "Focus-enforcement engine speaking newline-delimited JSON on stdin/stdout"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the persisted policy document
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Log filter directive, overriding the configured one
    #[arg(long)]
    log_filter: Option<String>,

    /// Disable the remote rules poller
    #[arg(long)]
    no_poll: bool,

    /// Log to stderr instead of the rotating log file
    #[arg(long)]
    log_stderr: bool,
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => platform_dirs::config_path()?,
    };
    let config = match std::fs::read_to_string(&path) {
        Ok(contents) => EngineConfig::from_toml(&contents)
            .with_context(|| format!("invalid config at {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => EngineConfig::default(),
        Err(e) => return Err(e).with_context(|| format!("could not read {}", path.display())),
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
    Ok(config)
}

fn init_logging(config: &EngineConfig, cli: &Cli) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = cli
        .log_filter
        .clone()
        .unwrap_or_else(|| config.log_filter.clone());
    let filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    // Stdout carries the NDJSON protocol, so logs go to a file or stderr
    if cli.log_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(None)
    } else {
        let log_dir = platform_dirs::log_dir()?;
        platform_dirs::ensure_dir(&log_dir)?;
        let appender = tracing_appender::rolling::daily(log_dir, "tabwarden.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Ok(Some(guard))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    platform_dirs::init_directories()?;

    let config = load_config(&cli)?;
    let _log_guard = init_logging(&config, &cli)?;
    info!(version = env!("CARGO_PKG_VERSION"), "tabwarden starting");

    // Hydrate the policy store from durable storage
    let policy_path = match &cli.policy {
        Some(path) => path.clone(),
        None => platform_dirs::policy_path()?,
    };
    let storage = PolicyStorage::new(policy_path);
    let store = Arc::new(PolicyStore::new());
    match storage.load() {
        Ok(snapshot) => store.replace(snapshot),
        Err(e) => warn!(error = %e, "Could not load persisted policy, starting from defaults"),
    }

    // Config-level overrides land in the store through the one merge entry
    // point, same as any other update
    let mut overrides = PolicyUpdate::default();
    if config.remote_rules_endpoint.is_some() {
        overrides.remote_rules_endpoint = Some(config.remote_rules_endpoint.clone());
    }
    if store.snapshot().redirect_target.is_none() && config.default_redirect_target.is_some() {
        overrides.redirect_target = Some(config.default_redirect_target.clone());
    }
    if !overrides.is_empty() {
        store.apply_update(overrides);
    }

    let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
    let (out_tx, out_rx) = mpsc::channel(config.event_buffer);

    let registry = Arc::new(TabRegistry::new(out_tx.clone()));
    let engine = EnforcementEngine::new(store.clone(), registry.clone())
        .with_settle_delay(Duration::from_millis(config.settle_delay_ms));

    let stats_engine = engine.clone();
    let dispatcher = ControlDispatcher::new(
        store.clone(),
        storage.clone(),
        event_tx.clone(),
        Arc::new(move || stats_engine.stats()),
    );

    // Storage change notifications for the life of the process
    let _watcher = match PolicyWatcher::spawn(storage.clone(), store.clone(), event_tx.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "Policy file watcher unavailable");
            None
        }
    };

    if !cli.no_poll {
        spawn_poller(
            store.clone(),
            event_tx.clone(),
            Duration::from_secs(config.poll_interval_secs),
        );
    }

    let engine_task = tokio::spawn(engine.run(event_rx));
    let writer_task = tokio::spawn(write_outgoing(out_rx, tokio::io::stdout()));

    let bridge = StdioBridge::new(registry, dispatcher, event_tx.clone(), out_tx);
    bridge.run(tokio::io::stdin()).await;

    // Stdin closed: the browser side is gone, shut down cleanly
    info!("Bridge closed, shutting down");
    let _ = event_tx.send(tabwarden::engine::EngineEvent::Shutdown).await;
    drop(event_tx);
    let _ = engine_task.await;
    // The writer drains once the last Outgoing sender (held via the tab
    // registry) is gone
    let _ = writer_task.await;
    Ok(())
}
