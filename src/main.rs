//! Alias dispatch server.
//!
//! Serves the static mounts declared in a TOML file through the dispatch table
//! and keeps them in step with the file while running.
//!
//! ```text
//!     Client Request ──▶ axum (server.rs) ──▶ DispatchTable ──▶ middleware ──▶ resource
//!                                                 ▲
//!     config file ──▶ ConfigWatcher ──▶ MountSync ┘ (register / unregister)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use alias_dispatch::config::watcher::ConfigWatcher;
use alias_dispatch::config::{load_config, DispatchConfig};
use alias_dispatch::lifecycle::{drain_table, signals, MountSync, Shutdown};
use alias_dispatch::observability::{logging, metrics};
use alias_dispatch::routing::DispatchTable;
use alias_dispatch::DispatchServer;

#[derive(Debug, Parser)]
#[command(name = "alias-dispatch", version, about = "Serve aliased static mounts")]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Do not reload mounts when the config file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DispatchConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "alias-dispatch starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let table = DispatchTable::new();
    let mounts = MountSync::new(table.clone());
    let summary = mounts.apply(&config.mounts);
    for (alias, error) in &summary.failed {
        tracing::error!(alias = %alias, error = %error, "Mount failed at startup");
    }

    let shutdown = Shutdown::new();

    // reloads stop before the table drains, so nothing registers behind it
    let reload = match (&cli.config, cli.no_watch) {
        (Some(path), false) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, config.clone());
            let watcher = watcher.run()?;
            let mut stop = shutdown.subscribe();
            let task = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop.recv() => break,
                        update = updates.recv() => match update {
                            Some(new_config) => {
                                mounts.apply(&new_config.mounts);
                            }
                            None => break,
                        },
                    }
                }
            });
            Some((watcher, task))
        }
        _ => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        mounts = table.len(),
        mount_path = %config.router.mount_path,
        "Listening for connections"
    );

    let signalled = shutdown.signalled();
    let server = DispatchServer::new(table.clone(), &config.listener, &config.router);
    let serving = tokio::spawn(server.run(listener, signalled));

    signals::forward_signals(&shutdown).await;
    serving.await??;

    if let Some((watcher, task)) = reload {
        drop(watcher);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Reload task failed");
        }
    }

    let pending = drain_table(&table, Duration::from_secs(config.router.drain_timeout_secs)).await;
    if pending > 0 {
        tracing::warn!(pending, "Exiting with registrations still draining");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
