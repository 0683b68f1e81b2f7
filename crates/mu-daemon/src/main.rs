//! Mu Kernel Daemon -- persistent background engine with an HTTP/WS interface.
//!
//! Owns the mubase exclusively for the lifetime of the process. Auto-indexes
//! on first start, then watches the repository and keeps the graph, vector
//! index, and WebSocket subscribers current as files change.
//!
//! ## Usage
//!
//! ```text
//! mu-daemon --repo /path/to/repo
//! ```

mod events;
mod http;
mod metrics;
mod pidfile;
mod worker;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mu_core::config::Config;
use mu_core::watcher::FileWatcher;
use mu_core::Engine;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Mu Kernel daemon -- persistent background engine with HTTP/WS interface.
#[derive(Parser, Debug)]
#[command(name = "mu-daemon", version, about = "Persistent background engine with HTTP/WS interface")]
struct Args {
    /// Path to the repository to serve.
    #[arg(long, default_value = ".")]
    repo: String,

    /// Address to bind the HTTP/WS server to.
    #[arg(long, default_value = "127.0.0.1:7420")]
    bind: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Skip automatic indexing on startup.
    #[arg(long)]
    no_auto_index: bool,

    /// Skip starting the file watcher (serve the existing index only).
    #[arg(long)]
    no_watch: bool,
}

/// Exit codes per spec.md §6: 0 success, 1 config/user error, 3 fatal.
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_FATAL: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let repo_path = PathBuf::from(&args.repo).canonicalize().unwrap_or_else(|_| PathBuf::from(&args.repo));
    if !repo_path.exists() {
        tracing::error!(repo = %args.repo, "repository path does not exist");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let config = match Config::load(&repo_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let pid_path = config.data_dir().join("daemon.pid");
    let pid_guard = match pidfile::PidFile::acquire(&pid_path) {
        Ok(guard) => guard,
        Err(e) => {
            tracing::error!(error = %e, "failed to acquire pid file");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match run(args, config).await {
        Ok(()) => {
            pid_guard.release();
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "daemon terminated");
            pid_guard.release();
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    tracing::info!(repo = %config.repo_path.display(), "initializing daemon engine");

    let mut engine = Engine::with_config(config.clone())?;

    if !args.no_auto_index {
        let status = engine.status()?;
        if status.node_count == 0 {
            tracing::info!("no existing index, running auto-index...");
            let start = std::time::Instant::now();
            match engine.run_index().await {
                Ok(result) => {
                    tracing::info!(
                        files = result.files_processed,
                        nodes = result.nodes_added,
                        edges = result.edges_added,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "auto-index complete"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "auto-index failed"),
            }
        } else {
            tracing::info!(nodes = status.node_count, "using existing index");
        }
    }

    let engine = Arc::new(Mutex::new(engine));
    let (event_tx, _event_rx) = broadcast::channel(1024);

    if !args.no_watch {
        let (pipeline_tx, pipeline_rx) = mpsc::channel(256);
        let watcher = FileWatcher::new(&config.repo_path, &config.watcher);

        tokio::spawn({
            let engine = Arc::clone(&engine);
            let event_tx = event_tx.clone();
            async move { worker::run_worker(engine, pipeline_rx, event_tx).await }
        });

        tokio::spawn(async move {
            if let Err(e) = watcher.watch(pipeline_tx).await {
                tracing::error!(error = %e, "file watcher terminated");
            }
        });
    }

    let state = Arc::new(http::AppState::new(Arc::clone(&engine), event_tx));
    let router = http::router(state);

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    tracing::info!(addr = %args.bind, "serving HTTP/WS");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("daemon shut down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining in-flight requests");
}
