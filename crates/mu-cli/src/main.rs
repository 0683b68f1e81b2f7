//! Mu Kernel CLI.
//!
//! Thin command surface over `mu-core`: `build`, `query`, `context`,
//! `status`, and `daemon start|stop`. `query`/`context`/`status` probe a
//! running daemon first and route the call over HTTP; when no daemon
//! answers, they fall back to opening the mubase read-only in-process, per
//! spec.md §4.7's "routing from siblings" rule.

mod daemon_ctl;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mu_core::client::DaemonClient;
use mu_core::config::Config;
use mu_core::context::{ExtractionConfig, SmartContextExtractor};
use mu_core::graph::GraphEngine;
use mu_core::muql::formatter::{self, OutputFormat};
use mu_core::muql::MuqlEngine;
use mu_core::store::Store;
use mu_core::Engine;

/// Mu code kernel command-line interface.
#[derive(Parser, Debug)]
#[command(name = "mu", version, about = "Command-line interface for the Mu code kernel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Daemon address tried before falling back to a read-only open.
    #[arg(long, global = true, default_value = "http://127.0.0.1:7420")]
    daemon: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build (or rebuild) the index for a repository.
    Build {
        /// Path to the repository root.
        #[arg(default_value = ".")]
        path: String,

        /// Accepted for forward compatibility: the engine always walks the
        /// full tree today, there is no incremental cache to bypass.
        #[arg(long)]
        force: bool,
    },

    /// Run a MUQL query.
    Query {
        /// MUQL query text.
        muql: String,

        /// Path to the repository root (used for the read-only fallback).
        #[arg(long, default_value = ".")]
        repo: String,

        /// Output format: table, json, csv, or tree.
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Extract a token-budgeted MU-text context for a question.
    Context {
        /// Natural-language question to extract context for.
        question: String,

        /// Path to the repository root (used for the read-only fallback).
        #[arg(long, default_value = ".")]
        repo: String,

        /// Token budget override.
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Show engine or daemon status.
    Status {
        /// Path to the repository root.
        #[arg(long, default_value = ".")]
        repo: String,
    },

    /// Manage the background daemon.
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand, Debug)]
enum DaemonAction {
    /// Start the daemon as a detached background process.
    Start {
        /// Path to the repository root.
        #[arg(long, default_value = ".")]
        repo: String,

        /// Address for the daemon to bind its HTTP/WS server to.
        #[arg(long, default_value = "127.0.0.1:7420")]
        bind: String,
    },
    /// Stop a running daemon gracefully.
    Stop {
        /// Path to the repository root.
        #[arg(long, default_value = ".")]
        repo: String,
    },
}

/// Exit codes per spec.md §6.
const EXIT_USER_ERROR: u8 = 1;
const EXIT_PARTIAL: u8 = 2;
const EXIT_FATAL: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(&cli.log_level).with_writer(std::io::stderr).init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Build { path, force } => build(&path, force).await,
        Commands::Query { muql, repo, format } => query(&cli.daemon, &muql, &repo, &format).await,
        Commands::Context { question, repo, max_tokens } => context(&cli.daemon, &question, &repo, max_tokens).await,
        Commands::Status { repo } => status(&cli.daemon, &repo).await,
        Commands::Daemon { action } => daemon(action),
    }
}

async fn build(path: &str, force: bool) -> anyhow::Result<ExitCode> {
    let repo_path = PathBuf::from(path);
    tracing::info!(path = %path, force, "building index");

    let mut engine = match Engine::new(&repo_path) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ExitCode::from(EXIT_USER_ERROR));
        }
    };

    let result = engine.run_index().await?;
    println!(
        "indexed {} files ({} failed): {} nodes, {} edges, {} embeddings",
        result.files_processed, result.files_failed, result.nodes_added, result.edges_added, result.embeddings_generated
    );

    if result.files_failed > 0 {
        Ok(ExitCode::from(EXIT_PARTIAL))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn query(daemon_addr: &str, muql: &str, repo: &str, format: &str) -> anyhow::Result<ExitCode> {
    let Some(format) = OutputFormat::from_str(format) else {
        eprintln!("error: unknown output format: {format}");
        return Ok(ExitCode::from(EXIT_USER_ERROR));
    };

    let client = DaemonClient::new(daemon_addr);
    if client.probe().await {
        return match client.query(muql).await {
            Ok(result) => {
                println!("{}", formatter::format_result(&result, format));
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("error: {e}");
                Ok(ExitCode::from(EXIT_USER_ERROR))
            }
        };
    }

    tracing::debug!(daemon = daemon_addr, "no daemon reachable, falling back to read-only open");
    let repo_path = PathBuf::from(repo);
    let config = Config::load(&repo_path)?;
    let store = Store::open_read(&config.data_dir().join("mubase"))?;
    let graph = GraphEngine::new();
    graph.load(&store)?;
    let result = MuqlEngine::new(&store, &graph).execute(muql)?;
    println!("{}", formatter::format_result(&result, format));
    Ok(ExitCode::SUCCESS)
}

async fn context(daemon_addr: &str, question: &str, repo: &str, max_tokens: Option<u32>) -> anyhow::Result<ExitCode> {
    let client = DaemonClient::new(daemon_addr);
    if client.probe().await {
        return match client.context(question, max_tokens).await {
            Ok(result) => {
                println!("{}", result.mu_text);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("error: {e}");
                Ok(ExitCode::from(EXIT_USER_ERROR))
            }
        };
    }

    tracing::debug!(daemon = daemon_addr, "no daemon reachable, falling back to read-only open");
    let repo_path = PathBuf::from(repo);
    let config = Config::load(&repo_path)?;
    let store = Store::open_read(&config.data_dir().join("mubase"))?;
    let graph = GraphEngine::new();
    graph.load(&store)?;

    let mut extraction_config = ExtractionConfig::default();
    if let Some(max_tokens) = max_tokens {
        extraction_config.max_tokens = max_tokens;
    }

    // The read-only fallback has no engine-owned embedding provider, so
    // vector similarity is skipped: entity and proximity scoring alone.
    let result = SmartContextExtractor::new(&store, &graph).extract(question, &extraction_config, None)?;
    println!("{}", result.mu_text);
    Ok(ExitCode::SUCCESS)
}

async fn status(daemon_addr: &str, repo: &str) -> anyhow::Result<ExitCode> {
    let client = DaemonClient::new(daemon_addr);
    if client.probe().await {
        return match client.status().await {
            Ok(status) => {
                println!(
                    "daemon at {daemon_addr}: uptime {}s, {} nodes, {} edges, {} connections, schema v{}",
                    status.uptime_secs, status.node_count, status.edge_count, status.connection_count, status.schema_version
                );
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("error: {e}");
                Ok(ExitCode::from(EXIT_USER_ERROR))
            }
        };
    }

    tracing::debug!(daemon = daemon_addr, "no daemon reachable, reading mubase directly");
    let repo_path = PathBuf::from(repo);
    let config = Config::load(&repo_path)?;
    let store = Store::open_read(&config.data_dir().join("mubase"))?;
    let graph = GraphEngine::new();
    let stats = graph.load(&store)?;
    println!(
        "no daemon running; mubase at {}: {} nodes, {} edges",
        config.data_dir().join("mubase").display(),
        stats.node_count,
        stats.edge_count
    );
    Ok(ExitCode::SUCCESS)
}

fn daemon(action: DaemonAction) -> anyhow::Result<ExitCode> {
    match action {
        DaemonAction::Start { repo, bind } => {
            let repo_path = PathBuf::from(&repo);
            let config = Config::load(&repo_path)?;
            let pid_path = config.data_dir().join("daemon.pid");
            match daemon_ctl::start(&pid_path, &repo, &bind) {
                Ok(pid) => {
                    println!("daemon started: pid {pid}, bind {bind}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    Ok(ExitCode::from(EXIT_USER_ERROR))
                }
            }
        }
        DaemonAction::Stop { repo } => {
            let repo_path = PathBuf::from(&repo);
            let config = Config::load(&repo_path)?;
            let pid_path = config.data_dir().join("daemon.pid");
            match daemon_ctl::stop(&pid_path) {
                Ok(true) => {
                    println!("daemon stopped");
                    Ok(ExitCode::SUCCESS)
                }
                Ok(false) => {
                    println!("no daemon running");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    Ok(ExitCode::from(EXIT_USER_ERROR))
                }
            }
        }
    }
}
