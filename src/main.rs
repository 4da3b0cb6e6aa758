//! SSR app server
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────── master ─────────────────────────┐
//!                  │  config → listener bind → deploy (download / notify)    │
//!                  │                  │                                      │
//!                  │             supervisor ── admin API, signals, metrics   │
//!                  └──────┬───────────┬───────────┬──────────────────────────┘
//!                 control │ readiness │           │  (stdin / stdout JSON lines)
//!                  ┌──────▼───┐ ┌─────▼────┐ ┌────▼─────┐
//!   Client ───────▶│ worker 1 │ │ worker 2 │ │ worker N │   shared socket
//!                  │ gateway  │ │ gateway  │ │ gateway  │
//!                  │ + render │ │ + render │ │ + render │
//!                  └────┬─────┘ └────┬─────┘ └────┬─────┘
//!                       └────────────┴── cache ───┘
//! ```
//!
//! Without a subcommand the binary runs the master. The hidden `worker`
//! subcommand is how the master re-executes itself for each fork.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use ssr_app_server::config::loader::{check, read_config};
use ssr_app_server::config::{AppServerConfig, CacheBackend};
use ssr_app_server::lifecycle::AppServer;
use ssr_app_server::observability::logging::init_logging;
use ssr_app_server::worker::entry::run_worker_process;

#[derive(Parser)]
#[command(name = "ssr-app-server", version)]
#[command(about = "Server-side rendering app server with a supervised worker fleet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Run the master and its worker fleet (default)
    Serve,
    /// Run a single worker (spawned by the master)
    #[command(hide = true)]
    Worker,
}

#[derive(Args)]
struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long, env = "SSR_CONFIG")]
    config: Option<PathBuf>,

    /// Fixed application bundle directory
    #[arg(long)]
    dist_path: Option<PathBuf>,

    /// Directory to download bundles from and watch for new ones
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    #[arg(long, env = "HOST")]
    host: Option<String>,

    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Listen on a unix socket instead of TCP
    #[arg(long)]
    socket_path: Option<PathBuf>,

    /// Number of workers
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Gzip responses
    #[arg(long)]
    gzip: bool,

    /// Store rendered pages in this directory (shared by all workers)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

impl ServeArgs {
    fn apply(self, config: &mut AppServerConfig) {
        if let Some(path) = self.dist_path {
            config.app.dist_path = Some(path);
        }
        if let Some(dir) = self.watch_dir {
            config.app.watch_dir = Some(dir);
        }
        if let Some(host) = self.host {
            config.listener.host = Some(host);
        }
        if let Some(port) = self.port {
            config.listener.port = Some(port);
        }
        if let Some(path) = self.socket_path {
            config.listener.socket_path = Some(path);
        }
        if let Some(workers) = self.workers {
            config.app.workers = workers;
        }
        if let Some(username) = self.username {
            config.auth.username = Some(username);
        }
        if let Some(password) = self.password {
            config.auth.password = Some(password);
        }
        if self.gzip {
            config.gateway.gzip = true;
        }
        if let Some(dir) = self.cache_dir {
            config.cache.backend = CacheBackend::Fs;
            config.cache.dir = Some(dir);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Worker => run_worker_process().await?,
        Command::Serve => serve(cli.serve).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => AppServerConfig::default(),
    };
    args.apply(&mut config);
    check(&config)?;

    init_logging(&config.observability.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ssr-app-server starting");
    tracing::info!(
        workers = config.app.workers,
        dist_path = ?config.app.dist_path,
        watch_dir = ?config.app.watch_dir,
        cache = ?config.cache.backend,
        "Configuration loaded"
    );

    let server = AppServer::from_config(config)?.start().await?;
    server.run_until_signal().await?;
    Ok(())
}
