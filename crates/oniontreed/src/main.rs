//! oniontreed: the OnionTree scanner daemon.
//!
//! Single binary that wires the scanner into its pipeline and serves the
//! result:
//! - Scanner (one supervisor per service, one worker per URL)
//! - Cache stage
//! - Metrics stage
//! - REST API + Prometheus endpoint
//!
//! # Usage
//!
//! ```text
//! oniontreed scan --dir ./oniontree --proxy 127.0.0.1:9050
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use oniontree_evtcache::Cache;
use oniontree_evtmetrics::Metrics;
use oniontree_scanner::shutdown::cancelled;
use oniontree_scanner::{Scanner, ScannerConfig, Stage, TransportKind, run_pipeline};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::config::{DaemonConfig, Overrides};

#[derive(Parser)]
#[command(name = "oniontreed", about = "OnionTree scanner daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan every service of a repository until interrupted.
    Scan {
        /// OnionTree repository directory.
        #[arg(long, short = 'C', default_value = ".")]
        dir: PathBuf,

        /// TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address the API listens on.
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Pause between probes of the same URL ("30s", "2m").
        #[arg(long)]
        interval: Option<String>,

        /// Upper bound for a single probe ("15s").
        #[arg(long)]
        timeout: Option<String>,

        /// SOCKS5 proxy, usually a local Tor client.
        #[arg(long)]
        proxy: Option<String>,

        /// Probe method.
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportArg {
    Http,
    Tcp,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Http => TransportKind::Http,
            TransportArg::Tcp => TransportKind::Tcp,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,oniontreed=debug,oniontree_scanner=debug")
    });
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Scan {
            dir,
            config,
            listen,
            interval,
            timeout,
            proxy,
            transport,
        } => {
            let file = match config {
                Some(path) => DaemonConfig::from_file(&path)?,
                None => DaemonConfig::default(),
            };
            let config = file.merge(Overrides {
                listen,
                interval,
                timeout,
                proxy,
                transport: transport.map(Into::into),
            });
            let listen = config.listen()?;
            let scanner = ScannerConfig::from_section(&config.scanner)?;
            run_scan(dir, scanner, listen).await
        }
    }
}

async fn run_scan(dir: PathBuf, config: ScannerConfig, listen: SocketAddr) -> anyhow::Result<()> {
    info!(
        dir = %dir.display(),
        interval = ?config.scan_interval,
        timeout = ?config.probe_timeout,
        transport = ?config.transport,
        proxy = ?config.proxy,
        "oniontree scanner starting"
    );

    let cache = Arc::new(Cache::new());
    let metrics = Arc::new(Metrics::new());
    let buffer = config.event_buffer;
    let scanner = Scanner::new(config);

    // ── Shutdown signals ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Stages are never cancelled; they drain until the scanner closes the
    // stream so teardown events still reach them.
    let (_stages_tx, stages_rx) = watch::channel(false);

    // ── Pipeline ───────────────────────────────────────────────

    let (events_tx, events_rx) = mpsc::channel(buffer);
    let stages = vec![cache.clone() as Arc<dyn Stage>, metrics.clone() as Arc<dyn Stage>];
    let pipeline = tokio::spawn(run_pipeline(stages_rx, events_rx, stages, buffer));

    let scan_shutdown = shutdown_rx.clone();
    let mut scan =
        tokio::spawn(async move { scanner.start(scan_shutdown, dir, events_tx).await });

    // ── API server ─────────────────────────────────────────────

    let router = oniontree_api::build_router(cache, metrics);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listen, "API server starting");

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancelled(&mut server_shutdown).await })
            .await
    });

    // ── Wait for Ctrl-C or an early scanner exit ───────────────

    let early = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown signal received");
            None
        }
        result = &mut scan => Some(result),
    };
    let _ = shutdown_tx.send(true);

    let scanned = match early {
        Some(result) => result,
        None => scan.await,
    };
    scanned??;
    pipeline.await??;
    server.await??;

    info!("oniontree scanner stopped");
    Ok(())
}
