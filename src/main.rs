use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use oidpoll::binder::bind;
use oidpoll::config;
use oidpoll::metrics::JsonLineSink;
use oidpoll::poller::{PollEngine, Scheduler};
use oidpoll::schema::SchemaRegistry;
use oidpoll::snmp::Snmp2Transport;

fn init_logger() {
    // Use LOG_LEVEL env var (fall back to RUST_LOG for backwards compatibility)
    let filter = env::var("LOG_LEVEL")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&filter))
        .with_target(false)
        .init();
}

#[derive(Parser)]
#[command(name = "oidpoll")]
#[command(about = "SNMP polling agent that maps device OIDs to typed metric samples", long_about = None)]
struct Args {
    /// Path to the declaration file
    #[arg(long, env = "OIDPOLL_CONFIG", default_value = "oidpoll.toml")]
    config: PathBuf,

    /// Seconds between read cycles
    #[arg(long, env = "OIDPOLL_INTERVAL", default_value_t = 60)]
    interval: u64,

    /// Per-request SNMP timeout in seconds
    #[arg(long, env = "OIDPOLL_TIMEOUT", default_value_t = 10)]
    timeout: u64,

    /// Run a single read cycle and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    tracing::info!("oidpoll starting");

    let items = config::load_file(&args.config)?;
    let mut schemas = SchemaRegistry::with_builtins();
    let (data, hosts, summary) = bind(&items, &mut schemas);
    tracing::info!(
        "bound {} data definitions and {} hosts from {}",
        data.len(),
        hosts.len(),
        args.config.display()
    );
    let rejected = summary.data_rejected + summary.hosts_rejected + summary.collects_rejected;
    if rejected > 0 {
        tracing::warn!("{} declarations were rejected, see warnings above", rejected);
    }

    let engine = Arc::new(PollEngine::new(
        Arc::new(data),
        Arc::new(schemas),
        Arc::new(Snmp2Transport::new(Duration::from_secs(args.timeout))),
        Arc::new(JsonLineSink::new()),
    ));
    let scheduler = Scheduler::new(engine, Arc::new(hosts), Duration::from_secs(args.interval));

    if args.once {
        scheduler.run_cycle().await;
    } else {
        scheduler.run(wait_for_shutdown_signal()).await;
    }

    tracing::info!("oidpoll stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT shutdown signal.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On non-Unix platforms, just wait for Ctrl+C
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to register Ctrl+C handler");
        tracing::info!("Received Ctrl+C");
    }
}
