//! Services daemon
//!
//! Starts the services manager with the built-in services and runs until
//! SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use service_orchestration::{ManagerConfig, ServicesManager};
use services_daemon::logging::{self, Logging};
use services_daemon::{boot, status::services_table, wait_for_signal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "services-daemon")]
#[command(about = "Hosts in-process services and manages their lifecycle", long_about = None)]
#[command(version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Number of worker threads running periodic service tasks
    #[arg(long, default_value = "2")]
    service_threads: usize,

    /// Seconds to wait for running tasks during shutdown
    #[arg(long, default_value = "10")]
    shutdown_grace: u64,

    /// Directory holding daemon state and configurations
    #[arg(long)]
    core_dir: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let logging = logging::init(args.debug, args.log_file.as_deref())?;

    let core_dir = match args.core_dir {
        Some(dir) => dir,
        None => dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("servicecore"),
    };
    std::fs::create_dir_all(&core_dir)
        .with_context(|| format!("Failed to create core directory {}", core_dir.display()))?;

    info!("Starting services daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Core directory: {}", core_dir.display());

    let config = ManagerConfig {
        scheduler_threads: args.service_threads,
        shutdown_grace_secs: args.shutdown_grace,
    };
    let manager = Arc::new(ServicesManager::new(config)?);

    smol::block_on(async {
        let result = serve(&manager, &core_dir, &logging, args.debug).await;
        manager.shutdown().await;
        result
    })
}

async fn serve(
    manager: &Arc<ServicesManager>,
    core_dir: &Path,
    logging: &Logging,
    debug: bool,
) -> Result<()> {
    let booted = boot(manager.clone(), core_dir).await?;
    if booted.core.debug && !debug {
        logging.set_debug(true)?;
        info!("Debug logging enabled by core configuration");
    }

    println!("{}", services_table(&manager.service_info()));
    let pending = manager.pending_services().await;
    if !pending.is_empty() {
        warn!("Services waiting for dependencies: {}", pending.join(", "));
    }

    wait_for_signal().await
}
