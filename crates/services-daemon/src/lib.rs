//! Daemon hosting the service orchestration core
//!
//! Boots a [`ServicesManager`] with the built-in `configuration` and `status`
//! services and keeps it running until the process is asked to stop.

#![warn(missing_docs)]

pub mod configuration;
pub mod core_config;
pub mod logging;
pub mod status;

use anyhow::{Context, Result};
use configuration::{CONFIGURATION_SERVICE, ConfigurationService};
use core_config::CoreConfig;
use service_orchestration::{ServiceContext, ServicesManager};
use status::StatusService;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Services available once the daemon has booted
pub struct Booted {
    /// Shared context handed to built-in services
    pub context: ServiceContext,
    /// The configuration service
    pub configuration: Arc<ConfigurationService>,
    /// Core configuration in effect
    pub core: CoreConfig,
}

/// Register the built-in services on `manager`.
///
/// Configurations are stored in `<core_dir>/configuration`.
pub async fn boot(manager: Arc<ServicesManager>, core_dir: &Path) -> Result<Booted> {
    let directory = core_dir.join("configuration");
    manager
        .register_service(ConfigurationService::descriptor(), move || {
            Ok(ConfigurationService::new(directory))
        })
        .await
        .context("Failed to register configuration service")?;

    let configuration = manager
        .get_service_as::<ConfigurationService>(CONFIGURATION_SERVICE)
        .context("Configuration service is not active")?;
    info!(
        "Loaded {} configurations",
        configuration.configuration_count()
    );

    let context = ServiceContext::new(manager.clone()).with_configuration(configuration.clone());
    let core = CoreConfig::load_or_create(&context, &configuration);

    let status = StatusService::new(context.clone(), core.status_period());
    manager
        .register_service(StatusService::descriptor(), move || Ok(status))
        .await
        .context("Failed to register status service")?;

    Ok(Booted {
        context,
        configuration,
        core,
    })
}

/// Block until SIGINT or SIGTERM is received
#[cfg(unix)]
pub async fn wait_for_signal() -> Result<()> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handler")?;
    let signal = smol::unblock(move || signals.forever().next()).await;
    if let Some(signal) = signal {
        info!("Received signal {}", signal);
    }
    Ok(())
}

/// Block until a line is read from stdin
#[cfg(not(unix))]
pub async fn wait_for_signal() -> Result<()> {
    println!("Press Enter to stop");
    smol::unblock(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await
    .context("Failed to read from stdin")
}
