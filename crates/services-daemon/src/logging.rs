//! Tracing setup for the daemon

use anyhow::{Context, Result};
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

/// Installed subscriber. Keep it alive for the lifetime of the process so the
/// file sink gets flushed.
pub struct Logging {
    level: reload::Handle<LevelFilter, Registry>,
    _guard: Option<WorkerGuard>,
}

/// Install stdout logging and, if `log_file` is set, a non-blocking file sink
pub fn init(debug: bool, log_file: Option<&Path>) -> Result<Logging> {
    let (filter, level) = reload::Layer::new(level_for(debug));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(directory)
                .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false) // No ANSI colors in log file
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(Logging {
        level,
        _guard: guard,
    })
}

impl Logging {
    /// Switch between INFO and DEBUG output
    pub fn set_debug(&self, debug: bool) -> Result<()> {
        self.level
            .reload(level_for(debug))
            .context("Failed to change log level")
    }
}

fn level_for(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}
