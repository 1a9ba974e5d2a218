//! Structured logging with tracing
//!
//! Sets up:
//! - Console logging on stderr, text or JSON
//! - File logging with daily rotation (always JSON) when a log dir is set
//! - Level from RUST_LOG, falling back to the configured level

use super::config::{LogFormat, MonitoringConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "querybuilder.log";

/// Initialize the global tracing subscriber.
///
/// Returns the file writer guard when file logging is on; it must be kept
/// alive for the duration of the program or buffered lines are lost.
pub fn init_tracing(config: &MonitoringConfig) -> std::io::Result<Option<WorkerGuard>> {
    if !config.enabled {
        return Ok(None);
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    let console_layer = match config.log_format {
        LogFormat::Json => console_layer.json().boxed(),
        LogFormat::Text => console_layer.boxed(),
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let (non_blocking_file, guard) =
                tracing_appender::non_blocking(daily(dir, LOG_FILE_PREFIX));
            let layer = fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}
