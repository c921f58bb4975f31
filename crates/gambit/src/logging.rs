//! Logging system setup.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
///
/// # Arguments
///
/// * `config` - Logging configuration from the config file
/// * `json_format` - Force JSON output regardless of the file setting
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(false).with_thread_names(true))
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Logs the startup banner.
pub fn display_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("╔══════════════════════════════════════╗");
    info!("║            ♞  GAMBIT  ♞              ║");
    info!("║     Real-time chess match server     ║");
    info!("║                v{:<8}             ║", version);
    info!("╚══════════════════════════════════════╝");
}
