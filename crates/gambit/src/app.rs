//! Application lifecycle: construction, monitoring and phased shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent},
};
use match_server::{MatchServer, ServerStats};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Interval between periodic statistics reports
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// How long the server task may take to wind down after shutdown is requested
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(8);

/// Owns the configuration and the server for the lifetime of the process.
pub struct Application {
    config: AppConfig,
    server: Arc<MatchServer>,
}

impl Application {
    /// Loads configuration, applies CLI overrides, validates, and builds the server.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Returns
    ///
    /// A configured `Application` ready to run, or an error if the
    /// configuration could not be loaded or is invalid.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server = Arc::new(MatchServer::new(config.to_server_config()?));
        Ok(Self { config, server })
    }

    /// Runs until a shutdown signal arrives, then shuts down in phases.
    ///
    /// # Shutdown Phases
    ///
    /// 1. Stop the statistics monitor
    /// 2. Stop accepting, close sockets and drop all matches
    /// 3. Wait for the server task, bounded by a timeout
    /// 4. Log final statistics
    ///
    /// A second signal during shutdown exits the process immediately.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting gambit match server");
        self.log_configuration_summary();

        let server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move {
                match server.start().await {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => {
                        error!("❌ Server error: {}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        let monitoring_handle = {
            let server = self.server.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(STATS_INTERVAL);
                // First tick completes immediately
                interval.tick().await;
                loop {
                    interval.tick().await;
                    server.security().cleanup().await;
                    log_statistics("📊 Server health", &server.stats().await);
                }
            })
        };

        info!("✅ Gambit is now running on {}", self.config.server.bind_address);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        wait_for_shutdown_signal().await?;

        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up forced shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again, exiting immediately");
            std::process::exit(1);
        });

        info!("📡 Phase 1: Stopping statistics monitor...");
        monitoring_handle.abort();

        info!("🔌 Phase 2: Closing connections and dropping matches...");
        self.server.shutdown();

        info!("⏳ Phase 3: Waiting for server task to complete...");
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_handle).await {
            Ok(_) => info!("✅ Server task completed gracefully"),
            Err(_) => warn!("⏰ Server task did not complete within {:?}", SHUTDOWN_TIMEOUT),
        }

        log_statistics("📊 Final statistics", &self.server.stats().await);
        info!("👋 Gambit shutdown complete");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        let matches = &self.config.matches;
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!(
            "  ⏱️ Pending expiry: {}s | Disconnect grace: {}s | Finished retention: {}s | Abandoned: {}s",
            matches.pending_expiry_secs,
            matches.disconnect_grace_secs,
            matches.finished_retention_secs,
            matches.abandoned_match_secs
        );
        info!(
            "  🛡️ Rate limit: {} ({}/min) | Max frame: {} bytes",
            self.config.security.enable_rate_limiting,
            self.config.security.max_requests_per_minute,
            self.config.security.max_message_size
        );
    }
}

fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

fn log_statistics(title: &str, stats: &ServerStats) {
    let matches = &stats.coordinator.matches;
    info!(
        "{} - {} connections | {} matches ({} pending, {} ready, {} started, {} finished) | {} timers | {} rate-limited",
        title,
        stats.connections,
        matches.total,
        matches.pending,
        matches.ready,
        matches.started,
        matches.finished,
        stats.coordinator.armed_timers,
        stats.security.rate_limited_requests
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args(config_path: PathBuf) -> CliArgs {
        CliArgs {
            config_path,
            bind_address: None,
            log_level: None,
            json_logs: false,
        }
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            bind_address: Some("0.0.0.0:9100".to_string()),
            log_level: Some("debug".to_string()),
            json_logs: true,
            ..args(PathBuf::from("unused.toml"))
        };

        apply_overrides(&mut config, &args);
        assert_eq!(config.server.bind_address, "0.0.0.0:9100");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_application_creation_writes_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gambit.toml");

        let app = Application::new(args(path.clone())).await.unwrap();
        assert!(path.exists());
        assert_eq!(app.server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_application_rejects_invalid_override() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs {
            log_level: Some("shouty".to_string()),
            ..args(dir.path().join("gambit.toml"))
        };

        assert!(Application::new(args).await.is_err());
    }
}
