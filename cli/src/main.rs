//! OCPP Power Manager — CLI server
//!
//! Headless OCPP 1.6J Central System suitable for a systemd service,
//! a container, or a standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-power-manager/config.toml)
//! ocpp-power-manager
//!
//! # Custom config path, in-memory storage
//! ocpp-power-manager --config /etc/ocpp-power-manager/config.toml --database-url memory
//!
//! # Validate config without starting
//! ocpp-power-manager --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};

use ocpp_power_manager::config::AppConfig;
use ocpp_power_manager::server::{init_tracing, ServerHandle, ServerOptions};

/// OCPP Power Manager — OCPP 1.6J central system for EV charging stations.
#[derive(Parser, Debug)]
#[command(
    name = "ocpp-power-manager",
    version,
    about = "OCPP 1.6J Central System for EV charging stations",
    long_about = "OCPP Power Manager — WebSocket server speaking OCPP 1.6J with charge points.\n\n\
                  Default config: ~/.config/ocpp-power-manager/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the WebSocket listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the database URL ("memory" selects the in-memory store).
    #[arg(long, env = "OCPP_DATABASE_URL")]
    database_url: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(ocpp_power_manager::default_config_path);

    let loaded = AppConfig::load(&config_path);
    let mut config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => AppConfig::default(),
    };

    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config);

    match loaded {
        Ok(_) => info!("Configuration loaded from {}", config_path.display()),
        Err(e) => {
            error!("Failed to load config from {}: {}", config_path.display(), e);
            if cli.check {
                return Err(e.into());
            }
            warn!("Using default configuration.");
        }
    }

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.port {
        info!("CLI override: port = {}", port);
        config.server.port = port;
    }
    if let Some(ref url) = cli.database_url {
        info!("CLI override: database_url = {}", url);
        config.database.url = url.clone();
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        config.validate()?;
        println!("Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   WS address  : {}", config.server.address());
        println!("   Database    : {}", config.database.url);
        println!("   Log level   : {}", config.logging.level);
        println!(
            "   Metrics     : {}",
            if config.metrics.enabled {
                config.metrics.listen.as_str()
            } else {
                "disabled"
            }
        );
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
    })
    .await?;

    // Install OS signal handlers (SIGTERM, SIGINT)
    handle.install_signal_handler();

    info!("Press Ctrl+C to shutdown gracefully.");

    if !handle.wait().await {
        warn!("Some tasks did not stop before the shutdown timeout");
    }

    Ok(())
}
