//! Reusable OCPP Central System server runtime.
//!
//! [`ServerHandle`] owns the full lifecycle: storage init and migrations,
//! metrics exporter, OCPP WebSocket server, pending-command sweeper and
//! graceful shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::{
    create_command_sender, ActionDispatcher, ChargingService, SessionRegistry,
    SharedCommandSender, SharedSessionRegistry,
};
use crate::config::AppConfig;
use crate::domain::ChargingStore;
use crate::infrastructure::{init_database, DatabaseConfig, InMemoryStorage, SeaOrmStorage};
use crate::interfaces::OcppServer;
use crate::support::shutdown::{ShutdownCoordinator, ShutdownSignal};

pub type StartResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the OCPP Central System.
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running OCPP Central System.
///
/// ```rust,no_run
/// use ocpp_power_manager::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     handle.install_signal_handler();
///     handle.wait().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    /// Storage backend selected by `database.url`.
    pub store: Arc<dyn ChargingStore>,
    /// Active WebSocket session registry.
    pub session_registry: SharedSessionRegistry,
    /// Outbound command issuer.
    pub command_sender: SharedCommandSender,
    /// The OCPP WebSocket server, for pausing and resuming admission.
    pub server: Arc<OcppServer>,
    /// The configuration the server was started with.
    pub config: AppConfig,
    /// Address the WebSocket listener is bound to.
    pub local_addr: SocketAddr,

    db: Option<DatabaseConnection>,
    shutdown: ShutdownCoordinator,
    signal: ShutdownSignal,
    ws_task: JoinHandle<()>,
    sweeper_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Start the OCPP Central System with the given options.
    pub async fn start(opts: ServerOptions) -> StartResult<Self> {
        let app_cfg = opts.config;
        app_cfg.validate()?;

        info!("Starting OCPP Power Manager...");

        if app_cfg.metrics.enabled {
            install_prometheus_exporter(&app_cfg.metrics.listen);
        }

        // ── Storage ────────────────────────────────────────────
        let (store, db): (Arc<dyn ChargingStore>, Option<DatabaseConnection>) =
            if app_cfg.database.is_memory() {
                info!("Using in-memory storage, state is lost on exit");
                (Arc::new(InMemoryStorage::new()), None)
            } else {
                let db_config = DatabaseConfig {
                    url: app_cfg.database.url.clone(),
                    auto_migrate: opts.auto_migrate,
                };
                let db = init_database(&db_config).await?;
                (Arc::new(SeaOrmStorage::new(db.clone())), Some(db))
            };

        // ── Session & command infrastructure ───────────────────
        let signal = ShutdownSignal::new();
        let shutdown = ShutdownCoordinator::new(signal.clone(), app_cfg.server.shutdown_timeout);

        let session_registry = SessionRegistry::shared();
        let command_sender =
            create_command_sender(session_registry.clone(), app_cfg.ocpp.command_timeout());
        let sweeper_task =
            command_sender.start_sweeper(app_cfg.ocpp.pending_sweep_interval(), signal.clone());

        let service = Arc::new(ChargingService::new(store.clone()));
        let dispatcher = Arc::new(ActionDispatcher::new(
            service,
            command_sender.clone(),
            app_cfg.ocpp.clone(),
        ));

        // ── OCPP WebSocket server ──────────────────────────────
        let address = app_cfg.server.address();
        let listener = TcpListener::bind(&address).await?;
        let local_addr = listener.local_addr()?;

        let server = Arc::new(OcppServer::new(
            address,
            session_registry.clone(),
            dispatcher,
            signal.clone(),
        ));

        let serving = server.clone();
        let ws_task = tokio::spawn(async move {
            if let Err(e) = serving.serve(listener).await {
                error!(error = %e, "WebSocket server error");
            }
        });

        info!(address = %local_addr, "OCPP Power Manager started");

        Ok(Self {
            store,
            session_registry,
            command_sender,
            server,
            config: app_cfg,
            local_addr,
            db,
            shutdown,
            signal,
            ws_task,
            sweeper_task,
        })
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.signal.trigger();
    }

    /// Wait for the shutdown signal, then stop every task within
    /// `server.shutdown_timeout`. Returns `false` if the timeout was hit.
    pub async fn wait(self) -> bool {
        let Self {
            session_registry,
            db,
            shutdown,
            ws_task,
            sweeper_task,
            ..
        } = self;

        let completed = shutdown
            .shutdown_with_cleanup(|| async move {
                if let Err(e) = ws_task.await {
                    error!(error = %e, "WebSocket server task panicked");
                }
                while session_registry.count() > 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                info!("All charge point sessions closed");
                if let Err(e) = sweeper_task.await {
                    error!(error = %e, "Pending command sweeper panicked");
                }
                if let Some(db) = db {
                    match db.close().await {
                        Ok(()) => info!("Database connection closed"),
                        Err(e) => warn!(error = %e, "Error closing database connection"),
                    }
                }
            })
            .await;

        info!("OCPP Power Manager shutdown complete");
        completed
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) -> bool {
        info!("Shutting down OCPP Central System...");
        self.trigger_shutdown();
        self.wait().await
    }

    pub fn is_running(&self) -> bool {
        !self.ws_task.is_finished()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Install the Prometheus recorder and scrape listener.
///
/// The global recorder can only be installed once per process; later calls
/// keep the first one.
fn install_prometheus_exporter(listen: &str) {
    static INSTALLED: AtomicBool = AtomicBool::new(false);
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let addr: SocketAddr = match listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(listen, error = %e, "Invalid metrics listen address, exporter disabled");
            return;
        }
    };

    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => info!(address = %addr, "Prometheus metrics exporter listening"),
        Err(e) => warn!(error = %e, "Failed to install Prometheus exporter"),
    }
}

/// Initialize tracing (logging) from the application config.
///
/// `RUST_LOG` takes precedence over `logging.level`. Call once at process
/// startup; later calls are ignored.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let result = match config.logging.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already installed");
    }
}
