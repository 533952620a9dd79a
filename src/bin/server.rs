use apiwatch::alerting::AlertService;
use apiwatch::db::memory::MemoryStore;
use apiwatch::db::postgres::PgStore;
use apiwatch::db::{AlertStore, HistoryStore, MonitorStore, UserDirectory};
use apiwatch::monitoring::{Prober, Scheduler, StatusUpdater};
use apiwatch::notifications::NotificationService;
use apiwatch::realtime::{RealtimePublisher, RoomHub};
use apiwatch::server::config::ServerConfig;
use apiwatch::server::logging::init_logging;
use apiwatch::web::{AppState, create_axum_router};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "API monitoring server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

struct Stores {
    monitors: Arc<dyn MonitorStore>,
    history: Arc<dyn HistoryStore>,
    alerts: Arc<dyn AlertStore>,
    users: Arc<dyn UserDirectory>,
}

async fn open_stores(
    config: &ServerConfig,
) -> Result<Stores, Box<dyn std::error::Error + Send + Sync>> {
    match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            info!("Connected to PostgreSQL.");
            let store = Arc::new(PgStore::new(pool));
            store.run_migrations().await?;
            Ok(Stores {
                monitors: store.clone(),
                history: store.clone(),
                alerts: store.clone(),
                users: store,
            })
        }
        None => {
            warn!("No database_url configured, using in-memory stores.");
            let store = Arc::new(MemoryStore::new());
            Ok(Stores {
                monitors: store.clone(),
                history: store.clone(),
                alerts: store.clone(),
                users: store,
            })
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config = Arc::new(ServerConfig::load(args.config.as_deref())?);
    let _log_guard = init_logging(&config.log_dir);

    let stores = open_stores(&config).await?;

    let hub = Arc::new(RoomHub::new());
    let notifications = Arc::new(NotificationService::from_config(&config)?);
    let alert_service = Arc::new(AlertService::new(
        stores.alerts,
        stores.users,
        RealtimePublisher::new(hub.clone()),
        notifications,
        config.latency_alert_cooldown_secs,
    ));

    let updater = Arc::new(StatusUpdater::new(
        stores.monitors.clone(),
        stores.history,
        alert_service.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        stores.monitors,
        Prober::new()?,
        updater,
        config.max_concurrent_checks,
    ));
    let tick = Duration::from_secs(config.check_tick_secs.max(1));
    tokio::spawn(scheduler.start_periodic_checks(tick));

    let app_state = Arc::new(AppState {
        alert_service,
        hub,
        config: config.clone(),
    });
    let app_router = create_axum_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "HTTP server listening.");
    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
