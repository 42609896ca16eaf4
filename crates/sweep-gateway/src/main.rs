use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sweep_core::config::{AuthMode, SweepConfig};
use sweep_scheduler::{AuthContext, DailyDriver, DriverSettings, Notifier, SubscriptionStore};
use tracing::{info, warn};

mod app;
mod auth;
mod clients;
mod error;
mod extract;
mod http;

/// Upper bound on draining queued notifications at shutdown.
const NOTIFY_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "sweep-gateway", version, about = "Recurring cleaning subscription service")]
struct Cli {
    /// Config file. Falls back to $SWEEP_CONFIG, then ~/.sweep/sweep.toml.
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single driver pass for today and exit without serving HTTP.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sweep_gateway=info,sweep_scheduler=info,tower_http=debug".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    // load config: --config > SWEEP_CONFIG env > ~/.sweep/sweep.toml
    let config_path = cli.config.or_else(|| std::env::var("SWEEP_CONFIG").ok());
    let config = SweepConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SweepConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    let store = SubscriptionStore::new(db)?;
    info!("database migrations complete");

    let http_client = clients::build_http_client(&config.collaborators)?;
    let orders = Arc::new(clients::HttpOrderClient::new(
        http_client.clone(),
        &config.collaborators.orders_url,
    ));
    let notification_sender = Arc::new(clients::HttpNotificationClient::new(
        http_client.clone(),
        &config.collaborators.notifications_url,
    ));
    let (notifier, delivery) =
        Notifier::spawn(config.notifications.queue_capacity, notification_sender);

    let service_auth = config
        .collaborators
        .service_token
        .clone()
        .map(AuthContext::service)
        .unwrap_or_default();
    let driver = Arc::new(
        DailyDriver::new(
            store.clone(),
            orders,
            notifier.clone(),
            DriverSettings::from(&config.scheduler),
        )
        .with_auth(service_auth),
    );

    if cli.once {
        let today = chrono::Utc::now().date_naive();
        if let Some(report) = driver.run_pass(today).await {
            info!(?report, "single pass complete");
        }
        drop(driver);
        drop(notifier);
        // flush queued notifications before exiting
        if let Err(e) = delivery.await {
            warn!(error = %e, "notification delivery ended abnormally");
        }
        return Ok(());
    }

    let validator: Arc<dyn auth::AuthValidator> = match config.auth.mode {
        AuthMode::Remote => Arc::new(clients::HttpAuthValidator::new(
            http_client,
            &config.auth.url,
        )),
        AuthMode::None => {
            warn!("auth mode 'none': trusting X-User-Id / X-User-Role headers");
            Arc::new(auth::DenyAll)
        }
    };

    // spawn the daily driver loop in background
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let driver_task = tokio::spawn(Arc::clone(&driver).run(shutdown_rx));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = Arc::new(app::AppState::new(config, store, notifier, validator));
    let router = app::build_router(state);

    info!("Sweep gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // signal the driver to stop and let its current item finish
    let _ = shutdown_tx.send(true);
    if let Err(e) = driver_task.await {
        warn!(error = %e, "driver task ended abnormally");
    }

    // The router and the driver held the last notifier clones; the delivery
    // task exits once the queue is drained.
    drop(driver);
    match tokio::time::timeout(NOTIFY_FLUSH_TIMEOUT, delivery).await {
        Ok(Err(e)) => warn!(error = %e, "notification delivery ended abnormally"),
        Err(_) => warn!("notification queue not drained before shutdown"),
        Ok(Ok(())) => {}
    }
    info!("Sweep gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
