//! API server entry point.

use api::config::{Config, LogFormat};
use inventory::{InMemoryInventoryLedger, InventoryLedger, PostgresInventoryLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::GatewayMode;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Seeds the catalog, builds the router and serves until shutdown.
async fn serve<L: InventoryLedger + Clone + 'static>(
    config: &Config,
    ledger: L,
    metrics_handle: PrometheusHandle,
) {
    if let Some(path) = &config.catalog_path {
        api::catalog::seed(&ledger, path)
            .await
            .expect("failed to load catalog");
    }

    let mode = GatewayMode::from_test_mode(config.payment_test_mode);
    tracing::info!(?mode, "payment gateway configured");
    let app = api::create_app(api::create_state(ledger, mode), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the inventory ledger and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let ledger = PostgresInventoryLedger::new(pool).with_lock_timeout(config.lock_timeout);
            ledger
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using postgres inventory ledger");
            serve(&config, ledger, metrics_handle).await;
        }
        None => {
            let ledger = InMemoryInventoryLedger::new().with_lock_timeout(config.lock_timeout);
            tracing::info!("using in-memory inventory ledger");
            serve(&config, ledger, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
