//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::audit::QueueAuditSink;
use api::config::{Config, LogFormat};
use cache::{Cache, InMemoryCache, RedisCache};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env()?;
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the store backend, then the cache backend, then serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await?;
            let store = PostgresStore::new(pool).with_lock_timeout(config.checkout.lock_timeout);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL store");
            with_cache(config, store, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            let store = InMemoryStore::new().with_lock_timeout(config.checkout.lock_timeout);
            with_cache(config, store, metrics_handle).await
        }
    }
}

async fn with_cache<S>(
    config: Config,
    store: S,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError>
where
    S: Store + Clone + 'static,
{
    match config.redis_url.clone() {
        Some(url) => {
            let cache = RedisCache::connect(&url).await?;
            tracing::info!("using Redis cache");
            serve(config, store, cache, metrics_handle).await
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory cache");
            serve(config, store, InMemoryCache::new(), metrics_handle).await
        }
    }
}

async fn serve<S, C>(
    config: Config,
    store: S,
    cache: C,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let (audit, audit_worker) = QueueAuditSink::spawn(config.audit_buffer_size);
    let state = api::create_state(store, cache, &config, Arc::new(audit));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router and its state are gone, so the audit queue is closed.
    audit_worker.await?;
    tracing::info!("server shut down gracefully");
    Ok(())
}
