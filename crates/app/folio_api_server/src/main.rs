//! Folio API server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use folio_api::config::ApiConfig;
use folio_core::auth::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
use folio_core::books::{BookCatalog, InMemoryBookCatalog, PgBookCatalog};
use folio_core::ratelimit::{CounterStore, InMemoryCounterStore, RedisCounterStore};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::{error, info, warn};

/// CLI arguments for the API server. Anything not given here falls back to
/// the environment (see `ApiConfig::from_env`).
#[derive(Parser, Debug)]
#[command(name = "folio_api_server", about = "Folio API server")]
struct Args {
    /// Port to listen on; overrides the port of `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Redis URL for the rate-limit counters.
    #[arg(long)]
    redis_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Keep users, books and counters in memory. Nothing survives a restart.
    #[arg(long, default_value_t = false)]
    ephemeral: bool,
}

/// Backing stores chosen at startup.
struct Stores {
    credentials: Arc<dyn CredentialStore>,
    counters: Arc<dyn CounterStore>,
    catalog: Arc<dyn BookCatalog>,
    pool: Option<PgPool>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,folio_api=debug,folio_core=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env()?;
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".into());
        config.bind_addr = format!("{host}:{port}");
    }
    if let Some(url) = args.database_url.clone() {
        config.database_url = url;
    }
    if let Some(url) = args.redis_url.clone() {
        config.redis_url = url;
    }

    info!(
        bind_addr = %config.bind_addr,
        ephemeral = args.ephemeral,
        algorithm = ?config.token.algorithm,
        anonymous = ?config.rate_limit.anonymous,
        authenticated = ?config.rate_limit.authenticated,
        "starting folio_api_server"
    );

    let stores = if args.ephemeral {
        ephemeral_stores()
    } else {
        persistent_stores(&config, args.max_connections).await?
    };

    let state = folio_api::AppState::new(
        &config.token,
        config.rate_limit.clone(),
        stores.credentials,
        stores.counters,
        stores.catalog,
    );
    let app = folio_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Some(pool) = stores.pool {
        pool.close().await;
        info!("database pool closed");
    }
    result?;

    Ok(())
}

fn ephemeral_stores() -> Stores {
    warn!("ephemeral mode: users, books and rate-limit counters live in memory");
    let counters = Arc::new(InMemoryCounterStore::new());
    let sweeper = counters.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweeper.cleanup();
        }
    });
    Stores {
        credentials: Arc::new(InMemoryCredentialStore::new()),
        counters,
        catalog: Arc::new(InMemoryBookCatalog::new()),
        pool: None,
    }
}

async fn persistent_stores(
    config: &ApiConfig,
    max_connections: u32,
) -> Result<Stores, Box<dyn std::error::Error>> {
    info!(max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    info!("running database migrations");
    folio_core::migrate::migrate(&pool).await?;

    // Redis is contacted lazily; an outage only degrades rate limiting.
    let counters = RedisCounterStore::new(&config.redis_url)?;
    let probe = counters.clone();
    tokio::spawn(async move {
        match probe.ping().await {
            Ok(()) => info!("connected to Redis counter store"),
            Err(e) => warn!(error = %e, "Redis counter store unreachable, rate limiting fails open"),
        }
    });

    Ok(Stores {
        credentials: Arc::new(PgCredentialStore::new(pool.clone())),
        counters: Arc::new(counters),
        catalog: Arc::new(PgBookCatalog::new(pool.clone())),
        pool: Some(pool),
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        let mut stream = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        stream.recv().await;
        Ok::<(), std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    wait_for_shutdown(signal::ctrl_c(), terminate).await;
}

/// Resolve once either signal arrives. A handler that failed to install
/// never resolves, so it cannot trigger a shutdown by itself.
async fn wait_for_shutdown(
    ctrl_c: impl Future<Output = std::io::Result<()>>,
    terminate: impl Future<Output = std::io::Result<()>>,
) {
    let ctrl_c = async {
        if let Err(e) = ctrl_c.await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        if let Err(e) = terminate.await {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use std::future::{pending, ready};
    use std::io;

    use super::*;

    #[tokio::test]
    async fn failed_handlers_do_not_trigger_shutdown() {
        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            wait_for_shutdown(
                ready(Err::<(), _>(io::Error::other("no ctrl-c"))),
                ready(Err::<(), _>(io::Error::other("no sigterm"))),
            ),
        )
        .await;
        assert!(waited.is_err(), "shutdown fired without a signal");
    }

    #[tokio::test]
    async fn signal_triggers_shutdown() {
        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            wait_for_shutdown(ready(Ok::<(), io::Error>(())), pending::<io::Result<()>>()),
        )
        .await;
        assert!(waited.is_ok());
    }
}
