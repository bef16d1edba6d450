//! # Tollgate Worker
//!
//! Maintenance process for the authorization core. It currently runs the
//! audit retention purge on a fixed interval until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/tollgate cargo run -p tollgate-worker
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tollgate_shared::store::postgres::PgStore;
use tollgate_worker::retention::{RetentionConfig, RetentionJob};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Tollgate Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = RetentionConfig::from_env()?;

    let store = PgStore::connect(config.database.clone()).await?;
    store.run_migrations().await?;

    let job = RetentionJob::new(Arc::new(store.clone()), config.retention_days);
    let shutdown = CancellationToken::new();

    let worker = tokio::spawn({
        let shutdown = shutdown.clone();
        let every = config.interval();
        async move { job.run(every, shutdown).await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping...");
    shutdown.cancel();

    worker.await?;
    store.close().await;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tollgate_worker=debug,tollgate_shared=info".into());

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
