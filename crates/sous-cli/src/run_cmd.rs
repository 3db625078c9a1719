//! The `sous run` command: wires the store, the in-process bus, the four
//! workers, the queue loader, and the status server, then runs until a
//! shutdown signal drains everything.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use sous_core::bus::memory::{MemoryBus, MemoryBusConfig};
use sous_core::config::ServiceConfig;
use sous_core::scheduler::{QueueLoader, QueueLoaderConfig};
use sous_core::workers::subscribe_workers;
use sous_db::config::DbConfig;
use sous_db::contract::PgPlannerStore;
use sous_db::pool;

use crate::serve;

pub async fn run(db: DbConfig, status_port: u16) -> Result<()> {
    let mut config = ServiceConfig::from_env().context("failed to resolve service config")?;
    config.db = db;

    let pool = pool::create_pool(&config.db).await?;
    let store = Arc::new(PgPlannerStore::new(pool.clone()));

    let bus = Arc::new(MemoryBus::new(MemoryBusConfig {
        message_deadline: config.message_deadline,
        drain_grace: config.drain_grace,
        ..MemoryBusConfig::default()
    }));

    let workers = subscribe_workers(bus.as_ref(), store, bus.clone(), &config)
        .await
        .context("failed to subscribe workers")?;

    let cancel = CancellationToken::new();

    // Status server first so the queue loader can probe it.
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", status_port))
        .await
        .with_context(|| format!("failed to bind status server on port {status_port}"))?;
    let status_addr = listener.local_addr()?;
    let app = serve::router(serve::AppState {
        pool: pool.clone(),
        webhook_executor: workers.webhook_executor.clone(),
    });
    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_cancel.cancelled_owned())
            .await
    });
    info!(addr = %status_addr, "status server listening");

    let loader = QueueLoader::new(
        bus.clone(),
        pool.clone(),
        QueueLoaderConfig {
            cease_operation: config.cease_operation,
            chores_topic: config.topics.chores.clone(),
            probe_url: Some(format!("http://{status_addr}/ready")),
            ..QueueLoaderConfig::default()
        },
    )?;
    let loader_cancel = cancel.clone();
    let mut loader_task = tokio::spawn(async move { loader.run(loader_cancel).await });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("shutdown signal received, draining");
            cancel.cancel();
            loader_task
                .await
                .context("queue loader task panicked")?
                .context("queue loader failed")?;
        }
        // The loader only returns early when startup probes fail.
        result = &mut loader_task => {
            cancel.cancel();
            result
                .context("queue loader task panicked")?
                .context("queue loader failed")?;
        }
    }

    bus.shutdown().await;
    server.await.context("status server task panicked")??;
    pool.close().await;

    info!("shutdown complete");
    Ok(())
}
