use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::db;
use crate::notify::{HttpNotifier, NoopNotifier, TableNotifier};
use crate::scanner::ScanIngester;
use crate::store::{SeaOrmTableStore, TableStore};
use crate::table::coordinator::{CoordinatorConfig, TableCoordinator};

use super::routes::{build_router, ServerContext};

const LOG_TARGET: &str = "server::bootstrap";
const SCAN_CHANNEL_CAPACITY: usize = 256;

pub struct ServerConfig {
    pub bind: SocketAddr,
    pub database_url: String,
    /// Fan-out endpoint for table-update notifications; notifications
    /// are disabled when unset.
    pub publish_url: Option<Url>,
    pub op_timeout: Duration,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let conn = db::connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    let store: Arc<dyn TableStore> = Arc::new(SeaOrmTableStore::new(conn));

    let notifier: Arc<dyn TableNotifier> = match &config.publish_url {
        Some(url) => Arc::new(HttpNotifier::new(url.clone())),
        None => {
            warn!(
                target: LOG_TARGET,
                "no publish endpoint configured; table updates will not fan out"
            );
            Arc::new(NoopNotifier)
        }
    };

    let coordinator = Arc::new(TableCoordinator::new(
        Arc::clone(&store),
        notifier,
        CoordinatorConfig {
            op_timeout: config.op_timeout,
            max_attempts: 3,
        },
    ));

    let shutdown = CancellationToken::new();
    let (scan_tx, scan_rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
    let ingester = Arc::new(ScanIngester::new(
        Arc::clone(&coordinator),
        Arc::clone(&store),
        shutdown.clone(),
    ));
    let ingester_handle = tokio::spawn(Arc::clone(&ingester).run(scan_rx));

    let context = Arc::new(ServerContext {
        coordinator,
        scans: scan_tx,
    });
    let router = build_router(context, config.op_timeout);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(target: LOG_TARGET, %local_addr, "table engine listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server exited with error")?;

    shutdown.cancel();
    ingester_handle
        .await
        .context("failed to join scan ingester")?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target: LOG_TARGET,
            error = %err,
            "failed to install ctrl-c handler"
        );
    }
    info!(target: LOG_TARGET, "shutdown signal received");
    shutdown.cancel();
}
