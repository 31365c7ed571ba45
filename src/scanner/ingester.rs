//! Queue consumer for hardware card scans.
//!
//! A single dispatcher resolves each message's device and routes it to a
//! FIFO worker owned by the device's table, so dealing order per table
//! matches enqueue order while tables progress in parallel. Delivery is
//! at-least-once: messages are acknowledged after processing, including
//! when the card is rejected (duplicates are harmless by card
//! uniqueness and must not block the stream).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::cards::Card;
use crate::engine::errors::EngineError;
use crate::engine::types::{DeviceKind, TableId};
use crate::store::TableStore;
use crate::table::coordinator::TableCoordinator;

use super::barcode::parse_barcode;

const LOG_TARGET: &str = "felt_poker::scanner::ingester";
const WORKER_QUEUE_DEPTH: usize = 64;
const STORE_RETRY_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug)]
pub struct ScanMessage {
    pub serial: String,
    pub barcode: String,
    pub enqueued_at: DateTime<Utc>,
}

/// One queue delivery. Dropping the delivery without `ack` leaves the
/// message unacknowledged, so the sender redelivers it.
#[derive(Debug)]
pub struct ScanDelivery {
    pub message: ScanMessage,
    ack: Option<oneshot::Sender<()>>,
}

impl ScanDelivery {
    /// Pairs the delivery with a receiver that resolves once the message
    /// has been processed and acknowledged.
    pub fn new(message: ScanMessage) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                message,
                ack: Some(tx),
            },
            rx,
        )
    }

    fn ack(mut self) {
        if let Some(tx) = self.ack.take() {
            let _ = tx.send(());
        }
    }
}

pub struct ScanIngester {
    coordinator: Arc<TableCoordinator>,
    store: Arc<dyn TableStore>,
    workers: DashMap<TableId, mpsc::Sender<(Card, ScanDelivery)>>,
    shutdown: CancellationToken,
}

impl ScanIngester {
    pub fn new(
        coordinator: Arc<TableCoordinator>,
        store: Arc<dyn TableStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            store,
            workers: DashMap::new(),
            shutdown,
        }
    }

    /// Drains the inbound queue until it closes or shutdown fires.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<ScanDelivery>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                delivery = inbound.recv() => match delivery {
                    Some(delivery) => self.dispatch(delivery).await,
                    None => break,
                },
            }
        }
        info!(target: LOG_TARGET, "scan ingester stopped");
    }

    async fn dispatch(&self, delivery: ScanDelivery) {
        let serial = delivery.message.serial.clone();

        let card = match parse_barcode(&delivery.message.barcode) {
            Ok(card) => card,
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    serial,
                    barcode = %delivery.message.barcode,
                    kind = err.kind(),
                    "dropping unreadable scan"
                );
                delivery.ack();
                return;
            }
        };

        let table_id = match self.resolve_device(&serial).await {
            Ok(table_id) => table_id,
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    serial,
                    kind = err.kind(),
                    error = %err,
                    "dropping scan from unusable device"
                );
                delivery.ack();
                return;
            }
        };

        let worker = self.worker_for(table_id);
        if worker.send((card, delivery)).await.is_err() {
            warn!(
                target: LOG_TARGET,
                table_id = %table_id,
                "scan worker gone; message will be redelivered"
            );
        }
    }

    /// Looks the scanner up by serial and touches its last-seen clock.
    async fn resolve_device(&self, serial: &str) -> Result<TableId, EngineError> {
        let mut txn = self.store.begin().await?;
        let result = async {
            let device = txn
                .as_mut()
                .device_by_serial(serial)
                .await?
                .ok_or(EngineError::NotFound("device"))?;
            if device.kind != DeviceKind::Scanner {
                return Err(EngineError::DeviceMisconfigured(
                    "device is not a card scanner",
                ));
            }
            txn.as_mut().touch_device(device.id, Utc::now()).await?;
            Ok(device.table_id)
        }
        .await;
        match result {
            Ok(table_id) => {
                txn.commit().await?;
                Ok(table_id)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    fn worker_for(&self, table_id: TableId) -> mpsc::Sender<(Card, ScanDelivery)> {
        self.workers
            .entry(table_id)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
                let coordinator = Arc::clone(&self.coordinator);
                let shutdown = self.shutdown.clone();
                tokio::spawn(table_worker(coordinator, table_id, rx, shutdown));
                tx
            })
            .clone()
    }
}

async fn table_worker(
    coordinator: Arc<TableCoordinator>,
    table_id: TableId,
    mut rx: mpsc::Receiver<(Card, ScanDelivery)>,
    shutdown: CancellationToken,
) {
    loop {
        let (card, delivery) = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(next) => next,
                None => break,
            },
        };

        apply_scan(&coordinator, table_id, card).await;
        delivery.ack();
    }
}

async fn apply_scan(coordinator: &TableCoordinator, table_id: TableId, card: Card) {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match coordinator.deal_scanned(table_id, card).await {
            Ok(_) => return,
            Err(err) if matches!(err, EngineError::StoreConflict | EngineError::Store(_)) => {
                if attempt >= STORE_RETRY_ATTEMPTS {
                    error!(
                        target: LOG_TARGET,
                        table_id = %table_id,
                        card = %card,
                        error = %err,
                        "giving up on scan after repeated store failures"
                    );
                    return;
                }
                warn!(
                    target: LOG_TARGET,
                    table_id = %table_id,
                    attempt,
                    error = %err,
                    "store failure while applying scan; backing off"
                );
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
            }
            Err(err) => {
                // Domain rejections (duplicate card, wrong phase, no
                // active game) are logged and acknowledged.
                warn!(
                    target: LOG_TARGET,
                    table_id = %table_id,
                    card = %card,
                    kind = err.kind(),
                    "scan rejected"
                );
                return;
            }
        }
    }
}
