// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires the pipeline together and manages its lifecycle.
//!
//! ```text
//!   events (16) ──▶ Spooler ──batches (1)──▶ Publisher ──delivered (1)──▶ Registrar
//! ```
//!
//! Each stage runs as its own task and owns its end of the bounded queues;
//! no state is shared between stages. Dropping every event sender drains
//! the pipeline: pending events are flushed and delivered before the tasks
//! exit. [`ForwarderHandle::stop`] cancels instead, abandoning any retry in
//! progress.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ForwarderConfig;
use crate::constants::{BATCH_QUEUE_CAPACITY, EVENT_QUEUE_CAPACITY, REGISTRAR_QUEUE_CAPACITY};
use crate::crypto::KeyMaterial;
use crate::errors::ForwarderError;
use crate::event::FileEvent;
use crate::faithful::{FaithfulConfig, FaithfulConnection};
use crate::publisher::Publisher;
use crate::registrar::{Positions, Registrar};
use crate::spooler::{Spooler, SpoolerConfig};
use crate::transport::TransportContext;

/// Status of the forwarding pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Tasks are being spawned.
    Starting,
    /// Every stage is accepting work.
    Running,
    /// Stop was requested; stages are winding down.
    Stopping,
    /// Every stage has exited.
    Stopped,
}

/// Cloneable handle for observing and stopping a running forwarder.
#[derive(Debug, Clone)]
pub struct ForwarderHandle {
    status: Arc<RwLock<ServiceStatus>>,
    status_tx: broadcast::Sender<ServiceStatus>,
    positions: watch::Receiver<Positions>,
    cancel: CancellationToken,
}

impl ForwarderHandle {
    /// Check if the forwarder is currently running.
    pub async fn is_running(&self) -> bool {
        matches!(*self.status.read().await, ServiceStatus::Running)
    }

    /// Get the current status of the forwarder.
    pub async fn status(&self) -> ServiceStatus {
        *self.status.read().await
    }

    /// Subscribe to status changes from this point on.
    pub fn status_receiver(&self) -> broadcast::Receiver<ServiceStatus> {
        self.status_tx.subscribe()
    }

    /// Acknowledged positions per source, updated as batches are delivered.
    #[must_use]
    pub fn positions(&self) -> watch::Receiver<Positions> {
        self.positions.clone()
    }

    /// Cancels every stage, including a delivery that is still retrying.
    pub async fn stop(&self) {
        let mut status = self.status.write().await;
        if *status == ServiceStatus::Stopped {
            return;
        }

        *status = ServiceStatus::Stopping;
        drop(status);

        let _ = self.status_tx.send(ServiceStatus::Stopping);
        self.cancel.cancel();
    }
}

/// A started forwarder: the producer side of its input plus its tasks.
pub struct RunningForwarder {
    events: mpsc::Sender<FileEvent>,
    handle: ForwarderHandle,
    supervisor: JoinHandle<Result<(), ForwarderError>>,
}

impl RunningForwarder {
    /// Sender for new events. Blocks while the pipeline is saturated.
    #[must_use]
    pub fn events(&self) -> mpsc::Sender<FileEvent> {
        self.events.clone()
    }

    #[must_use]
    pub fn handle(&self) -> ForwarderHandle {
        self.handle.clone()
    }

    /// Releases this forwarder's event sender and waits for every stage to
    /// exit. Once other senders are gone too, all accepted events are
    /// delivered first unless the forwarder was stopped.
    pub async fn finish(self) -> Result<(), ForwarderError> {
        drop(self.events);
        self.supervisor
            .await
            .map_err(|e| ForwarderError::Task(e.to_string()))?
    }

    /// Like [`RunningForwarder::finish`], but stops the forwarder if
    /// `shutdown` completes before the drain does.
    pub async fn finish_or_stop<F>(self, shutdown: F) -> Result<(), ForwarderError>
    where
        F: Future<Output = ()>,
    {
        let handle = self.handle();
        let finish = self.finish();
        tokio::pin!(finish);

        tokio::select! {
            result = &mut finish => result,
            () = shutdown => {
                info!("Shutdown requested while draining");
                handle.stop().await;
                finish.await
            }
        }
    }
}

pub struct Forwarder<C: TransportContext> {
    context: Arc<C>,
    connection: FaithfulConfig,
    spooler: SpoolerConfig,
    keys: KeyMaterial,
}

impl<C: TransportContext + 'static> Forwarder<C> {
    #[must_use]
    pub fn new(
        context: Arc<C>,
        connection: FaithfulConfig,
        spooler: SpoolerConfig,
        keys: KeyMaterial,
    ) -> Self {
        Self {
            context,
            connection,
            spooler,
            keys,
        }
    }

    pub fn from_config(context: Arc<C>, config: &ForwarderConfig) -> Result<Self, ForwarderError> {
        config.validate()?;
        Ok(Self::new(
            context,
            config.faithful_config()?,
            config.spooler_config(),
            config.key_material()?,
        ))
    }

    /// Spawns the pipeline tasks.
    pub async fn start(self) -> Result<RunningForwarder, ForwarderError> {
        let status = Arc::new(RwLock::new(ServiceStatus::Starting));
        let (status_tx, _status_rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();

        let connection = FaithfulConnection::new(self.context, self.connection, cancel.clone())?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (batches_tx, batches_rx) = mpsc::channel(BATCH_QUEUE_CAPACITY);
        let (delivered_tx, delivered_rx) = mpsc::channel(REGISTRAR_QUEUE_CAPACITY);

        let spooler = Spooler::new(events_rx, batches_tx, self.spooler, cancel.clone());
        let publisher = Publisher::new(
            connection,
            &self.keys,
            batches_rx,
            delivered_tx,
            cancel.clone(),
        );
        let (registrar, positions) = Registrar::new(delivered_rx, cancel.clone());

        let spooler_task = tokio::spawn(spooler.run());
        let publisher_cancel = cancel.clone();
        let publisher_task = tokio::spawn(async move {
            let result = publisher.run().await;
            if result.is_err() {
                // Nothing downstream can make progress; release the other stages.
                publisher_cancel.cancel();
            }
            result
        });
        let registrar_task = tokio::spawn(registrar.run());

        *status.write().await = ServiceStatus::Running;
        let _ = status_tx.send(ServiceStatus::Running);
        debug!("Forwarder running");

        let status_clone = Arc::clone(&status);
        let status_tx_clone = status_tx.clone();
        let supervisor = tokio::spawn(async move {
            let published = publisher_task.await;
            if let Err(e) = spooler_task.await {
                error!("Spooler task failed: {e}");
            }
            if let Err(e) = registrar_task.await {
                error!("Registrar task failed: {e}");
            }

            let mut s = status_clone.write().await;
            *s = ServiceStatus::Stopped;
            drop(s);
            let _ = status_tx_clone.send(ServiceStatus::Stopped);
            info!("Forwarder stopped");

            match published {
                Ok(result) => result.map_err(ForwarderError::from),
                Err(e) => Err(ForwarderError::Task(e.to_string())),
            }
        });

        Ok(RunningForwarder {
            events: events_tx,
            handle: ForwarderHandle {
                status,
                status_tx,
                positions,
                cancel,
            },
            supervisor,
        })
    }
}
