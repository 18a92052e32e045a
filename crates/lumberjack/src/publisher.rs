// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivers batches to a collector, one at a time, until each is acknowledged.
//!
//! Every batch is encoded and sealed exactly once. Transport failures only
//! ever repeat the exchange of those same bytes: nonce frame, ciphertext
//! frame, then one reply frame whose content is ignored. Failures to encode
//! or seal are not transport problems and stop the publisher.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::crypto::{BoxSession, KeyMaterial};
use crate::errors::{ConnectionError, PublishError};
use crate::event::Batch;
use crate::faithful::FaithfulConnection;
use crate::payload;
use crate::transport::TransportContext;

/// Where a batch is in its delivery.
///
/// A failed exchange moves `AwaitingAck` (or `Sending`) back to `Sending`,
/// never to `Prepared`: the sealed bytes are reused, not recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Prepared,
    Sending,
    AwaitingAck,
    Delivered,
}

/// A batch together with its wire form.
#[derive(Debug)]
pub struct PreparedBatch {
    batch: Batch,
    nonce: Bytes,
    ciphertext: Bytes,
    state: BatchState,
    attempts: u32,
}

impl PreparedBatch {
    /// Serializes, compresses and seals `batch`.
    pub fn prepare(batch: Batch, session: &BoxSession) -> Result<Self, PublishError> {
        let encoded = payload::encode(batch.events())?;
        let sealed = session.seal(&encoded)?;
        trace!(
            "Batch {}: {} events, {} compressed bytes, {} sealed bytes",
            batch.sequence(),
            batch.len(),
            encoded.len(),
            sealed.ciphertext.len()
        );
        Ok(Self {
            batch,
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            state: BatchState::Prepared,
            attempts: 0,
        })
    }

    #[must_use]
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Number of exchanges started for this batch.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn nonce(&self) -> &Bytes {
        &self.nonce
    }

    #[must_use]
    pub fn ciphertext(&self) -> &Bytes {
        &self.ciphertext
    }

    #[must_use]
    pub fn into_batch(self) -> Batch {
        self.batch
    }

    fn advance(&mut self, next: BatchState) {
        trace!(
            "Batch {}: {:?} -> {:?}",
            self.batch.sequence(),
            self.state,
            next
        );
        self.state = next;
    }
}

pub struct Publisher<C: TransportContext> {
    connection: FaithfulConnection<C>,
    session: BoxSession,
    input: mpsc::Receiver<Batch>,
    delivered: mpsc::Sender<Batch>,
    cancel: CancellationToken,
}

impl<C: TransportContext> Publisher<C> {
    /// Create a new publisher that seals every batch with `keys`.
    #[must_use]
    pub fn new(
        connection: FaithfulConnection<C>,
        keys: &KeyMaterial,
        input: mpsc::Receiver<Batch>,
        delivered: mpsc::Sender<Batch>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connection,
            session: BoxSession::new(keys),
            input,
            delivered,
            cancel,
        }
    }

    /// Publishes batches until the input closes or cancellation.
    ///
    /// Returns an error when a batch cannot be encoded or sealed, or when no
    /// socket can be opened at all.
    pub async fn run(mut self) -> Result<(), PublishError> {
        debug!("Publisher started");
        let result = loop {
            let batch = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break Ok(()),
                batch = self.input.recv() => batch,
            };
            let Some(batch) = batch else {
                debug!("Batch queue closed");
                break Ok(());
            };

            match self.publish(batch).await {
                Ok(delivered) => self.register(delivered).await,
                Err(PublishError::Cancelled) => break Ok(()),
                Err(e) => {
                    error!("Stopping publisher: {e}");
                    break Err(e);
                }
            }
        };

        self.connection.close().await;
        debug!("Publisher stopped");
        result
    }

    /// Prepares and delivers one batch, returning it once acknowledged.
    /// An empty batch is returned as is without a round trip.
    pub async fn publish(&mut self, batch: Batch) -> Result<Batch, PublishError> {
        if batch.is_empty() {
            debug!("Batch {} is empty, nothing to send", batch.sequence());
            return Ok(batch);
        }
        let mut prepared = PreparedBatch::prepare(batch, &self.session)?;
        self.deliver(&mut prepared).await?;
        Ok(prepared.into_batch())
    }

    /// Repeats the exchange of the prepared bytes until a reply arrives.
    pub async fn deliver(&mut self, prepared: &mut PreparedBatch) -> Result<(), PublishError> {
        loop {
            prepared.attempts += 1;
            match self.exchange(prepared).await {
                Ok(reply) => {
                    prepared.advance(BatchState::Delivered);
                    info!(
                        "Delivered batch {} ({} events) after {} attempts",
                        prepared.batch.sequence(),
                        prepared.batch.len(),
                        prepared.attempts
                    );
                    trace!("Acknowledgement was {} bytes", reply.len());
                    return Ok(());
                }
                Err(ConnectionError::Cancelled) => {
                    debug!(
                        "Delivery of batch {} cancelled after {} attempts",
                        prepared.batch.sequence(),
                        prepared.attempts
                    );
                    return Err(PublishError::Cancelled);
                }
                // Retrying cannot help when no socket can be created.
                Err(e @ ConnectionError::Socket(_)) => return Err(PublishError::Connection(e)),
                Err(e) => warn!(
                    "Batch {} attempt {} failed, retrying: {e}",
                    prepared.batch.sequence(),
                    prepared.attempts
                ),
            }
        }
    }

    async fn exchange(&mut self, prepared: &mut PreparedBatch) -> Result<Bytes, ConnectionError> {
        prepared.advance(BatchState::Sending);
        self.connection.send(prepared.nonce.clone(), true).await?;
        self.connection
            .send(prepared.ciphertext.clone(), false)
            .await?;
        prepared.advance(BatchState::AwaitingAck);
        self.connection.receive().await
    }

    async fn register(&mut self, batch: Batch) {
        if self.delivered.is_closed() {
            debug!("Registrar gone, not recording batch {}", batch.sequence());
            return;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {}
            result = self.delivered.send(batch) => {
                if let Err(e) = result {
                    debug!("Registrar gone, not recording batch {}", e.0.sequence());
                }
            }
        }
    }
}
