// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Groups incoming events into batches for the publisher.
//!
//! ```text
//!   producers ──events──▶ Spooler ──batches (capacity 1)──▶ Publisher
//! ```
//!
//! A batch is flushed when it reaches `spool_size` events, or when the idle
//! flush time has passed since the last flush and at least one event is
//! waiting. Events keep their arrival order within and across batches.
//!
//! The batch queue is deliberately tiny. While the publisher is busy the
//! spooler blocks on it, stops draining its own input, and producers in turn
//! block on theirs: slow delivery throttles reading instead of growing memory.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::constants::{DEFAULT_IDLE_FLUSH_TIME, DEFAULT_SPOOL_SIZE};
use crate::event::{Batch, FileEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpoolerConfig {
    /// Events per batch before a flush is forced.
    pub spool_size: usize,
    /// Longest time events wait for a full spool.
    pub idle_flush_time: Duration,
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self {
            spool_size: DEFAULT_SPOOL_SIZE,
            idle_flush_time: DEFAULT_IDLE_FLUSH_TIME,
        }
    }
}

/// Turns the event stream into numbered batches.
pub struct Spooler {
    input: mpsc::Receiver<FileEvent>,
    output: mpsc::Sender<Batch>,
    spool_size: usize,
    idle_flush_time: Duration,
    cancel: CancellationToken,
    next_sequence: u64,
}

impl Spooler {
    #[must_use]
    pub fn new(
        input: mpsc::Receiver<FileEvent>,
        output: mpsc::Sender<Batch>,
        config: SpoolerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            input,
            output,
            spool_size: config.spool_size.max(1),
            idle_flush_time: config.idle_flush_time,
            cancel,
            next_sequence: 0,
        }
    }

    /// Runs until the input closes, the publisher goes away, or cancellation.
    ///
    /// Events still spooled when the input closes are flushed before
    /// returning; dropping the output sender then lets the publisher finish.
    pub async fn run(mut self) {
        debug!("Spooler started");
        let mut spool: Vec<FileEvent> = Vec::with_capacity(self.spool_size);
        // Moves only on a flush, so an overdue deadline fires on arrival.
        let mut next_flush = Instant::now() + self.idle_flush_time;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    if !spool.is_empty() {
                        warn!("Spooler cancelled with {} unflushed events", spool.len());
                    }
                    break;
                }
                event = self.input.recv() => {
                    let Some(event) = event else {
                        debug!("Spooler input closed");
                        if !spool.is_empty() {
                            self.flush(&mut spool).await;
                        }
                        break;
                    };
                    spool.push(event);
                    let overdue = Instant::now() >= next_flush;
                    if spool.len() >= self.spool_size || overdue {
                        if overdue {
                            debug!("Idle flush time already passed, flushing on arrival");
                        }
                        if !self.flush(&mut spool).await {
                            break;
                        }
                        next_flush = Instant::now() + self.idle_flush_time;
                    }
                }
                () = sleep_until(next_flush), if !spool.is_empty() => {
                    debug!("Idle flush time reached with {} events spooled", spool.len());
                    if !self.flush(&mut spool).await {
                        break;
                    }
                    next_flush = Instant::now() + self.idle_flush_time;
                }
            }
        }

        debug!("Spooler stopped");
    }

    /// Hands the spooled events downstream, blocking while the queue is full.
    /// Returns false when nothing more can be delivered.
    async fn flush(&mut self, spool: &mut Vec<FileEvent>) -> bool {
        let events = std::mem::replace(spool, Vec::with_capacity(self.spool_size));
        let batch = Batch::new(self.next_sequence, events);
        self.next_sequence += 1;
        debug!(
            "Flushing batch {} with {} events",
            batch.sequence(),
            batch.len()
        );

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                warn!("Spooler cancelled while waiting for the publisher");
                false
            }
            result = self.output.send(batch) => match result {
                Ok(()) => true,
                Err(e) => {
                    error!("Publisher queue closed, dropping {} events", e.0.len());
                    false
                }
            },
        }
    }
}
