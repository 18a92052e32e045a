// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bookkeeping for acknowledged events.
//!
//! The registrar sees every delivered batch and keeps, per source, how far
//! delivery has progressed. Snapshots are published on a watch channel so a
//! producer can resume reading where delivery left off. Nothing is persisted.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::Batch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcePosition {
    /// Highest acknowledged offset.
    pub offset: u64,
    /// Line number of the event at `offset`.
    pub line: u64,
    /// Acknowledged events from this source so far.
    pub events: u64,
}

/// Acknowledged positions keyed by event source.
pub type Positions = BTreeMap<String, SourcePosition>;

pub struct Registrar {
    input: mpsc::Receiver<Batch>,
    positions: watch::Sender<Positions>,
    cancel: CancellationToken,
}

impl Registrar {
    #[must_use]
    pub fn new(
        input: mpsc::Receiver<Batch>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<Positions>) {
        let (positions, receiver) = watch::channel(Positions::new());
        (
            Self {
                input,
                positions,
                cancel,
            },
            receiver,
        )
    }

    pub async fn run(mut self) {
        loop {
            let batch = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                batch = self.input.recv() => batch,
            };
            let Some(batch) = batch else {
                break;
            };
            self.record(&batch);
        }
        debug!("Registrar stopped");
    }

    fn record(&self, batch: &Batch) {
        self.positions.send_modify(|positions| {
            for event in batch.events() {
                let position = positions.entry(event.source.clone()).or_default();
                if event.offset >= position.offset {
                    position.offset = event.offset;
                    position.line = event.line;
                }
                position.events += 1;
            }
        });
        debug!(
            "Registered batch {} ({} events)",
            batch.sequence(),
            batch.len()
        );
    }
}
