// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory transport for unit tests.
//!
//! Every socket opened from a [`ScriptedContext`] shares one script: a set of
//! endpoints that refuse connections plus queues of outcomes for upcoming
//! `send` and `recv` calls. All calls are recorded in order so tests can
//! assert on reconnects and on the exact bytes offered to the wire.

#![allow(clippy::unwrap_used)]

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::endpoint::Endpoint;
use crate::errors::TransportError;
use crate::transport::{SocketKind, Transport, TransportContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Open,
    Connect(String),
    Send { frame: Bytes, more: bool },
    Recv,
    Close,
}

#[derive(Debug, Clone)]
pub(crate) enum SendStep {
    Accept,
    Fail,
    Hang,
}

#[derive(Debug, Clone)]
pub(crate) enum RecvStep {
    Reply(&'static [u8]),
    Fail,
    Hang,
}

#[derive(Default)]
struct Script {
    refused: HashSet<String>,
    sockets_unavailable: bool,
    send_steps: VecDeque<SendStep>,
    recv_steps: VecDeque<RecvStep>,
    ops: Vec<Op>,
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedContext {
    script: Arc<Mutex<Script>>,
}

impl ScriptedContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn refuse(&self, endpoint: &str) {
        self.script
            .lock()
            .unwrap()
            .refused
            .insert(endpoint.to_string());
    }

    /// Makes every later attempt to open a socket fail.
    pub(crate) fn exhaust_sockets(&self) {
        self.script.lock().unwrap().sockets_unavailable = true;
    }

    pub(crate) fn push_send(&self, step: SendStep) {
        self.script.lock().unwrap().send_steps.push_back(step);
    }

    pub(crate) fn push_recv(&self, step: RecvStep) {
        self.script.lock().unwrap().recv_steps.push_back(step);
    }

    pub(crate) fn ops(&self) -> Vec<Op> {
        self.script.lock().unwrap().ops.clone()
    }

    pub(crate) fn connects(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Connect(endpoint) => Some(endpoint),
                _ => None,
            })
            .collect()
    }

    /// Every frame offered to a socket, including attempts that failed.
    pub(crate) fn sent_frames(&self) -> Vec<(Bytes, bool)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Send { frame, more } => Some((frame, more)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, wanted: &Op) -> usize {
        self.ops().iter().filter(|op| *op == wanted).count()
    }

    fn record(&self, op: Op) {
        self.script.lock().unwrap().ops.push(op);
    }
}

impl TransportContext for ScriptedContext {
    type Transport = ScriptedTransport;

    fn socket(&self, _kind: SocketKind) -> Result<ScriptedTransport, TransportError> {
        self.record(Op::Open);
        if self.script.lock().unwrap().sockets_unavailable {
            return Err(io::Error::new(io::ErrorKind::Other, "too many open files").into());
        }
        Ok(ScriptedTransport {
            context: self.clone(),
        })
    }
}

pub(crate) struct ScriptedTransport {
    context: ScriptedContext,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let refused = {
            let mut script = self.context.script.lock().unwrap();
            script.ops.push(Op::Connect(endpoint.to_string()));
            script.refused.contains(endpoint.as_str())
        };
        if refused {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        Ok(())
    }

    async fn send(&mut self, frame: Bytes, more: bool) -> Result<(), TransportError> {
        let step = {
            let mut script = self.context.script.lock().unwrap();
            script.ops.push(Op::Send { frame, more });
            script.send_steps.pop_front().unwrap_or(SendStep::Accept)
        };
        match step {
            SendStep::Accept => Ok(()),
            SendStep::Fail => Err(io::Error::from(io::ErrorKind::BrokenPipe).into()),
            SendStep::Hang => std::future::pending().await,
        }
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let step = {
            let mut script = self.context.script.lock().unwrap();
            script.ops.push(Op::Recv);
            script
                .recv_steps
                .pop_front()
                .unwrap_or(RecvStep::Reply(b"ack"))
        };
        match step {
            RecvStep::Reply(data) => Ok(Bytes::from_static(data)),
            RecvStep::Fail => Err(io::Error::from(io::ErrorKind::ConnectionReset).into()),
            RecvStep::Hang => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.context.record(Op::Close);
    }
}
