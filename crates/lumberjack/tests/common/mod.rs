// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A minimal collector: a ZeroMQ REP socket that opens, decodes and
//! acknowledges every batch it receives.

#![allow(dead_code)]

use bytes::Bytes;
use lumberjack::{payload, BoxSession, FileEvent, KeyMaterial};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zeromq::{RepSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

pub struct Collector {
    /// Address the collector listens on, e.g. `tcp://127.0.0.1:40123`.
    pub endpoint: String,
    /// Decoded batches, in the order they were acknowledged.
    pub batches: mpsc::UnboundedReceiver<Vec<FileEvent>>,
    /// Key material the forwarder must use to reach this collector.
    pub forwarder_keys: KeyMaterial,
    task: JoinHandle<()>,
}

impl Collector {
    pub async fn start() -> Self {
        let (collector_secret, collector_public) = KeyMaterial::generate_keypair();
        let (forwarder_secret, forwarder_public) = KeyMaterial::generate_keypair();
        let session = BoxSession::new(&KeyMaterial::new(forwarder_public, collector_secret));

        let mut socket = RepSocket::new();
        let endpoint = socket
            .bind("tcp://127.0.0.1:0")
            .await
            .expect("failed to bind collector socket")
            .to_string();

        let (tx, batches) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Ok(message) = socket.recv().await {
                let frames = message.into_vec();
                assert_eq!(frames.len(), 2, "expected nonce and ciphertext frames");
                let compressed = session
                    .open(&frames[0], &frames[1])
                    .expect("failed to open batch");
                let events = payload::decode(&compressed).expect("failed to decode batch");
                if tx.send(events).is_err() {
                    break;
                }
                if socket
                    .send(ZmqMessage::from(Bytes::from_static(b"ack")))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            endpoint,
            batches,
            forwarder_keys: KeyMaterial::new(collector_public, forwarder_secret),
            task,
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A local address nothing listens on, so connections to it are refused.
pub fn refused_endpoint() -> String {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind throwaway listener");
    let port = listener
        .local_addr()
        .expect("failed to read throwaway address")
        .port();
    drop(listener);
    format!("tcp://127.0.0.1:{port}")
}
