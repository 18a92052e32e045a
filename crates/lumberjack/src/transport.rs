// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The socket seam underneath [`crate::faithful::FaithfulConnection`].
//!
//! A [`TransportContext`] is the messaging context: it is built once by the
//! composition root and handed to every connection that needs sockets, rather
//! than living in a process-wide global. Each [`Transport`] is one physical
//! socket that can be connected to a single endpoint at a time.
//!
//! Implementations do not need their own timeouts. The faithful connection
//! bounds every `connect`, `send` and `recv` with its own deadline and drops
//! the socket on expiry.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::endpoint::Endpoint;
use crate::errors::TransportError;

/// Role of a socket in the messaging pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Request side of request/reply: every message expects one reply.
    Req,
}

/// One physical socket.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Queues one frame. With `more` set, further frames of the same message
    /// follow; the message goes out once its final frame is handed over.
    async fn send(&mut self, frame: Bytes, more: bool) -> Result<(), TransportError>;

    /// Waits for the next message and returns its first frame.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;

    /// Releases the socket, discarding anything in flight.
    async fn close(&mut self);
}

/// Factory for sockets, shared by reference between connections.
pub trait TransportContext: Send + Sync {
    type Transport: Transport + 'static;

    fn socket(&self, kind: SocketKind) -> Result<Self::Transport, TransportError>;
}

/// ZeroMQ context backed by the pure Rust `zeromq` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZmqContext;

impl ZmqContext {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TransportContext for ZmqContext {
    type Transport = ZmqTransport;

    fn socket(&self, kind: SocketKind) -> Result<ZmqTransport, TransportError> {
        match kind {
            SocketKind::Req => Ok(ZmqTransport {
                socket: Some(ReqSocket::new()),
                pending: None,
            }),
        }
    }
}

/// A ZeroMQ REQ socket. Frames sent with `more` are held until the final
/// frame so the whole message is handed to the socket at once.
pub struct ZmqTransport {
    socket: Option<ReqSocket>,
    pending: Option<ZmqMessage>,
}

impl ZmqTransport {
    fn socket(&mut self) -> Result<&mut ReqSocket, TransportError> {
        self.socket.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for ZmqTransport {
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        self.socket()?.connect(endpoint.as_str()).await?;
        Ok(())
    }

    async fn send(&mut self, frame: Bytes, more: bool) -> Result<(), TransportError> {
        let message = match self.pending.take() {
            Some(mut message) => {
                message.push_back(frame);
                message
            }
            None => ZmqMessage::from(frame),
        };

        if more {
            self.pending = Some(message);
            return Ok(());
        }

        self.socket()?.send(message).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let message = self.socket()?.recv().await?;
        message
            .into_vec()
            .into_iter()
            .next()
            .ok_or(TransportError::EmptyMessage)
    }

    async fn close(&mut self) {
        self.pending = None;
        if let Some(socket) = self.socket.take() {
            let errors = socket.close().await;
            if !errors.is_empty() {
                debug!("Socket closed with {} pending errors", errors.len());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_socket_reports_not_connected() {
        let mut transport = ZmqContext::new().socket(SocketKind::Req).unwrap();
        transport.close().await;

        let endpoint = Endpoint::parse("127.0.0.1:5005").unwrap();
        assert!(matches!(
            transport.connect(&endpoint).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.send(Bytes::from_static(b"x"), false).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_more_frames_are_held_until_final_frame() {
        let mut transport = ZmqContext::new().socket(SocketKind::Req).unwrap();
        transport
            .send(Bytes::from_static(b"nonce"), true)
            .await
            .unwrap();
        assert_eq!(transport.pending.as_ref().map(ZmqMessage::len), Some(1));
        transport.close().await;
        assert!(transport.pending.is_none());
    }
}
