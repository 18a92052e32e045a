// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A self-healing request/reply connection over a rotating set of endpoints.
//!
//! The connection owns at most one live socket. Any failure on that socket,
//! whether an I/O error or an operation that does not complete within its
//! timeout, is handled the same way: the socket is dropped and the next
//! operation reconnects to an endpoint chosen at random from the whole set.
//! Socket-level timeouts are not relied upon; every operation is raced
//! against an application deadline instead.
//!
//! `send` keeps retrying until the transport accepts the frame, while
//! `receive` gives up after one timeout and lets the caller decide what to
//! do next. Both loops stop as soon as the cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::constants::{DEFAULT_SOCKET_TIMEOUT, RECONNECT_DELAY};
use crate::endpoint::{Endpoint, EndpointSet};
use crate::errors::{ConfigError, ConnectionError};
use crate::transport::{SocketKind, Transport, TransportContext};

/// Pause applied between failed connect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStrategy {
    /// Same delay after every failure.
    Fixed(Duration),
    /// Delay doubles after each consecutive failure, capped at `max`.
    Backoff { initial: Duration, max: Duration },
}

impl Default for ReconnectStrategy {
    fn default() -> Self {
        Self::Fixed(RECONNECT_DELAY)
    }
}

impl ReconnectStrategy {
    /// Delay after the `failures`-th consecutive failed attempt (1-based).
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Backoff { initial, max } => {
                let factor = 2u32.saturating_pow(failures.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaithfulConfig {
    pub endpoints: EndpointSet,
    pub socket_kind: Option<SocketKind>,
    /// Unset or zero falls back to one second.
    pub send_timeout: Option<Duration>,
    /// Unset or zero falls back to one second.
    pub recv_timeout: Option<Duration>,
    /// Bound on a single connect attempt. Defaults to the send timeout.
    pub connect_timeout: Option<Duration>,
    pub reconnect: ReconnectStrategy,
}

impl FaithfulConfig {
    /// Request/reply configuration with default timeouts.
    #[must_use]
    pub fn request_reply(endpoints: EndpointSet) -> Self {
        Self {
            endpoints,
            socket_kind: Some(SocketKind::Req),
            send_timeout: None,
            recv_timeout: None,
            connect_timeout: None,
            reconnect: ReconnectStrategy::default(),
        }
    }
}

fn or_default(timeout: Option<Duration>) -> Duration {
    timeout
        .filter(|t| !t.is_zero())
        .unwrap_or(DEFAULT_SOCKET_TIMEOUT)
}

/// The connected socket and where it points.
struct Session<T> {
    endpoint: Endpoint,
    transport: T,
    /// A frame was sent with the more flag and the message is not finished.
    in_message: bool,
}

pub struct FaithfulConnection<C: TransportContext> {
    context: Arc<C>,
    endpoints: EndpointSet,
    socket_kind: SocketKind,
    send_timeout: Duration,
    recv_timeout: Duration,
    connect_timeout: Duration,
    reconnect: ReconnectStrategy,
    cancel: CancellationToken,
    // `Some` exactly when a connect has succeeded since the last failure.
    session: Option<Session<C::Transport>>,
    sessions_opened: u64,
    connect_attempts: u64,
}

impl<C: TransportContext> FaithfulConnection<C> {
    /// Create a disconnected connection; nothing is dialed until first use.
    pub fn new(
        context: Arc<C>,
        config: FaithfulConfig,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let socket_kind = config.socket_kind.ok_or(ConfigError::MissingSocketKind)?;
        if config.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        let send_timeout = or_default(config.send_timeout);
        let recv_timeout = or_default(config.recv_timeout);
        let connect_timeout = config
            .connect_timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(send_timeout);

        Ok(Self {
            context,
            endpoints: config.endpoints,
            socket_kind,
            send_timeout,
            recv_timeout,
            connect_timeout,
            reconnect: config.reconnect,
            cancel,
            session: None,
            sessions_opened: 0,
            connect_attempts: 0,
        })
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Endpoint of the live session, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.session.as_ref().map(|session| &session.endpoint)
    }

    /// Number of successful connects so far.
    #[must_use]
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened
    }

    /// Number of connect attempts so far, successful or not.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    /// Connects to a random endpoint unless already connected.
    ///
    /// Retries forever, pausing per the reconnect strategy after each failed
    /// attempt; the same endpoint may be picked again. Only cancellation or a
    /// failure to open a socket at all ends the loop with an error.
    pub async fn ensure_connected(&mut self) -> Result<(), ConnectionError> {
        if self.session.is_some() {
            return Ok(());
        }

        let mut transport = self
            .context
            .socket(self.socket_kind)
            .map_err(ConnectionError::Socket)?;

        let mut failures: u32 = 0;
        loop {
            let endpoint = self.endpoints.choose().clone();
            info!("Connecting to {endpoint}");
            self.connect_attempts += 1;

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                result = timeout(self.connect_timeout, transport.connect(&endpoint)) => Some(result),
            };

            match outcome {
                None => {
                    transport.close().await;
                    return Err(ConnectionError::Cancelled);
                }
                Some(Ok(Ok(()))) => {
                    debug!("{endpoint}: connected after {failures} failed attempts");
                    self.session = Some(Session {
                        endpoint,
                        transport,
                        in_message: false,
                    });
                    self.sessions_opened += 1;
                    return Ok(());
                }
                Some(Ok(Err(e))) => warn!("{endpoint}: Error connecting: {e}"),
                Some(Err(_)) => warn!(
                    "{endpoint}: timed out connecting after {} ms",
                    self.connect_timeout.as_millis()
                ),
            }

            failures = failures.saturating_add(1);
            if !pause(&self.cancel, self.reconnect.delay(failures)).await {
                transport.close().await;
                return Err(ConnectionError::Cancelled);
            }
        }
    }

    /// Sends one frame, reconnecting and retrying until the transport takes it.
    ///
    /// If the session is lost after an earlier frame of the same message went
    /// out with `more`, the remaining frame cannot be delivered on its own; the
    /// session is dropped and [`ConnectionError::Interrupted`] tells the caller
    /// to start the message over.
    pub async fn send(&mut self, frame: Bytes, more: bool) -> Result<(), ConnectionError> {
        loop {
            self.ensure_connected().await?;
            let Some(session) = self.session.as_mut() else {
                continue;
            };

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                result = timeout(self.send_timeout, session.transport.send(frame.clone(), more)) => Some(result),
            };

            let failure = match outcome {
                None => return Err(ConnectionError::Cancelled),
                Some(Ok(Ok(()))) => {
                    trace!("{}: sent {} byte frame", session.endpoint, frame.len());
                    session.in_message = more;
                    return Ok(());
                }
                Some(Ok(Err(source))) => {
                    error!(
                        "{}: Failed to send {} byte message: {source}",
                        session.endpoint,
                        frame.len()
                    );
                    ConnectionError::Transport {
                        endpoint: session.endpoint.clone(),
                        operation: "send",
                        source,
                    }
                }
                Some(Err(_)) => {
                    warn!(
                        "{}: timed out waiting to send {} byte message",
                        session.endpoint,
                        frame.len()
                    );
                    ConnectionError::Timeout {
                        endpoint: session.endpoint.clone(),
                        operation: "send",
                        timeout_ms: self.send_timeout.as_millis(),
                    }
                }
            };

            let interrupted = session.in_message.then(|| session.endpoint.clone());
            self.fail().await;
            if let Some(endpoint) = interrupted {
                debug!("Abandoning partial message after {failure}");
                return Err(ConnectionError::Interrupted(endpoint));
            }
        }
    }

    /// Waits for one message and returns its first frame.
    ///
    /// Unlike [`send`](Self::send) this does not retry: on timeout or error the
    /// session is dropped and the error is returned to the caller.
    pub async fn receive(&mut self) -> Result<Bytes, ConnectionError> {
        self.ensure_connected().await?;
        let Some(session) = self.session.as_mut() else {
            return Err(ConnectionError::Cancelled);
        };

        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = timeout(self.recv_timeout, session.transport.recv()) => Some(result),
        };

        match outcome {
            None => Err(ConnectionError::Cancelled),
            Some(Ok(Ok(data))) => {
                trace!("{}: received {} byte reply", session.endpoint, data.len());
                session.in_message = false;
                Ok(data)
            }
            Some(Ok(Err(source))) => {
                let endpoint = session.endpoint.clone();
                error!("{endpoint}: Failed to receive message: {source}");
                self.fail().await;
                Err(ConnectionError::Transport {
                    endpoint,
                    operation: "receive",
                    source,
                })
            }
            Some(Err(_)) => {
                let endpoint = session.endpoint.clone();
                self.fail().await;
                let error = ConnectionError::Timeout {
                    endpoint,
                    operation: "receive",
                    timeout_ms: self.recv_timeout.as_millis(),
                };
                warn!("{error}");
                Err(error)
            }
        }
    }

    /// Releases the socket and marks the connection disconnected.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!("{}: closing connection", session.endpoint);
            session.transport.close().await;
        }
    }

    /// Drops the current session so the next operation reconnects.
    async fn fail(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.close().await;
    }
}

/// Sleeps for `delay`; returns false if cancelled first.
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = sleep(delay) => true,
        () = cancel.cancelled() => false,
    }
}
