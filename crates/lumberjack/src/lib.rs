// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reliable delivery of log event batches to a set of collectors.
//!
//! Events are grouped into batches by the [`spooler`], and each batch is
//! encoded, compressed and sealed once by the [`publisher`] before being
//! sent over a [`faithful`] connection that survives collector failures by
//! reconnecting to a randomly chosen endpoint. Acknowledged batches end up in
//! the [`registrar`]. The [`forwarder`] module wires these stages together.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod crypto;
pub mod endpoint;
pub mod errors;
pub mod event;
pub mod faithful;
pub mod forwarder;
pub mod logger;
pub mod payload;
pub mod publisher;
pub mod registrar;
pub mod spooler;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::ForwarderConfig;
pub use crypto::{BoxSession, KeyMaterial};
pub use endpoint::{Endpoint, EndpointSet};
pub use errors::{
    ConfigError, ConnectionError, CryptoError, ForwarderError, PayloadError, PublishError,
    TransportError,
};
pub use event::{Batch, FileEvent};
pub use faithful::{FaithfulConfig, FaithfulConnection, ReconnectStrategy};
pub use forwarder::{Forwarder, ForwarderHandle, RunningForwarder, ServiceStatus};
pub use transport::{SocketKind, Transport, TransportContext, ZmqContext, ZmqTransport};
