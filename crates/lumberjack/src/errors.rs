// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::endpoint::Endpoint;

/// Invalid or incomplete configuration, detected at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No servers specified")]
    NoEndpoints,

    #[error("Invalid server address '{0}'")]
    InvalidEndpoint(String),

    #[error("No socket type set on connection")]
    MissingSocketKind,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

/// Failures of a single physical socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket is not connected")]
    NotConnected,

    #[error("received an empty message")]
    EmptyMessage,

    #[error(transparent)]
    Zmq(#[from] zeromq::ZmqError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`crate::faithful::FaithfulConnection`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("{endpoint}: timed out after {timeout_ms} ms waiting to {operation}")]
    Timeout {
        endpoint: Endpoint,
        operation: &'static str,
        timeout_ms: u128,
    },

    #[error("{endpoint}: failed to {operation}: {source}")]
    Transport {
        endpoint: Endpoint,
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("failed to open socket: {0}")]
    Socket(#[source] TransportError),

    #[error("connection to {0} was lost in the middle of a multipart message")]
    Interrupted(Endpoint),

    #[error("connection cancelled")]
    Cancelled,
}

/// Errors while turning a batch into bytes or back.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("failed to serialize batch: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to deserialize batch: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("failed to compress batch: {0}")]
    Compress(#[source] std::io::Error),

    #[error("failed to decompress batch: {0}")]
    Decompress(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to seal message")]
    Seal,

    #[error("failed to open message: authentication failed")]
    Open,

    #[error("nonce must be {expected} bytes, got {actual}")]
    NonceLength { expected: usize, actual: usize },
}

/// Reasons the publisher stops before its input is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The connection cannot be used at all, as opposed to an endpoint
    /// being unreachable.
    #[error(transparent)]
    Connection(ConnectionError),

    #[error("publisher cancelled")]
    Cancelled,
}

/// Errors from running the whole forwarding pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Forwarder task failed: {0}")]
    Task(String),
}
