// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector addresses and random selection among them.
//!
//! Servers are configured as `host` or `host:port` and normalized into
//! ZeroMQ TCP URIs: `host` becomes `tcp://host:5005` and `host:port` becomes
//! `tcp://host:port`. Strings that already carry a scheme are kept as-is.
//!
//! On every reconnect the active endpoint is drawn uniformly at random from
//! the whole set using the operating system's CSPRNG, so load spreads evenly
//! across collectors and the choice cannot be predicted.

use std::fmt;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};

use crate::constants::DEFAULT_PORT;
use crate::errors::ConfigError;

/// A normalized collector URI such as `tcp://logs.example.com:5005`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    /// Parses a `host`, `host:port` or full URI into an endpoint.
    pub fn parse(server: &str) -> Result<Self, ConfigError> {
        let trimmed = server.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidEndpoint(server.to_string()));
        }

        if trimmed.contains("://") {
            return Ok(Self(trimmed.to_string()));
        }

        match trimmed.rsplit_once(':') {
            None => Ok(Self(format!("tcp://{trimmed}:{DEFAULT_PORT}"))),
            Some((host, port)) => {
                if host.is_empty() || port.parse::<u16>().is_err() {
                    tracing::error!("Invalid server '{}': expected 'host' or 'host:port'", trimmed);
                    return Err(ConfigError::InvalidEndpoint(server.to_string()));
                }
                Ok(Self(format!("tcp://{trimmed}")))
            }
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses a comma-separated server list.
pub fn parse_servers(servers: &str) -> Result<Vec<Endpoint>, ConfigError> {
    if servers.trim().is_empty() {
        return Err(ConfigError::NoEndpoints);
    }
    servers.split(',').map(Endpoint::parse).collect()
}

/// The immutable set of candidate collectors, shared read-only.
#[derive(Debug, Clone)]
pub struct EndpointSet {
    endpoints: Arc<[Endpoint]>,
}

impl EndpointSet {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        Ok(Self {
            endpoints: endpoints.into(),
        })
    }

    /// Picks an endpoint uniformly at random using the OS random source.
    #[must_use]
    pub fn choose(&self) -> &Endpoint {
        self.choose_with(&mut OsRng)
    }

    /// Picks an endpoint uniformly at random from `rng`.
    pub fn choose_with<R: RngCore + CryptoRng>(&self, rng: &mut R) -> &Endpoint {
        let index = rng.gen_range(0..self.endpoints.len());
        &self.endpoints[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
