// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::constants::{
    DEFAULT_IDLE_FLUSH_TIME, DEFAULT_SERVER_TIMEOUT, DEFAULT_SPOOL_SIZE, RECONNECT_DELAY,
};
use crate::crypto::{KeyMaterial, KEY_BYTES};
use crate::endpoint::{parse_servers, Endpoint, EndpointSet};
use crate::errors::ConfigError;
use crate::faithful::{FaithfulConfig, ReconnectStrategy};
use crate::spooler::SpoolerConfig;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the forwarder
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Collector endpoints, already normalized
    pub servers: Vec<Endpoint>,
    /// Maximum events per batch
    pub spool_size: usize,
    /// Flush a partial batch after this long without one
    pub idle_flush_time: Duration,
    /// Send, receive and connect timeout
    pub server_timeout: Duration,
    /// Delay after a failed connect attempt
    pub reconnect_delay: Duration,
    /// When set, the reconnect delay doubles up to this bound
    pub reconnect_max_delay: Option<Duration>,
    /// Collector public key
    pub their_public_key: Option<Vec<u8>>,
    /// Our secret key; generated at startup when absent
    pub my_secret_key: Option<Vec<u8>>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            spool_size: DEFAULT_SPOOL_SIZE,
            idle_flush_time: DEFAULT_IDLE_FLUSH_TIME,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            reconnect_delay: RECONNECT_DELAY,
            reconnect_max_delay: None,
            their_public_key: None,
            my_secret_key: None,
            log_level: "info".to_string(),
        }
    }
}

impl ForwarderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let servers = match lookup("LUMBERJACK_SERVERS") {
            Some(servers) => parse_servers(&servers)?,
            None => Vec::new(),
        };
        let spool_size =
            parse_number(&lookup, "LUMBERJACK_SPOOL_SIZE")?.unwrap_or(defaults.spool_size);
        let idle_flush_time = parse_millis(&lookup, "LUMBERJACK_IDLE_FLUSH_TIME_MS")?
            .unwrap_or(defaults.idle_flush_time);
        let server_timeout = parse_millis(&lookup, "LUMBERJACK_SERVER_TIMEOUT_MS")?
            .unwrap_or(defaults.server_timeout);
        let reconnect_delay = parse_millis(&lookup, "LUMBERJACK_RECONNECT_DELAY_MS")?
            .unwrap_or(defaults.reconnect_delay);
        let reconnect_max_delay = parse_millis(&lookup, "LUMBERJACK_RECONNECT_MAX_DELAY_MS")?;
        let their_public_key = decode_key(&lookup, "LUMBERJACK_THEIR_PUBLIC_KEY")?;
        let my_secret_key = decode_key(&lookup, "LUMBERJACK_MY_SECRET_KEY")?;
        let log_level = lookup("LUMBERJACK_LOG_LEVEL")
            .map(|val| val.trim().to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            servers,
            spool_size,
            idle_flush_time,
            server_timeout,
            reconnect_delay,
            reconnect_max_delay,
            their_public_key,
            my_secret_key,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        if self.spool_size == 0 {
            return Err(ConfigError::Invalid(
                "spool size must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("idle flush time", self.idle_flush_time),
            ("server timeout", self.server_timeout),
            ("reconnect delay", self.reconnect_delay),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if let Some(max) = self.reconnect_max_delay {
            if max < self.reconnect_delay {
                return Err(ConfigError::Invalid(
                    "maximum reconnect delay is shorter than the reconnect delay".to_string(),
                ));
            }
        }

        match &self.their_public_key {
            None => {
                return Err(ConfigError::InvalidKey(
                    "LUMBERJACK_THEIR_PUBLIC_KEY is required".to_string(),
                ))
            }
            Some(key) => check_key_length(key, "public key")?,
        }
        if let Some(key) = &self.my_secret_key {
            check_key_length(key, "secret key")?;
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn reconnect_strategy(&self) -> ReconnectStrategy {
        match self.reconnect_max_delay {
            Some(max) => ReconnectStrategy::Backoff {
                initial: self.reconnect_delay,
                max,
            },
            None => ReconnectStrategy::Fixed(self.reconnect_delay),
        }
    }

    pub fn faithful_config(&self) -> Result<FaithfulConfig, ConfigError> {
        let mut config = FaithfulConfig::request_reply(EndpointSet::new(self.servers.clone())?);
        config.send_timeout = Some(self.server_timeout);
        config.recv_timeout = Some(self.server_timeout);
        config.connect_timeout = Some(self.server_timeout);
        config.reconnect = self.reconnect_strategy();
        Ok(config)
    }

    #[must_use]
    pub fn spooler_config(&self) -> SpoolerConfig {
        SpoolerConfig {
            spool_size: self.spool_size,
            idle_flush_time: self.idle_flush_time,
        }
    }

    /// Loads the key pair, generating our secret key when none is configured.
    pub fn key_material(&self) -> Result<KeyMaterial, ConfigError> {
        let their_public = self.their_public_key.as_deref().ok_or_else(|| {
            ConfigError::InvalidKey("LUMBERJACK_THEIR_PUBLIC_KEY is required".to_string())
        })?;
        KeyMaterial::from_slices(their_public, self.my_secret_key.as_deref())
    }
}

fn parse_number<F>(lookup: &F, name: &str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|val| {
            val.trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))
        })
        .transpose()
}

fn parse_millis<F>(lookup: &F, name: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|val| {
            val.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))
        })
        .transpose()
}

fn decode_key<F>(lookup: &F, name: &str) -> Result<Option<Vec<u8>>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|val| !val.trim().is_empty())
        .map(|val| {
            STANDARD
                .decode(val.trim())
                .map_err(|e| ConfigError::InvalidKey(format!("{name} is not valid base64: {e}")))
        })
        .transpose()
}

fn check_key_length(key: &[u8], what: &str) -> Result<(), ConfigError> {
    if key.len() != KEY_BYTES {
        return Err(ConfigError::InvalidKey(format!(
            "{what} must be {KEY_BYTES} bytes, got {}",
            key.len()
        )));
    }
    Ok(())
}
