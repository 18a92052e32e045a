// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Port assumed when a server is given as a bare `host`.
pub const DEFAULT_PORT: u16 = 5005;

/// Send/receive readiness timeout used when none is configured.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(1);

/// Fixed pause between two connect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// zlib level applied to every batch payload.
pub const COMPRESSION_LEVEL: u32 = 3;

/// Maximum number of events to spool before a flush is forced.
pub const DEFAULT_SPOOL_SIZE: usize = 1024;

/// Maximum time to wait for a full spool before flushing anyway.
pub const DEFAULT_IDLE_FLUSH_TIME: Duration = Duration::from_secs(5);

/// Maximum time to wait on a server before giving up and trying another.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(30);

// Queue capacities between pipeline stages. The batch queue holds a single
// batch so a slow publisher throttles the spooler instead of buffering.
pub const EVENT_QUEUE_CAPACITY: usize = 16;
pub const BATCH_QUEUE_CAPACITY: usize = 1;
pub const REGISTRAR_QUEUE_CAPACITY: usize = 1;
