// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// One observed log line plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    /// Identifier of the file or stream the line was read from.
    pub source: String,
    /// Byte offset just past this line, used to resume reading.
    pub offset: u64,
    pub line: u64,
    /// Milliseconds since the Unix epoch when the line was read.
    pub timestamp: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl FileEvent {
    #[must_use]
    pub fn new(source: impl Into<String>, offset: u64, line: u64, text: impl Into<String>) -> Self {
        let timestamp = UNIX_EPOCH
            .elapsed()
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Self {
            source: source.into(),
            offset,
            line,
            timestamp,
            text: text.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Events flushed together, in the order they were produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    sequence: u64,
    events: Vec<FileEvent>,
}

impl Batch {
    #[must_use]
    pub fn new(sequence: u64, events: Vec<FileEvent>) -> Self {
        Self { sequence, events }
    }

    /// Position of this batch in the spooler's output, starting at 0.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn events(&self) -> &[FileEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let mut event = FileEvent::new("/var/log/syslog", 120, 3, "hello");
        event.timestamp = 1_700_000_000_000;

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "source": "/var/log/syslog",
                "offset": 120,
                "line": 3,
                "timestamp": 1_700_000_000_000_i64,
                "text": "hello",
            })
        );
    }

    #[test]
    fn test_fields_are_serialized_when_present() {
        let event = FileEvent::new("app", 0, 1, "x").with_field("host", "web-1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["fields"]["host"], "web-1");
    }

    #[test]
    fn test_new_event_is_timestamped() {
        let event = FileEvent::new("app", 0, 1, "x");
        assert!(event.timestamp > 0);
    }
}
