// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch payload encoding: a JSON array of events, zlib-compressed.
//!
//! Each batch gets its own compression stream, so any payload can be
//! decompressed without having seen the ones before it.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::constants::COMPRESSION_LEVEL;
use crate::errors::PayloadError;
use crate::event::FileEvent;

/// Serializes `events` into a JSON array.
pub fn serialize(events: &[FileEvent]) -> Result<Vec<u8>, PayloadError> {
    serde_json::to_vec(events).map_err(PayloadError::Serialize)
}

/// Compresses `data` with a fresh zlib stream at level 3.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, PayloadError> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(data.len() / 2),
        Compression::new(COMPRESSION_LEVEL),
    );
    encoder.write_all(data).map_err(PayloadError::Compress)?;
    encoder.finish().map_err(PayloadError::Compress)
}

/// Serializes and compresses a batch of events.
pub fn encode(events: &[FileEvent]) -> Result<Vec<u8>, PayloadError> {
    compress(&serialize(events)?)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, PayloadError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(PayloadError::Decompress)?;
    Ok(out)
}

/// Inverse of [`encode`], as a collector would run it.
pub fn decode(data: &[u8]) -> Result<Vec<FileEvent>, PayloadError> {
    serde_json::from_slice(&decompress(data)?).map_err(PayloadError::Deserialize)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn events(n: u64) -> Vec<FileEvent> {
        (0..n)
            .map(|i| FileEvent::new("/var/log/app.log", i * 10, i, format!("line number {i}")))
            .collect()
    }

    #[test]
    fn test_decompress_restores_exact_json() {
        let events = events(25);
        let json = serialize(&events).unwrap();
        let compressed = compress(&json).unwrap();

        assert_ne!(compressed, json);
        assert_eq!(decompress(&compressed).unwrap(), json);
        assert_eq!(decode(&compressed).unwrap(), events);
    }

    #[test]
    fn test_payloads_decompress_independently() {
        let first = encode(&events(3)).unwrap();
        let second = encode(&events(7)).unwrap();

        // The second payload must not depend on state left by the first.
        assert_eq!(decode(&second).unwrap().len(), 7);
        assert_eq!(decode(&first).unwrap().len(), 3);
    }

    #[test]
    fn test_zlib_header() {
        let compressed = encode(&events(1)).unwrap();
        // CMF byte for deflate with a 32K window.
        assert_eq!(compressed[0], 0x78);
    }

    #[test]
    fn test_empty_batch_is_an_empty_array() {
        assert_eq!(serialize(&[]).unwrap(), b"[]");
    }

    #[test]
    fn test_corrupt_payload_is_an_error() {
        assert!(matches!(
            decode(b"definitely not zlib"),
            Err(PayloadError::Decompress(_))
        ));

        let not_json = compress(b"{not json").unwrap();
        assert!(matches!(
            decode(&not_json),
            Err(PayloadError::Deserialize(_))
        ));
    }
}
