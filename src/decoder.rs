// SensorBridge - Gateway sensor ingestion
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Stream decoder
//!
//! Reassembles 14-byte frames from an arbitrarily chunked byte stream and
//! resynchronizes on the `0xAA 0xBB` sync pair after garbage or corruption.

use crate::error::DecodeError;
use crate::protocol::{decode, Frame, FRAME_LEN, SYNC};
use log::debug;

/// Counters kept by a [`StreamDecoder`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames that passed the checksum
    pub frames_decoded: u64,
    /// Sync-aligned windows dropped for a bad checksum
    pub checksum_failures: u64,
    /// Bytes skipped while hunting for sync
    pub bytes_discarded: u64,
}

/// Incremental frame reassembler for byte-stream links
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    stats: DecoderStats,
}

impl StreamDecoder {
    /// Create a decoder with an empty buffer
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
            stats: DecoderStats::default(),
        }
    }

    /// Append bytes and return every complete checksum-valid frame
    ///
    /// Frames are returned in stream order. The result does not depend on
    /// how the stream is split across calls.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while self.buffer.len() >= FRAME_LEN {
            let Some(start) = self.buffer.iter().position(|&b| b == SYNC[0]) else {
                let dropped = self.buffer.len();
                self.discard(dropped);
                break;
            };

            // A lone 0xAA at the tail may be the start of the next frame
            if start + 1 == self.buffer.len() {
                self.discard(start);
                break;
            }

            if self.buffer[start + 1] != SYNC[1] {
                self.discard(start + 1);
                continue;
            }

            if self.buffer.len() - start < FRAME_LEN {
                self.discard(start);
                break;
            }

            self.discard(start);
            let window: Vec<u8> = self.buffer.drain(..FRAME_LEN).collect();
            match decode(&window) {
                Ok(frame) => {
                    self.stats.frames_decoded += 1;
                    frames.push(frame);
                }
                Err(DecodeError::ChecksumMismatch { expected, actual }) => {
                    self.stats.checksum_failures += 1;
                    debug!(
                        "Dropping frame with bad checksum (expected {:02x}, got {:02x})",
                        expected, actual
                    );
                }
                Err(e) => debug!("Dropping undecodable window: {}", e),
            }
        }

        frames
    }

    /// Bytes buffered but not yet consumed
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Current counters
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop buffered bytes and zero the counters
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.stats = DecoderStats::default();
    }

    fn discard(&mut self, count: usize) {
        if count > 0 {
            self.buffer.drain(..count);
            self.stats.bytes_discarded += count as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn frame_bytes(node: u32, temp: f64) -> [u8; FRAME_LEN] {
        Frame::new(node, temp, 50.0, 3.3).to_bytes()
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = StreamDecoder::new();
        let frames = decoder.feed(&frame_bytes(1, 22.0));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].node_id, 1);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let bytes = frame_bytes(9, 18.5);
        for split in 1..FRAME_LEN {
            let mut decoder = StreamDecoder::new();
            assert!(decoder.feed(&bytes[..split]).is_empty());
            let frames = decoder.feed(&bytes[split..]);
            assert_eq!(frames.len(), 1, "split at {}", split);
            assert_eq!(frames[0].node_id, 9);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut stream = Vec::new();
        for node in 1..=3 {
            stream.extend_from_slice(&frame_bytes(node, 20.0 + node as f64));
        }

        let mut decoder = StreamDecoder::new();
        let mut nodes = Vec::new();
        for b in &stream {
            nodes.extend(decoder.feed(&[*b]).iter().map(|f| f.node_id));
        }
        assert_eq!(nodes, vec![1, 2, 3]);
    }

    #[test]
    fn test_resync_after_garbage_and_false_sync() {
        let mut stream = vec![0x01, 0x02, 0x03, 0xAA, 0x10];
        stream.extend_from_slice(&frame_bytes(5, 21.0));

        let mut decoder = StreamDecoder::new();
        let frames = decoder.feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].node_id, 5);
        assert_eq!(decoder.stats().bytes_discarded, 5);
    }

    #[test]
    fn test_bad_checksum_dropped_then_next_frame_decodes() {
        let mut bad = frame_bytes(1, 20.0);
        bad[13] ^= 0x55;
        let mut stream = bad.to_vec();
        stream.extend_from_slice(&frame_bytes(2, 21.0));

        let mut decoder = StreamDecoder::new();
        let frames = decoder.feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].node_id, 2);
        assert_eq!(decoder.stats().checksum_failures, 1);
    }

    #[test]
    fn test_trailing_sync_byte_kept() {
        let mut decoder = StreamDecoder::new();
        let mut garbage = vec![0x11; 13];
        garbage.push(0xAA);
        assert!(decoder.feed(&garbage).is_empty());
        assert_eq!(decoder.pending(), 1);

        let bytes = frame_bytes(3, 19.0);
        let frames = decoder.feed(&bytes[1..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].node_id, 3);
    }

    #[test]
    fn test_garbage_without_sync_cleared() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(&[0x00; 32]).is_empty());
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.stats().bytes_discarded, 32);
    }

    #[test]
    fn test_random_chunking_is_order_preserving() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut stream = Vec::new();
        for node in 0..50u32 {
            stream.extend_from_slice(&frame_bytes(node, 15.0 + (node % 20) as f64));
        }

        let mut decoder = StreamDecoder::new();
        let mut nodes = Vec::new();
        let mut pos = 0;
        while pos < stream.len() {
            let len = rng.gen_range(1..=40).min(stream.len() - pos);
            nodes.extend(decoder.feed(&stream[pos..pos + len]).iter().map(|f| f.node_id));
            pos += len;
        }

        assert_eq!(nodes, (0..50).collect::<Vec<_>>());
        assert_eq!(decoder.stats().frames_decoded, 50);
    }

    #[test]
    fn test_reset() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&frame_bytes(1, 20.0)[..6]);
        decoder.reset();
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.stats(), DecoderStats::default());
    }
}
