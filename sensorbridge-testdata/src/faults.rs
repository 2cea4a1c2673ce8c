// SensorBridge Testdata - Fault injection
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fault injection for exercising the decoder and the pipeline.
//!
//! Value faults change what a node measures before the frame is encoded;
//! wire faults damage the encoded bytes on their way to the gateway.

use rand::prelude::*;
use sensorbridge::{Frame, FRAME_LEN, SYNC};
use serde::{Deserialize, Serialize};

/// Fault injection schedule for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Fault to inject.
    pub fault: Fault,
    /// Frame index (per node) when the fault starts.
    pub start_frame: usize,
    /// Duration in frames (None = until end).
    pub duration_frames: Option<usize>,
}

impl FaultConfig {
    pub fn new(fault: Fault, start_frame: usize) -> Self {
        Self {
            fault,
            start_frame,
            duration_frames: None,
        }
    }

    pub fn with_duration(mut self, frames: usize) -> Self {
        self.duration_frames = Some(frames);
        self
    }

    /// Check if the fault applies to the frame at `frame_idx`.
    pub fn is_active(&self, frame_idx: usize) -> bool {
        if frame_idx < self.start_frame {
            return false;
        }
        match self.duration_frames {
            Some(duration) => frame_idx < self.start_frame + duration,
            None => true,
        }
    }
}

/// Type of fault to inject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fault {
    /// Checksum byte damaged; the decoder must drop the frame.
    CorruptChecksum,

    /// Random bytes (never 0xAA) sent ahead of the frame.
    LeadingGarbage { len: usize },

    /// A lone 0xAA not followed by 0xBB sent ahead of the frame.
    SpuriousSync,

    /// Node reports a temperature outside the plausible range.
    OutOfRangeTemperature { celsius: f64 },

    /// Node sets status bits (sensor fault, comm fault, low voltage).
    StatusBits { bits: u8 },

    /// Checksum damaged with probability `failure_prob` per frame.
    Intermittent { failure_prob: f64 },
}

impl Fault {
    /// Whether the fault changes the measured values rather than the bytes.
    pub fn is_value_fault(&self) -> bool {
        matches!(
            self,
            Fault::OutOfRangeTemperature { .. } | Fault::StatusBits { .. }
        )
    }

    /// Apply a value fault to a frame; wire faults leave it unchanged.
    pub fn apply_to_frame(&self, frame: Frame) -> Frame {
        match self {
            Fault::OutOfRangeTemperature { celsius } => Frame {
                temperature_raw: (celsius * 100.0).round() as i16,
                ..frame
            },
            Fault::StatusBits { bits } => {
                let merged = frame.status.bits() | bits;
                frame.with_status(merged)
            }
            _ => frame,
        }
    }

    /// Apply a wire fault to encoded bytes.
    ///
    /// Returns true when the frame itself was damaged.
    pub fn apply_to_wire(&self, wire: &mut Vec<u8>, rng: &mut (impl Rng + ?Sized)) -> bool {
        match self {
            Fault::CorruptChecksum => {
                corrupt_checksum(wire, rng);
                true
            }
            Fault::Intermittent { failure_prob } => {
                if rng.gen::<f64>() < *failure_prob {
                    corrupt_checksum(wire, rng);
                    true
                } else {
                    false
                }
            }
            Fault::LeadingGarbage { len } => {
                let mut prefix = garbage(*len, rng);
                prefix.append(wire);
                *wire = prefix;
                false
            }
            Fault::SpuriousSync => {
                let mut prefix = spurious_sync(rng).to_vec();
                prefix.append(wire);
                *wire = prefix;
                false
            }
            Fault::OutOfRangeTemperature { .. } | Fault::StatusBits { .. } => false,
        }
    }
}

/// Flip bits in the checksum byte (the last byte of the frame in `wire`).
fn corrupt_checksum(wire: &mut [u8], rng: &mut (impl Rng + ?Sized)) {
    if wire.len() >= FRAME_LEN {
        let idx = wire.len() - 1;
        wire[idx] ^= rng.gen_range(1..=u8::MAX);
    }
}

/// Random bytes that can never be mistaken for a sync marker.
pub fn garbage(len: usize, rng: &mut (impl Rng + ?Sized)) -> Vec<u8> {
    (0..len).map(|_| rng.gen_range(0x00..SYNC[0])).collect()
}

/// 0xAA followed by a byte that is neither 0xBB nor 0xAA.
pub fn spurious_sync(rng: &mut (impl Rng + ?Sized)) -> [u8; 2] {
    let follower = loop {
        let candidate: u8 = rng.gen();
        if candidate != SYNC[0] && candidate != SYNC[1] {
            break candidate;
        }
    };
    [SYNC[0], follower]
}

/// Split a stream into chunks of 1..=`max_chunk` bytes.
pub fn split_chunks(bytes: &[u8], max_chunk: usize, rng: &mut (impl Rng + ?Sized)) -> Vec<Vec<u8>> {
    let max_chunk = max_chunk.max(1);
    let mut chunks = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let take = rng.gen_range(1..=max_chunk).min(rest.len());
        let (head, tail) = rest.split_at(take);
        chunks.push(head.to_vec());
        rest = tail;
    }
    chunks
}
