// SensorBridge Testdata - Frame generator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Deterministic frame generation.
//!
//! A [`FrameGenerator`] cycles through its nodes round-robin, sampling each
//! node's signal patterns on a shared timeline and encoding the result as a
//! 14-byte frame. The same seed always produces the same byte stream.

use crate::faults::FaultConfig;
use crate::patterns::{gaussian, SignalPattern};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sensorbridge::protocol::{HUMIDITY_RANGE, TEMPERATURE_RANGE, VOLTAGE_RANGE};
use sensorbridge::Frame;
use serde::{Deserialize, Serialize};

/// Default spacing between samples of one node.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;

/// Behavior of one simulated sensor node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProfile {
    /// Node identifier carried in the frame.
    pub node_id: u32,
    /// Temperature in degrees C.
    pub temperature: SignalPattern,
    /// Relative humidity in percent.
    pub humidity: SignalPattern,
    /// Barometric pressure in hPa (only served by BME280-style devices).
    pub pressure: SignalPattern,
    /// Supply voltage in volts.
    pub voltage: SignalPattern,
    /// Standard deviation of noise added to temperature and humidity.
    pub noise_std: f64,
    /// Scheduled faults.
    #[serde(default)]
    pub faults: Vec<FaultConfig>,
}

impl NodeProfile {
    /// A quiet node: 22 C, 45 %, 1013.25 hPa, 3.3 V.
    pub fn new(node_id: u32) -> Self {
        Self {
            node_id,
            temperature: SignalPattern::Constant { value: 22.0 },
            humidity: SignalPattern::Constant { value: 45.0 },
            pressure: SignalPattern::Constant { value: 1013.25 },
            voltage: SignalPattern::Constant { value: 3.3 },
            noise_std: 0.0,
            faults: Vec::new(),
        }
    }

    /// Indoor node with a daily temperature cycle and light noise.
    pub fn indoor(node_id: u32) -> Self {
        Self::new(node_id)
            .with_temperature(SignalPattern::indoor_temperature(19.0, 25.0))
            .with_humidity(SignalPattern::Sine {
                amplitude: 8.0,
                period_ms: 86_400_000,
                phase: 0.0,
                offset: 50.0,
            })
            .with_noise(0.1)
    }

    /// Node whose temperature rises `per_sample` degrees every sample.
    pub fn heating(node_id: u32, start: f64, per_sample: f64) -> Self {
        Self::new(node_id).with_temperature(SignalPattern::heating(
            start,
            per_sample,
            DEFAULT_SAMPLE_INTERVAL_MS,
        ))
    }

    pub fn with_temperature(mut self, pattern: SignalPattern) -> Self {
        self.temperature = pattern;
        self
    }

    pub fn with_humidity(mut self, pattern: SignalPattern) -> Self {
        self.humidity = pattern;
        self
    }

    pub fn with_pressure(mut self, pattern: SignalPattern) -> Self {
        self.pressure = pattern;
        self
    }

    pub fn with_voltage(mut self, pattern: SignalPattern) -> Self {
        self.voltage = pattern;
        self
    }

    pub fn with_noise(mut self, std: f64) -> Self {
        self.noise_std = std;
        self
    }

    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.faults.push(fault);
        self
    }
}

/// Physical values sampled from a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub supply_voltage: f64,
}

impl Sample {
    pub fn to_frame(&self, node_id: u32) -> Frame {
        Frame::new(node_id, self.temperature, self.humidity, self.supply_voltage)
    }
}

/// One generated frame and the bytes that carry it.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    /// Frame after value faults.
    pub frame: Frame,
    /// Encoded bytes after wire faults.
    pub wire: Vec<u8>,
    /// The frame's bytes were damaged and must not decode.
    pub corrupted: bool,
}

/// Generation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Frames generated.
    pub frames: u64,
    /// Frames whose bytes were damaged.
    pub corrupted: u64,
    /// Intact frames that fail range validation.
    pub out_of_range: u64,
    /// Bytes emitted, including garbage.
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeState {
    pub(crate) profile: NodeProfile,
    emitted: usize,
}

impl NodeState {
    pub(crate) fn new(profile: NodeProfile) -> Self {
        Self {
            profile,
            emitted: 0,
        }
    }

    /// Sample every quantity at `elapsed_ms`, clamped to the plausible ranges.
    pub(crate) fn sample(&self, elapsed_ms: u64, rng: &mut StdRng) -> Sample {
        let profile = &self.profile;
        let temperature =
            profile.temperature.evaluate(elapsed_ms) + gaussian(profile.noise_std, rng);
        let humidity = profile.humidity.evaluate(elapsed_ms) + gaussian(profile.noise_std, rng);
        let pressure = profile.pressure.evaluate(elapsed_ms);
        let voltage = profile.voltage.evaluate(elapsed_ms);

        Sample {
            temperature: temperature.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1),
            humidity: humidity.clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1),
            pressure,
            supply_voltage: voltage.clamp(VOLTAGE_RANGE.0, VOLTAGE_RANGE.1),
        }
    }
}

/// Seeded round-robin frame source.
#[derive(Debug, Clone)]
pub struct FrameGenerator {
    nodes: Vec<NodeState>,
    rng: StdRng,
    sample_interval_ms: u64,
    elapsed_ms: u64,
    next_node: usize,
    stats: GeneratorStats,
}

impl FrameGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            elapsed_ms: 0,
            next_node: 0,
            stats: GeneratorStats::default(),
        }
    }

    pub fn with_node(mut self, profile: NodeProfile) -> Self {
        self.add_node(profile);
        self
    }

    pub fn with_sample_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sample_interval_ms = interval_ms;
        self
    }

    pub fn add_node(&mut self, profile: NodeProfile) {
        self.nodes.push(NodeState::new(profile));
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Position on the simulated timeline.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn stats(&self) -> GeneratorStats {
        self.stats
    }

    /// Next frame in round-robin order; `None` without nodes.
    ///
    /// The timeline advances by one sample interval after every full round.
    pub fn next_emission(&mut self) -> Option<Emission> {
        if self.nodes.is_empty() {
            return None;
        }
        let elapsed_ms = self.elapsed_ms;
        let node = &mut self.nodes[self.next_node];
        let frame_idx = node.emitted;
        node.emitted += 1;

        let sample = node.sample(elapsed_ms, &mut self.rng);
        let mut frame = sample.to_frame(node.profile.node_id);
        let active: Vec<_> = node
            .profile
            .faults
            .iter()
            .filter(|f| f.is_active(frame_idx))
            .map(|f| f.fault.clone())
            .collect();
        for fault in &active {
            frame = fault.apply_to_frame(frame);
        }

        let mut wire = frame.to_bytes().to_vec();
        let mut corrupted = false;
        for fault in &active {
            corrupted |= fault.apply_to_wire(&mut wire, &mut self.rng);
        }

        self.next_node += 1;
        if self.next_node == self.nodes.len() {
            self.next_node = 0;
            self.elapsed_ms += self.sample_interval_ms;
        }

        self.stats.frames += 1;
        self.stats.bytes += wire.len() as u64;
        if corrupted {
            self.stats.corrupted += 1;
        } else if !frame.is_valid() {
            self.stats.out_of_range += 1;
        }

        Some(Emission {
            frame,
            wire,
            corrupted,
        })
    }

    /// Next frame with its faults applied, ignoring damage to its bytes.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.next_emission().map(|e| e.frame)
    }

    /// `count` emissions in order.
    pub fn emissions(&mut self, count: usize) -> Vec<Emission> {
        (0..count).map_while(|_| self.next_emission()).collect()
    }

    /// Byte stream carrying `count` frames.
    pub fn stream(&mut self, count: usize) -> Vec<u8> {
        self.emissions(count)
            .into_iter()
            .flat_map(|e| e.wire)
            .collect()
    }

    /// Random source shared with devices built on this generator.
    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
