// SensorBridge Testdata - Simulated devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Simulated hardware implementing the `sensorbridge` device traits.
//!
//! Every device is a cheap cloneable handle; clones share state, so a test
//! can keep one handle to inspect what a reader has consumed.

use crate::generator::{FrameGenerator, GeneratorStats, NodeProfile, NodeState, Sample};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sensorbridge::{DeviceProfile, I2cBus, SerialPort, SpiBus, TransportError, FRAME_LEN};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default largest chunk returned by one serial read.
pub const DEFAULT_MAX_CHUNK: usize = 7;

struct SerialSim {
    generator: FrameGenerator,
    pending: VecDeque<u8>,
    max_chunk: usize,
    frame_limit: Option<u64>,
    pacing: Option<Duration>,
    next_due: Option<Instant>,
}

impl SerialSim {
    fn limit_reached(&self) -> bool {
        self.frame_limit
            .map_or(false, |limit| self.generator.stats().frames >= limit)
    }

    fn frame_due(&mut self) -> bool {
        match self.pacing {
            None => true,
            Some(period) => {
                let now = Instant::now();
                match self.next_due {
                    Some(due) if now < due => false,
                    _ => {
                        self.next_due = Some(now + period);
                        true
                    }
                }
            }
        }
    }

    fn refill(&mut self) {
        while self.pending.len() < self.max_chunk && !self.limit_reached() && self.frame_due() {
            match self.generator.next_emission() {
                Some(emission) => self.pending.extend(emission.wire),
                None => break,
            }
        }
    }
}

/// Serial port streaming generated frames in random-sized chunks.
#[derive(Clone)]
pub struct SimulatedSerialPort {
    inner: Arc<Mutex<SerialSim>>,
}

impl SimulatedSerialPort {
    pub fn new(generator: FrameGenerator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SerialSim {
                generator,
                pending: VecDeque::new(),
                max_chunk: DEFAULT_MAX_CHUNK,
                frame_limit: None,
                pacing: None,
                next_due: None,
            })),
        }
    }

    /// Largest chunk a single read returns.
    pub fn with_max_chunk(self, max_chunk: usize) -> Self {
        self.inner.lock().max_chunk = max_chunk.max(1);
        self
    }

    /// Stop generating after `frames` frames.
    pub fn with_frame_limit(self, frames: u64) -> Self {
        self.inner.lock().frame_limit = Some(frames);
        self
    }

    /// Generate at most one frame per `period` of wall-clock time.
    pub fn paced(self, period: Duration) -> Self {
        self.inner.lock().pacing = Some(period);
        self
    }

    pub fn generator_stats(&self) -> GeneratorStats {
        self.inner.lock().generator.stats()
    }

    /// Every frame has been generated and read.
    pub fn is_exhausted(&self) -> bool {
        let sim = self.inner.lock();
        sim.pending.is_empty() && sim.limit_reached()
    }
}

impl SerialPort for SimulatedSerialPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut sim = self.inner.lock();
        sim.refill();
        if sim.pending.is_empty() || buf.is_empty() {
            return Ok(0);
        }
        let max_chunk = sim.max_chunk;
        let wanted = sim.generator.rng().gen_range(1..=max_chunk);
        let n = wanted.min(sim.pending.len()).min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(sim.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn describe(&self) -> String {
        "simulated-serial".to_string()
    }
}

struct SpiSim {
    generator: FrameGenerator,
    frame_limit: Option<u64>,
}

/// SPI bus answering each transfer with the next generated frame.
///
/// Leading garbage from wire faults is not clocked out; corrupted checksums
/// are. Once the frame limit is hit, transfers read all zeros.
#[derive(Clone)]
pub struct SimulatedSpiBus {
    inner: Arc<Mutex<SpiSim>>,
}

impl SimulatedSpiBus {
    pub fn new(generator: FrameGenerator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SpiSim {
                generator,
                frame_limit: None,
            })),
        }
    }

    pub fn with_frame_limit(self, frames: u64) -> Self {
        self.inner.lock().frame_limit = Some(frames);
        self
    }

    pub fn generator_stats(&self) -> GeneratorStats {
        self.inner.lock().generator.stats()
    }
}

impl SpiBus for SimulatedSpiBus {
    fn transfer(&mut self, _tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        let mut sim = self.inner.lock();
        rx.fill(0);
        let exhausted = sim
            .frame_limit
            .map_or(false, |limit| sim.generator.stats().frames >= limit);
        if exhausted {
            return Ok(());
        }
        if let Some(emission) = sim.generator.next_emission() {
            let frame = &emission.wire[emission.wire.len().saturating_sub(FRAME_LEN)..];
            let n = rx.len().min(frame.len());
            rx[..n].copy_from_slice(&frame[..n]);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "simulated-spi".to_string()
    }
}

struct I2cDevice {
    profile: DeviceProfile,
    node: NodeState,
    reads: u64,
}

struct I2cSim {
    devices: BTreeMap<u8, I2cDevice>,
    rng: StdRng,
    sample_interval_ms: u64,
}

/// I2C bus serving BME280- and SHT30-style register images.
#[derive(Clone)]
pub struct SimulatedI2cBus {
    bus: u8,
    inner: Arc<Mutex<I2cSim>>,
}

impl SimulatedI2cBus {
    pub fn new(bus: u8, seed: u64) -> Self {
        Self {
            bus,
            inner: Arc::new(Mutex::new(I2cSim {
                devices: BTreeMap::new(),
                rng: StdRng::seed_from_u64(seed),
                sample_interval_ms: crate::generator::DEFAULT_SAMPLE_INTERVAL_MS,
            })),
        }
    }

    /// Attach a device at `address`, sampling values from `node`.
    ///
    /// Returns false (and attaches nothing) for addresses without a known
    /// register layout.
    pub fn attach(&self, address: u8, node: NodeProfile) -> bool {
        let Some(profile) = DeviceProfile::for_address(address) else {
            return false;
        };
        self.inner.lock().devices.insert(
            address,
            I2cDevice {
                profile,
                node: NodeState::new(node),
                reads: 0,
            },
        );
        true
    }

    pub fn with_device(self, address: u8, node: NodeProfile) -> Self {
        self.attach(address, node);
        self
    }

    pub fn detach(&self, address: u8) {
        self.inner.lock().devices.remove(&address);
    }

    /// Number of register reads served by `address`.
    pub fn reads(&self, address: u8) -> u64 {
        self.inner
            .lock()
            .devices
            .get(&address)
            .map_or(0, |device| device.reads)
    }
}

impl I2cBus for SimulatedI2cBus {
    fn read_device(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut guard = self.inner.lock();
        let sim = &mut *guard;
        let device = sim
            .devices
            .get_mut(&address)
            .ok_or(TransportError::NoDevice { address })?;

        let elapsed_ms = device.reads * sim.sample_interval_ms;
        device.reads += 1;
        let sample = device.node.sample(elapsed_ms, &mut sim.rng);
        let image = match device.profile {
            DeviceProfile::Bme280 => bme280_image(&sample, 0).to_vec(),
            DeviceProfile::Sht30 => sht30_image(&sample).to_vec(),
        };

        let n = buf.len().min(image.len());
        buf[..n].copy_from_slice(&image[..n]);
        Ok(n)
    }

    fn bus_number(&self) -> u8 {
        self.bus
    }
}

/// BME280-style register image: `[temp u16][hum u16][press u24][status]`.
pub fn bme280_image(sample: &Sample, status: u8) -> [u8; 8] {
    let temp_raw = to_u16((sample.temperature - 20.0) * 100.0 + 32768.0);
    let hum_raw = to_u16(sample.humidity * 65535.0 / 100.0);
    let press_raw = ((sample.pressure - 1013.25) * 256.0 + 524_288.0)
        .round()
        .clamp(0.0, f64::from(0x00FF_FFFFu32)) as u32;

    let t = temp_raw.to_be_bytes();
    let h = hum_raw.to_be_bytes();
    let p = press_raw.to_be_bytes();
    [t[0], t[1], h[0], h[1], p[1], p[2], p[3], status]
}

/// SHT30-style register image: `[temp u16][crc][hum u16][crc]`.
pub fn sht30_image(sample: &Sample) -> [u8; 6] {
    let t = to_u16((sample.temperature + 45.0) * 65535.0 / 175.0).to_be_bytes();
    let h = to_u16(sample.humidity * 65535.0 / 100.0).to_be_bytes();
    [t[0], t[1], crc8(&t), h[0], h[1], crc8(&h)]
}

fn to_u16(value: f64) -> u16 {
    value.round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Sensirion CRC-8 (poly 0x31, init 0xFF).
fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0xFF, |crc, &byte| {
        (0..8).fold(crc ^ byte, |crc, _| {
            if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            }
        })
    })
}
