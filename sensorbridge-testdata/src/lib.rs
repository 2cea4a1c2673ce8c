// SensorBridge Testdata - Deterministic test stimulus
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # SensorBridge Testdata
//!
//! Deterministic stimulus for the SensorBridge ecosystem:
//!
//! - **Signal patterns**: constant, sine, linear and diurnal
//! - **Frame generation**: seeded, round-robin over simulated nodes
//! - **Fault injection**: corrupted checksums, garbage, spurious sync bytes,
//!   out-of-range values, status bits
//! - **Simulated devices**: serial, SPI and I2C handles for the transport readers
//!
//! ## Quick Start
//!
//! ```rust
//! use sensorbridge::StreamDecoder;
//! use sensorbridge_testdata::{Fault, FaultConfig, FrameGenerator, NodeProfile};
//!
//! let mut generator = FrameGenerator::new(42)
//!     .with_node(NodeProfile::indoor(1))
//!     .with_node(
//!         NodeProfile::new(2).with_fault(FaultConfig::new(Fault::CorruptChecksum, 3).with_duration(1)),
//!     );
//!
//! let stream = generator.stream(10);
//! let frames = StreamDecoder::new().feed(&stream);
//! assert_eq!(frames.len(), 9);
//! ```

pub mod devices;
pub mod faults;
pub mod generator;
pub mod patterns;

// Re-exports for convenience
pub use devices::{
    bme280_image, sht30_image, SimulatedI2cBus, SimulatedSerialPort, SimulatedSpiBus,
    DEFAULT_MAX_CHUNK,
};
pub use faults::{garbage, split_chunks, spurious_sync, Fault, FaultConfig};
pub use generator::{
    Emission, FrameGenerator, GeneratorStats, NodeProfile, Sample, DEFAULT_SAMPLE_INTERVAL_MS,
};
pub use patterns::SignalPattern;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
