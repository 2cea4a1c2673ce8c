//! # SensorBridge - Gateway sensor ingestion
//!
//! Frame codec and transport readers for gateways that collect telemetry from
//! sensor nodes over UART, SPI and I2C.
//!
//! ## Key Features
//!
//! - **Fixed 14-byte frames**: sync, node id, temperature, humidity, voltage,
//!   status bits and an XOR checksum
//! - **Stream reassembly**: resynchronizes on garbage, false sync bytes and
//!   corrupted frames
//! - **Uniform readers**: one acquisition thread per link, one callback
//!
//! ## Quick Start
//!
//! ```rust
//! use sensorbridge::{decode, Frame, StreamDecoder};
//!
//! let bytes = Frame::new(1, 23.45, 56.78, 3.3).to_bytes();
//! let frame = decode(&bytes).unwrap();
//! assert!((frame.temperature() - 23.45).abs() < 1e-9);
//!
//! // Reassembly does not care how the stream is chunked
//! let mut decoder = StreamDecoder::new();
//! assert!(decoder.feed(&bytes[..5]).is_empty());
//! assert_eq!(decoder.feed(&bytes[5..]).len(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Wire format, frames and readings
//! - [`decoder`]: Stream reassembly
//! - [`device`]: Hardware handle traits, tty serial port and in-memory devices
//! - `hardware`: Raspberry Pi SPI and I2C buses (feature `hardware`)
//! - [`transport`]: UART, SPI and I2C readers
//! - [`error`]: Error types

// Modules
pub mod decoder;
pub mod device;
pub mod error;
#[cfg(feature = "hardware")]
pub mod hardware;
pub mod protocol;
pub mod transport;

// Re-exports for convenient access
pub use decoder::{DecoderStats, StreamDecoder};
pub use device::{
    parse_spidev_path, I2cBus, MemoryI2cBus, MemorySerialPort, MemorySpiBus, SerialPort, SpiBus,
    TtySerialPort, DEFAULT_SERIAL_TIMEOUT,
};
#[cfg(feature = "hardware")]
pub use hardware::{RppalI2cBus, RppalSpiBus};
pub use error::{BridgeError, DecodeError, Result, TransportError, ValidationError};
pub use protocol::{
    decode, now_ms, sensor_identity, validate, xor_checksum, Frame, Interface, Reading,
    StatusFlags, FRAME_LEN, SYNC,
};
pub use transport::{
    DeviceProfile, FrameCallback, I2cReader, I2cSettings, ReaderStats, SpiReader, SpiSettings,
    TransportReader, UartReader, UartSettings,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
