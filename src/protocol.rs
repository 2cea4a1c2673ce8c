// SensorBridge - Gateway sensor ingestion
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Wire format and reading types
//!
//! Every sensor node on a byte-stream or SPI link emits fixed 14-byte frames.
//! All multi-byte fields are big-endian.
//!
//! ```text
//! offset  size  field
//!      0     2  sync (0xAA 0xBB)
//!      2     4  node_id        u32
//!      6     2  temperature    i16, hundredths of a degree C
//!      8     2  humidity       u16, hundredths of a percent
//!     10     2  supply voltage u16, millivolts
//!     12     1  status bits
//!     13     1  XOR of bytes 2..=12
//! ```

use crate::error::{DecodeError, ValidationError};
use std::fmt;

/// Size of a wire frame in bytes
pub const FRAME_LEN: usize = 14;

/// Frame sync bytes
pub const SYNC: [u8; 2] = [0xAA, 0xBB];

/// Plausible temperature range in degrees C
pub const TEMPERATURE_RANGE: (f64, f64) = (-50.0, 100.0);

/// Plausible relative humidity range in percent
pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);

/// Plausible supply voltage range in volts
pub const VOLTAGE_RANGE: (f64, f64) = (2.0, 5.0);

/// Status bit field carried in byte 12
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusFlags(u8);

impl StatusFlags {
    /// Sensing element reported a fault
    pub const SENSOR_FAULT: u8 = 0x01;
    /// Node reported a communication fault
    pub const COMM_FAULT: u8 = 0x02;
    /// Node reported low supply
    pub const LOW_VOLTAGE: u8 = 0x04;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub fn sensor_fault(&self) -> bool {
        self.0 & Self::SENSOR_FAULT != 0
    }

    pub fn comm_fault(&self) -> bool {
        self.0 & Self::COMM_FAULT != 0
    }

    pub fn low_voltage(&self) -> bool {
        self.0 & Self::LOW_VOLTAGE != 0
    }
}

/// A decoded 14-byte frame, values kept in their raw wire units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Node identifier
    pub node_id: u32,
    /// Temperature in hundredths of a degree
    pub temperature_raw: i16,
    /// Humidity in hundredths of a percent
    pub humidity_raw: u16,
    /// Supply voltage in millivolts
    pub voltage_raw: u16,
    /// Status bits
    pub status: StatusFlags,
}

impl Frame {
    /// Build a frame from physical values, rounding to wire resolution
    pub fn new(node_id: u32, temperature: f64, humidity: f64, voltage: f64) -> Self {
        Self {
            node_id,
            temperature_raw: (temperature * 100.0).round() as i16,
            humidity_raw: (humidity * 100.0).round() as u16,
            voltage_raw: (voltage * 1000.0).round() as u16,
            status: StatusFlags::default(),
        }
    }

    /// Set the status bits
    pub fn with_status(mut self, bits: u8) -> Self {
        self.status = StatusFlags::from_bits(bits);
        self
    }

    /// Temperature in degrees C
    pub fn temperature(&self) -> f64 {
        f64::from(self.temperature_raw) / 100.0
    }

    /// Relative humidity in percent
    pub fn humidity(&self) -> f64 {
        f64::from(self.humidity_raw) / 100.0
    }

    /// Supply voltage in volts
    pub fn supply_voltage(&self) -> f64 {
        f64::from(self.voltage_raw) / 1000.0
    }

    /// Serialize to wire bytes, computing the checksum
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[0..2].copy_from_slice(&SYNC);
        out[2..6].copy_from_slice(&self.node_id.to_be_bytes());
        out[6..8].copy_from_slice(&self.temperature_raw.to_be_bytes());
        out[8..10].copy_from_slice(&self.humidity_raw.to_be_bytes());
        out[10..12].copy_from_slice(&self.voltage_raw.to_be_bytes());
        out[12] = self.status.bits();
        out[13] = xor_checksum(&out[2..13]);
        out
    }

    /// Check every physical value against its plausible range
    pub fn check_ranges(&self) -> Result<(), ValidationError> {
        check_range("temperature", self.temperature(), TEMPERATURE_RANGE)?;
        check_range("humidity", self.humidity(), HUMIDITY_RANGE)?;
        check_range("supply_voltage", self.supply_voltage(), VOLTAGE_RANGE)?;
        Ok(())
    }

    /// Whether all values are plausible
    pub fn is_valid(&self) -> bool {
        self.check_ranges().is_ok()
    }
}

fn check_range(field: &'static str, value: f64, range: (f64, f64)) -> Result<(), ValidationError> {
    let (min, max) = range;
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// XOR of every byte in `bytes`
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Decode exactly one frame
///
/// Checks length, sync bytes and checksum, in that order. Range checks are
/// separate: a checksum-valid frame with implausible values still decodes.
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.len() != FRAME_LEN {
        return Err(DecodeError::InvalidLength {
            expected: FRAME_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[0..2] != SYNC {
        return Err(DecodeError::MissingSync(bytes[0], bytes[1]));
    }

    let expected = xor_checksum(&bytes[2..13]);
    if expected != bytes[13] {
        return Err(DecodeError::ChecksumMismatch {
            expected,
            actual: bytes[13],
        });
    }

    Ok(Frame {
        node_id: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
        temperature_raw: i16::from_be_bytes([bytes[6], bytes[7]]),
        humidity_raw: u16::from_be_bytes([bytes[8], bytes[9]]),
        voltage_raw: u16::from_be_bytes([bytes[10], bytes[11]]),
        status: StatusFlags::from_bits(bytes[12]),
    })
}

/// Range-check a decoded frame
pub fn validate(frame: &Frame) -> bool {
    frame.is_valid()
}

/// Sensor identifier derived from a node id: `prefix` + `node_id % 10000`
pub fn sensor_identity(prefix: &str, node_id: u32) -> String {
    format!("{}{}", prefix, node_id % 10000)
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Physical link a reading arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    Uart,
    Spi,
    I2c,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Uart => "UART",
            Interface::Spi => "SPI",
            Interface::I2c => "I2C",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized sensor measurement, whatever link it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Gateway-wide sensor identifier
    pub sensor_id: String,
    /// Human-readable location
    pub location: String,
    /// Degrees C
    pub temperature: f64,
    /// Percent RH
    pub humidity: f64,
    /// hPa, 0.0 when the sensor has no barometer
    pub pressure: f64,
    /// Volts
    pub supply_voltage: f64,
    /// Status bits
    pub status: StatusFlags,
    /// Link the reading arrived on
    pub interface: Interface,
    /// 0.0-1.0, 1.0 for wired links
    pub signal_strength: f64,
    /// 0.0-1.0
    pub data_confidence: f64,
    /// Milliseconds since the Unix epoch, stamped at ingestion
    pub timestamp_ms: u64,
    /// Whether the values passed range validation
    pub is_valid: bool,
}

impl Reading {
    /// Build a reading from explicit values, stamped now and range-checked
    pub fn new(
        sensor_id: impl Into<String>,
        interface: Interface,
        temperature: f64,
        humidity: f64,
        supply_voltage: f64,
    ) -> Self {
        let mut reading = Self {
            sensor_id: sensor_id.into(),
            location: "Unknown".to_string(),
            temperature,
            humidity,
            pressure: 0.0,
            supply_voltage,
            status: StatusFlags::default(),
            interface,
            signal_strength: 1.0,
            data_confidence: 1.0,
            timestamp_ms: now_ms(),
            is_valid: false,
        };
        reading.revalidate();
        reading
    }

    /// Build a reading from a decoded frame
    pub fn from_frame(
        frame: &Frame,
        interface: Interface,
        sensor_id: String,
        location: &str,
        data_confidence: f64,
    ) -> Self {
        Self {
            sensor_id,
            location: location.to_string(),
            temperature: frame.temperature(),
            humidity: frame.humidity(),
            pressure: 0.0,
            supply_voltage: frame.supply_voltage(),
            status: frame.status,
            interface,
            signal_strength: 1.0,
            data_confidence,
            timestamp_ms: now_ms(),
            is_valid: frame.is_valid(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = pressure;
        self
    }

    pub fn with_status(mut self, bits: u8) -> Self {
        self.status = StatusFlags::from_bits(bits);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.data_confidence = confidence;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Recompute `is_valid` from the current values
    pub fn revalidate(&mut self) {
        self.is_valid = check_range("temperature", self.temperature, TEMPERATURE_RANGE)
            .and_then(|_| check_range("humidity", self.humidity, HUMIDITY_RANGE))
            .and_then(|_| check_range("supply_voltage", self.supply_voltage, VOLTAGE_RANGE))
            .is_ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spec_example_bytes() -> [u8; FRAME_LEN] {
        // node 1, 23.45 C, 56.78 %, 3.300 V, status 0
        let mut b = [
            0xAA, 0xBB, 0x00, 0x00, 0x00, 0x01, 0x09, 0x29, 0x16, 0x2E, 0x0C, 0xE4, 0x00, 0x00,
        ];
        b[13] = xor_checksum(&b[2..13]);
        b
    }

    #[test]
    fn test_decode_known_frame() {
        let frame = decode(&spec_example_bytes()).unwrap();
        assert_eq!(frame.node_id, 1);
        assert_relative_eq!(frame.temperature(), 23.45, epsilon = 1e-9);
        assert_relative_eq!(frame.humidity(), 56.78, epsilon = 1e-9);
        assert_relative_eq!(frame.supply_voltage(), 3.3, epsilon = 1e-9);
        assert_eq!(frame.status.bits(), 0);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_encode_matches_wire_layout() {
        let frame = Frame::new(1, 23.45, 56.78, 3.3);
        assert_eq!(frame.to_bytes(), spec_example_bytes());
    }

    #[test]
    fn test_negative_temperature() {
        let frame = Frame::new(7, -12.5, 40.0, 3.0);
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[6..8], &(-1250i16).to_be_bytes());
        let decoded = decode(&bytes).unwrap();
        assert_relative_eq!(decoded.temperature(), -12.5, epsilon = 1e-9);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = spec_example_bytes();
        bytes[13] ^= 0xFF;
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_payload_corruption_detected() {
        let mut bytes = spec_example_bytes();
        bytes[7] ^= 0x01;
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_missing_sync() {
        let mut bytes = spec_example_bytes();
        bytes[1] = 0xBC;
        assert_eq!(decode(&bytes), Err(DecodeError::MissingSync(0xAA, 0xBC)));
    }

    #[test]
    fn test_invalid_length() {
        let bytes = spec_example_bytes();
        assert_eq!(
            decode(&bytes[..13]),
            Err(DecodeError::InvalidLength {
                expected: 14,
                actual: 13
            })
        );
    }

    #[test]
    fn test_range_boundaries_inclusive() {
        assert!(Frame::new(1, -50.0, 0.0, 2.0).is_valid());
        assert!(Frame::new(1, 100.0, 100.0, 5.0).is_valid());
        assert!(!Frame::new(1, 100.01, 50.0, 3.3).is_valid());
        assert!(!Frame::new(1, 20.0, 100.01, 3.3).is_valid());
        assert!(!Frame::new(1, 20.0, 50.0, 1.999).is_valid());
        assert!(!Frame::new(1, 20.0, 50.0, 5.001).is_valid());
    }

    #[test]
    fn test_check_ranges_reports_field() {
        let err = Frame::new(1, 20.0, 50.0, 6.0).check_ranges().unwrap_err();
        match err {
            ValidationError::OutOfRange { field, .. } => assert_eq!(field, "supply_voltage"),
        }
    }

    #[test]
    fn test_status_flags() {
        let flags = StatusFlags::from_bits(0x03);
        assert!(flags.sensor_fault());
        assert!(flags.comm_fault());
        assert!(!flags.low_voltage());
    }

    #[test]
    fn test_sensor_identity_wraps() {
        assert_eq!(sensor_identity("sensor_", 1), "sensor_1");
        assert_eq!(sensor_identity("sensor_", 123_456), "sensor_3456");
        assert_eq!(sensor_identity("spi_sensor_", 10_000), "spi_sensor_0");
    }

    #[test]
    fn test_reading_from_frame() {
        let frame = Frame::new(42, 21.0, 45.0, 3.3).with_status(StatusFlags::COMM_FAULT);
        let reading = Reading::from_frame(
            &frame,
            Interface::Uart,
            sensor_identity("sensor_", frame.node_id),
            "Unknown",
            0.95,
        );
        assert_eq!(reading.sensor_id, "sensor_42");
        assert_eq!(reading.interface, Interface::Uart);
        assert!(reading.status.comm_fault());
        assert_relative_eq!(reading.pressure, 0.0);
        assert_relative_eq!(reading.signal_strength, 1.0);
        assert!(reading.is_valid);
        assert!(reading.timestamp_ms > 0);
    }

    #[test]
    fn test_reading_new_validates() {
        assert!(Reading::new("s", Interface::Spi, 20.0, 50.0, 3.3).is_valid);
        assert!(!Reading::new("s", Interface::Spi, 150.0, 50.0, 3.3).is_valid);
    }

    #[test]
    fn test_interface_names() {
        assert_eq!(Interface::Uart.to_string(), "UART");
        assert_eq!(Interface::Spi.as_str(), "SPI");
        assert_eq!(Interface::I2c.as_str(), "I2C");
    }
}
