// SensorBridge - Gateway sensor ingestion
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! I2C reader: polls a list of device addresses once per cycle
//!
//! I2C devices do not speak the 14-byte frame format. Each known address maps
//! to a [`DeviceProfile`] describing its register layout, and readings are
//! built straight from the raw register bytes.

use super::{FrameCallback, LoopContext, ReaderCore, ReaderStats, TransportReader};
use crate::device::I2cBus;
use crate::error::TransportError;
use crate::protocol::{Interface, Reading};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Supply voltage reported for bus-powered I2C sensors
const I2C_SUPPLY_VOLTAGE: f64 = 3.3;

/// Register layout of a supported I2C sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Temperature, humidity and pressure at 0x76/0x77
    ///
    /// `[temp u16][hum u16][press u24][status u8]`
    Bme280,
    /// Temperature and humidity at 0x44/0x45
    ///
    /// `[temp u16][crc][hum u16][crc]`
    Sht30,
}

impl DeviceProfile {
    /// Profile for a bus address, `None` for unknown devices
    pub fn for_address(address: u8) -> Option<Self> {
        match address {
            0x76 | 0x77 => Some(DeviceProfile::Bme280),
            0x44 | 0x45 => Some(DeviceProfile::Sht30),
            _ => None,
        }
    }

    /// Number of register bytes read per poll
    pub fn read_len(&self) -> usize {
        match self {
            DeviceProfile::Bme280 => 8,
            DeviceProfile::Sht30 => 6,
        }
    }

    pub fn data_confidence(&self) -> f64 {
        match self {
            DeviceProfile::Bme280 => 0.95,
            DeviceProfile::Sht30 => 0.98,
        }
    }

    /// Build a reading from raw register bytes; `None` on a short read
    pub fn parse(&self, address: u8, bus: u8, raw: &[u8]) -> Option<Reading> {
        if raw.len() < self.read_len() {
            return None;
        }

        let (temperature, humidity, pressure, status) = match self {
            DeviceProfile::Bme280 => {
                let temp_raw = u16::from_be_bytes([raw[0], raw[1]]);
                let hum_raw = u16::from_be_bytes([raw[2], raw[3]]);
                let press_raw = u32::from_be_bytes([0, raw[4], raw[5], raw[6]]);
                (
                    20.0 + (f64::from(temp_raw) - 32768.0) / 100.0,
                    f64::from(hum_raw) * 100.0 / 65535.0,
                    1013.25 + (f64::from(press_raw) - 524_288.0) / 256.0,
                    raw[7],
                )
            }
            DeviceProfile::Sht30 => {
                let temp_raw = u16::from_be_bytes([raw[0], raw[1]]);
                let hum_raw = u16::from_be_bytes([raw[3], raw[4]]);
                (
                    -45.0 + 175.0 * f64::from(temp_raw) / 65535.0,
                    100.0 * f64::from(hum_raw) / 65535.0,
                    0.0,
                    0,
                )
            }
        };

        let reading = Reading::new(
            format!("i2c_{}", address),
            Interface::I2c,
            temperature,
            humidity,
            I2C_SUPPLY_VOLTAGE,
        )
        .with_location(format!("I2C_Bus_{}", bus))
        .with_pressure(pressure)
        .with_status(status)
        .with_confidence(self.data_confidence());
        Some(reading)
    }
}

/// I2C reader settings
#[derive(Debug, Clone)]
pub struct I2cSettings {
    /// Addresses polled each cycle
    pub addresses: Vec<u8>,
    /// Interval between cycles
    pub poll_interval: Duration,
}

impl Default for I2cSettings {
    fn default() -> Self {
        Self {
            addresses: vec![0x76, 0x77, 0x44, 0x45],
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Reader cycling through the devices on one I2C bus
pub struct I2cReader {
    bus: Arc<Mutex<Box<dyn I2cBus>>>,
    settings: I2cSettings,
    core: ReaderCore,
}

impl I2cReader {
    pub fn new(bus: impl I2cBus + 'static, addresses: Vec<u8>) -> Self {
        Self::with_settings(
            bus,
            I2cSettings {
                addresses,
                ..Default::default()
            },
        )
    }

    pub fn with_settings(bus: impl I2cBus + 'static, settings: I2cSettings) -> Self {
        Self {
            bus: Arc::new(Mutex::new(Box::new(bus))),
            settings,
            core: ReaderCore::new(Interface::I2c),
        }
    }
}

impl TransportReader for I2cReader {
    fn interface(&self) -> Interface {
        Interface::I2c
    }

    fn initialize(&mut self) -> Result<(), TransportError> {
        {
            let mut bus = self.bus.lock();
            bus.open()?;
            debug!("I2C bus {} opened", bus.bus_number());
        }
        for address in &self.settings.addresses {
            if DeviceProfile::for_address(*address).is_none() {
                warn!("No I2C profile for address 0x{:02x}, it will be skipped", address);
            }
        }
        self.core.mark_initialized();
        Ok(())
    }

    fn on_frame(&mut self, callback: FrameCallback) -> Result<(), TransportError> {
        self.core.set_callback(callback)
    }

    fn start(&mut self) -> Result<(), TransportError> {
        let bus = Arc::clone(&self.bus);
        let settings = self.settings.clone();
        self.core.spawn(move |ctx| run(ctx, bus, settings))
    }

    fn stop(&mut self) {
        self.core.stop();
    }

    fn is_active(&self) -> bool {
        self.core.is_active()
    }

    fn stats(&self) -> ReaderStats {
        self.core.stats()
    }
}

fn run(ctx: LoopContext, bus: Arc<Mutex<Box<dyn I2cBus>>>, settings: I2cSettings) {
    let devices: Vec<(u8, DeviceProfile)> = settings
        .addresses
        .iter()
        .filter_map(|&a| DeviceProfile::for_address(a).map(|p| (a, p)))
        .collect();

    while ctx.running() {
        for &(address, profile) in &devices {
            if !ctx.running() {
                break;
            }
            let mut raw = vec![0u8; profile.read_len()];
            let (result, bus_number) = {
                let mut bus = bus.lock();
                (bus.read_device(address, &mut raw), bus.bus_number())
            };
            match result {
                Ok(n) => {
                    ctx.counters.add_bytes(n);
                    match profile.parse(address, bus_number, &raw[..n]) {
                        Some(reading) => ctx.emit(reading),
                        None => debug!("Short read from I2C device 0x{:02x}", address),
                    }
                }
                Err(e) => {
                    ctx.counters.io_error();
                    debug!("I2C read at 0x{:02x} failed: {}", address, e);
                }
            }
        }
        ctx.pause(settings.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryI2cBus;
    use approx::assert_relative_eq;
    use std::sync::mpsc;

    #[test]
    fn test_profiles_by_address() {
        assert_eq!(DeviceProfile::for_address(0x76), Some(DeviceProfile::Bme280));
        assert_eq!(DeviceProfile::for_address(0x45), Some(DeviceProfile::Sht30));
        assert_eq!(DeviceProfile::for_address(0x48), None);
    }

    #[test]
    fn test_bme280_parse() {
        // temp 0x8000 -> 20.0 C, humidity 0x8000 -> ~50 %, pressure 0x080000 -> 1013.25
        let raw = [0x80, 0x00, 0x80, 0x00, 0x08, 0x00, 0x00, 0x00];
        let reading = DeviceProfile::Bme280.parse(0x76, 1, &raw).unwrap();
        assert_eq!(reading.sensor_id, "i2c_118");
        assert_eq!(reading.location, "I2C_Bus_1");
        assert_relative_eq!(reading.temperature, 20.0);
        assert_relative_eq!(reading.humidity, 32768.0 * 100.0 / 65535.0);
        assert_relative_eq!(reading.pressure, 1013.25);
        assert_relative_eq!(reading.supply_voltage, 3.3);
        assert_relative_eq!(reading.data_confidence, 0.95);
        assert!(reading.is_valid);
    }

    #[test]
    fn test_sht30_parse_ignores_crc() {
        let raw = [0x66, 0x00, 0xFF, 0x7F, 0x00, 0xFF];
        let reading = DeviceProfile::Sht30.parse(0x44, 1, &raw).unwrap();
        assert_eq!(reading.sensor_id, "i2c_68");
        assert_relative_eq!(reading.temperature, -45.0 + 175.0 * 26112.0 / 65535.0);
        assert_relative_eq!(reading.humidity, 100.0 * 32512.0 / 65535.0);
        assert_relative_eq!(reading.pressure, 0.0);
        assert_relative_eq!(reading.data_confidence, 0.98);
        assert_eq!(reading.status.bits(), 0);
    }

    #[test]
    fn test_short_read_yields_nothing() {
        assert!(DeviceProfile::Bme280.parse(0x77, 1, &[0x80, 0x00, 0x80]).is_none());
        assert!(DeviceProfile::Sht30.parse(0x45, 1, &[0; 5]).is_none());
    }

    #[test]
    fn test_reader_polls_known_devices() {
        let bus = MemoryI2cBus::new(1);
        bus.set_device(0x76, &[0x80, 0x00, 0x80, 0x00, 0x08, 0x00, 0x00, 0x00]);
        bus.set_device(0x44, &[0x66, 0x00, 0x00, 0x7F, 0x00, 0x00]);

        let mut reader = I2cReader::with_settings(
            bus,
            I2cSettings {
                addresses: vec![0x76, 0x48, 0x44, 0x77],
                poll_interval: Duration::from_millis(5),
            },
        );
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        reader
            .on_frame(Arc::new(move |r: Reading| {
                let _ = tx.lock().send(r.sensor_id);
            }))
            .unwrap();
        reader.initialize().unwrap();
        reader.start().unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        reader.stop();

        assert_eq!(first, "i2c_118");
        assert_eq!(second, "i2c_68");
        // 0x77 is a known profile but nothing answers there
        assert!(reader.stats().io_errors >= 1);
    }
}
