// SensorBridge - Gateway sensor ingestion
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Hardware handle abstraction
//!
//! Transport readers talk to hardware only through these traits, so the
//! acquisition loops run unchanged against real device nodes, in-memory
//! doubles, or the simulated devices in `sensorbridge-testdata`.

use crate::error::TransportError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

/// A byte-stream link (UART)
pub trait SerialPort: Send {
    /// Open and configure the device
    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Bounded-wait read; returns `Ok(0)` when nothing arrived
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Device description for logs
    fn describe(&self) -> String;
}

/// A full-duplex SPI bus
pub trait SpiBus: Send {
    /// Open and configure the bus
    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Clock `tx` out while filling `rx`; both have the same length
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError>;

    /// Device description for logs
    fn describe(&self) -> String;
}

/// An I2C bus with register-image devices
pub trait I2cBus: Send {
    /// Open the bus
    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Read `buf.len()` bytes from the device at `address`
    ///
    /// Returns the number of bytes read.
    fn read_device(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Bus number
    fn bus_number(&self) -> u8;
}

#[derive(Debug, Default)]
struct SerialState {
    rx: VecDeque<u8>,
    open_error: Option<String>,
    read_error: Option<String>,
    opened: bool,
}

/// In-memory serial port
///
/// Clones share the same receive buffer, so a test can keep one handle and
/// push bytes after moving another into a reader.
#[derive(Debug, Clone, Default)]
pub struct MemorySerialPort {
    state: Arc<Mutex<SerialState>>,
}

impl MemorySerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the reader
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// Bytes queued but not yet read
    pub fn pending(&self) -> usize {
        self.state.lock().rx.len()
    }

    /// Make the next `open` fail
    pub fn fail_open(&self, reason: &str) {
        self.state.lock().open_error = Some(reason.to_string());
    }

    /// Make the next `read` fail once
    pub fn fail_next_read(&self, reason: &str) {
        self.state.lock().read_error = Some(reason.to_string());
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().opened
    }
}

impl SerialPort for MemorySerialPort {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.open_error.take() {
            return Err(TransportError::Open {
                device: "memory-serial".to_string(),
                reason,
            });
        }
        state.opened = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.read_error.take() {
            return Err(TransportError::Read {
                interface: "UART",
                reason,
            });
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn describe(&self) -> String {
        "memory-serial".to_string()
    }
}

#[derive(Debug, Default)]
struct SpiState {
    responses: VecDeque<Vec<u8>>,
    transfers: u64,
}

/// In-memory SPI bus answering queued responses, then all-zero buffers
#[derive(Debug, Clone, Default)]
pub struct MemorySpiBus {
    state: Arc<Mutex<SpiState>>,
}

impl MemorySpiBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes the next transfer will clock in
    pub fn push_response(&self, bytes: &[u8]) {
        self.state.lock().responses.push_back(bytes.to_vec());
    }

    /// Number of transfers performed so far
    pub fn transfers(&self) -> u64 {
        self.state.lock().transfers
    }
}

impl SpiBus for MemorySpiBus {
    fn transfer(&mut self, _tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.transfers += 1;
        rx.fill(0);
        if let Some(response) = state.responses.pop_front() {
            let n = rx.len().min(response.len());
            rx[..n].copy_from_slice(&response[..n]);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory-spi".to_string()
    }
}

/// In-memory I2C bus holding one register image per address
#[derive(Debug, Clone)]
pub struct MemoryI2cBus {
    bus: u8,
    devices: Arc<Mutex<HashMap<u8, Vec<u8>>>>,
}

impl MemoryI2cBus {
    pub fn new(bus: u8) -> Self {
        Self {
            bus,
            devices: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach (or replace) the register image of a device
    pub fn set_device(&self, address: u8, registers: &[u8]) {
        self.devices.lock().insert(address, registers.to_vec());
    }

    /// Detach a device
    pub fn remove_device(&self, address: u8) {
        self.devices.lock().remove(&address);
    }
}

impl I2cBus for MemoryI2cBus {
    fn read_device(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        let devices = self.devices.lock();
        let registers = devices
            .get(&address)
            .ok_or(TransportError::NoDevice { address })?;
        let n = buf.len().min(registers.len());
        buf[..n].copy_from_slice(&registers[..n]);
        Ok(n)
    }

    fn bus_number(&self) -> u8 {
        self.bus
    }
}

/// Read timeout of a [`TtySerialPort`] unless overridden
pub const DEFAULT_SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial port on a tty device node, e.g. `/dev/ttyAMA0`
///
/// Opened raw 8N1 without flow control at the configured baud rate. A read
/// that times out reports `Ok(0)`.
pub struct TtySerialPort {
    path: String,
    baud_rate: u32,
    read_timeout: Duration,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl TtySerialPort {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout: DEFAULT_SERIAL_TIMEOUT,
            port: None,
        }
    }

    /// Upper bound on how long a read waits for bytes
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Wrap a port that is already open
    pub fn from_port(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            path: port.name().unwrap_or_default(),
            baud_rate: port.baud_rate().unwrap_or_default(),
            read_timeout: port.timeout(),
            port: Some(port),
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl fmt::Debug for TtySerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtySerialPort")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("read_timeout", &self.read_timeout)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialPort for TtySerialPort {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(self.path.as_str(), self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| TransportError::Open {
                device: self.path.clone(),
                reason: e.to_string(),
            })?;
        self.port = Some(port);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let port = self
            .port
            .as_mut()
            .ok_or(TransportError::NotInitialized("UART"))?;
        match io::Read::read(port, buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(TransportError::Read {
                interface: "UART",
                reason: e.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.path, self.baud_rate)
    }
}

/// Bus and chip-select numbers of a spidev node, e.g. `/dev/spidev0.1`
pub fn parse_spidev_path(path: &str) -> Option<(u8, u8)> {
    let name = path.rsplit('/').next()?.strip_prefix("spidev")?;
    let (bus, chip_select) = name.split_once('.')?;
    Some((bus.parse().ok()?, chip_select.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_serial_shared_buffer() {
        let handle = MemorySerialPort::new();
        let mut port = handle.clone();
        handle.push_bytes(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 3];
        assert_eq!(port.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(handle.pending(), 2);
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(port.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_memory_serial_open_failure() {
        let handle = MemorySerialPort::new();
        handle.fail_open("permission denied");
        let mut port = handle.clone();
        assert!(matches!(port.open(), Err(TransportError::Open { .. })));
        assert!(port.open().is_ok());
        assert!(handle.is_open());
    }

    #[test]
    fn test_memory_spi_idle_is_zero() {
        let bus = MemorySpiBus::new();
        let mut dev = bus.clone();
        bus.push_response(&[0xAA, 0xBB, 1]);

        let mut rx = [0xFFu8; 4];
        dev.transfer(&[0; 4], &mut rx).unwrap();
        assert_eq!(rx, [0xAA, 0xBB, 1, 0]);
        dev.transfer(&[0; 4], &mut rx).unwrap();
        assert_eq!(rx, [0; 4]);
        assert_eq!(bus.transfers(), 2);
    }

    #[test]
    fn test_memory_i2c_unknown_address() {
        let bus = MemoryI2cBus::new(1);
        bus.set_device(0x76, &[1, 2, 3]);
        let mut dev = bus.clone();

        let mut buf = [0u8; 3];
        assert_eq!(dev.read_device(0x76, &mut buf).unwrap(), 3);
        assert_eq!(
            dev.read_device(0x50, &mut buf),
            Err(TransportError::NoDevice { address: 0x50 })
        );
        assert_eq!(dev.bus_number(), 1);
    }

    #[test]
    fn test_tty_serial_missing_device() {
        let mut port = TtySerialPort::new("/nonexistent/ttyFAKE0", 115_200);
        assert_eq!(port.read_timeout(), DEFAULT_SERIAL_TIMEOUT);
        assert!(matches!(port.open(), Err(TransportError::Open { .. })));
        let mut buf = [0u8; 4];
        assert_eq!(
            port.read(&mut buf),
            Err(TransportError::NotInitialized("UART"))
        );
    }

    #[test]
    fn test_parse_spidev_path() {
        assert_eq!(parse_spidev_path("/dev/spidev0.0"), Some((0, 0)));
        assert_eq!(parse_spidev_path("/dev/spidev1.2"), Some((1, 2)));
        assert_eq!(parse_spidev_path("spidev3.1"), Some((3, 1)));
        assert_eq!(parse_spidev_path("/dev/ttyAMA0"), None);
        assert_eq!(parse_spidev_path("/dev/spidev0"), None);
        assert_eq!(parse_spidev_path("/dev/spidevX.0"), None);
    }
}
