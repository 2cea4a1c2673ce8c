// SensorBridge - Gateway sensor ingestion
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Raspberry Pi SPI and I2C buses
//!
//! Backed by `rppal`. SPI runs in mode 0 with 8-bit words at the configured
//! clock; I2C devices are addressed with 7-bit addresses.

use crate::device::{parse_spidev_path, I2cBus, SpiBus};
use crate::error::TransportError;
use log::debug;
use rppal::i2c::I2c;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

/// SPI bus on a spidev node, e.g. `/dev/spidev0.0`
pub struct RppalSpiBus {
    device: String,
    speed_hz: u32,
    spi: Option<Spi>,
}

impl RppalSpiBus {
    pub fn new(device: impl Into<String>, speed_hz: u32) -> Self {
        Self {
            device: device.into(),
            speed_hz,
            spi: None,
        }
    }

    fn select(&self) -> Result<(Bus, SlaveSelect), TransportError> {
        let unsupported = |reason: &str| TransportError::Open {
            device: self.device.clone(),
            reason: reason.to_string(),
        };
        let (bus, chip_select) =
            parse_spidev_path(&self.device).ok_or_else(|| unsupported("not a spidev node"))?;
        let bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            2 => Bus::Spi2,
            3 => Bus::Spi3,
            4 => Bus::Spi4,
            5 => Bus::Spi5,
            6 => Bus::Spi6,
            _ => return Err(unsupported("unsupported SPI bus")),
        };
        let slave_select = match chip_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            3 => SlaveSelect::Ss3,
            _ => return Err(unsupported("unsupported chip select")),
        };
        Ok((bus, slave_select))
    }
}

impl SpiBus for RppalSpiBus {
    fn open(&mut self) -> Result<(), TransportError> {
        let (bus, slave_select) = self.select()?;
        let spi = Spi::new(bus, slave_select, self.speed_hz, Mode::Mode0).map_err(|e| {
            TransportError::Open {
                device: self.device.clone(),
                reason: e.to_string(),
            }
        })?;
        debug!("SPI {} configured at {} Hz", self.device, self.speed_hz);
        self.spi = Some(spi);
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        let spi = self
            .spi
            .as_mut()
            .ok_or(TransportError::NotInitialized("SPI"))?;
        spi.transfer(rx, tx).map_err(|e| TransportError::Transfer {
            interface: "SPI",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} @ {} Hz", self.device, self.speed_hz)
    }
}

/// I2C bus on `/dev/i2c-N`
pub struct RppalI2cBus {
    bus: u8,
    i2c: Option<I2c>,
}

impl RppalI2cBus {
    pub fn new(bus: u8) -> Self {
        Self { bus, i2c: None }
    }
}

impl I2cBus for RppalI2cBus {
    fn open(&mut self) -> Result<(), TransportError> {
        let i2c = I2c::with_bus(self.bus).map_err(|e| TransportError::Open {
            device: format!("/dev/i2c-{}", self.bus),
            reason: e.to_string(),
        })?;
        self.i2c = Some(i2c);
        Ok(())
    }

    fn read_device(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        let i2c = self
            .i2c
            .as_mut()
            .ok_or(TransportError::NotInitialized("I2C"))?;
        i2c.set_slave_address(u16::from(address))
            .map_err(|e| TransportError::Transfer {
                interface: "I2C",
                reason: e.to_string(),
            })?;
        // A missing device NACKs its address
        i2c.read(buf)
            .map_err(|_| TransportError::NoDevice { address })
    }

    fn bus_number(&self) -> u8 {
        self.bus
    }
}
