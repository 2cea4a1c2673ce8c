// SensorBridge Daemon - Transport reader setup
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Reader settings derived from the gateway configuration.

use crate::error::Result;
use sensorbridge::{I2cSettings, SpiSettings, TtySerialPort, UartReader, UartSettings};
use sensorbridge_gateway::{Gateway, GatewayConfig};
use std::time::Duration;
use tracing::info;
#[cfg(not(feature = "hardware"))]
use tracing::warn;

pub fn uart_settings(config: &GatewayConfig) -> UartSettings {
    UartSettings {
        poll_interval: Duration::from_millis(config.uart_poll_interval_ms),
        ..Default::default()
    }
}

pub fn spi_settings(config: &GatewayConfig) -> SpiSettings {
    SpiSettings {
        poll_interval: Duration::from_millis(config.spi_poll_interval_ms),
        ..Default::default()
    }
}

pub fn i2c_settings(config: &GatewayConfig) -> I2cSettings {
    I2cSettings {
        addresses: config.i2c_addresses.clone(),
        poll_interval: Duration::from_millis(config.i2c_poll_interval_ms),
    }
}

/// Attach a UART reader on the configured serial device.
pub fn attach_serial(gateway: &mut Gateway) -> Result<()> {
    let config = gateway.config().clone();
    let port = TtySerialPort::new(config.uart_device.as_str(), config.uart_baud_rate);
    info!("UART reader on {:?}", port);
    gateway.add_reader(UartReader::with_settings(port, uart_settings(&config)))?;
    Ok(())
}

/// Attach SPI and I2C readers on the configured buses.
#[cfg(feature = "hardware")]
pub fn attach_buses(gateway: &mut Gateway) -> Result<()> {
    use sensorbridge::{I2cReader, RppalI2cBus, RppalSpiBus, SpiReader};

    let config = gateway.config().clone();
    info!(
        "SPI reader on {} @ {} Hz",
        config.spi_device, config.spi_speed_hz
    );
    gateway.add_reader(SpiReader::with_settings(
        RppalSpiBus::new(config.spi_device.as_str(), config.spi_speed_hz),
        spi_settings(&config),
    ))?;
    info!(
        "I2C reader on bus {} ({} addresses)",
        config.i2c_bus,
        config.i2c_addresses.len()
    );
    gateway.add_reader(I2cReader::with_settings(
        RppalI2cBus::new(config.i2c_bus),
        i2c_settings(&config),
    ))?;
    Ok(())
}

#[cfg(not(feature = "hardware"))]
pub fn attach_buses(gateway: &mut Gateway) -> Result<()> {
    let config = gateway.config();
    warn!(
        "Built without the `hardware` feature; SPI {} and I2C bus {} are not read",
        config.spi_device, config.i2c_bus
    );
    Ok(())
}
