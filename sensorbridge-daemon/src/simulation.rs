// SensorBridge Daemon - Simulated sensor network
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Simulated UART, SPI and I2C devices for running the daemon without
//! hardware.
//!
//! The UART link carries a small fleet of indoor nodes plus one heating node
//! (to exercise trend analysis) and one node with an unreliable link. SPI
//! carries a single node; every configured I2C address with a known register
//! layout gets an indoor device.

use crate::error::Result;
use crate::readers::{i2c_settings, spi_settings, uart_settings};
use sensorbridge::{I2cReader, SpiReader, UartReader};
use sensorbridge_gateway::Gateway;
use sensorbridge_testdata::{
    Fault, FaultConfig, FrameGenerator, NodeProfile, SimulatedI2cBus, SimulatedSerialPort,
    SimulatedSpiBus,
};
use std::time::Duration;
use tracing::{debug, info};

/// Parameters of the simulated network.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Seed for every generator.
    pub seed: u64,
    /// Indoor nodes on the UART link.
    pub uart_nodes: u32,
    /// Wall-clock spacing between UART frames.
    pub frame_period: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            uart_nodes: 4,
            frame_period: Duration::from_millis(250),
        }
    }
}

pub const HEATING_NODE: u32 = 900;
pub const LOSSY_NODE: u32 = 901;
pub const SPI_NODE: u32 = 5001;

/// Serial port carrying the UART fleet.
pub fn uart_port(sim: &SimulationConfig) -> SimulatedSerialPort {
    let mut generator = FrameGenerator::new(sim.seed);
    for node in 1..=sim.uart_nodes {
        generator.add_node(NodeProfile::indoor(node));
    }
    generator.add_node(NodeProfile::heating(HEATING_NODE, 21.0, 0.6));
    generator.add_node(
        NodeProfile::indoor(LOSSY_NODE)
            .with_fault(FaultConfig::new(
                Fault::Intermittent { failure_prob: 0.15 },
                0,
            ))
            .with_fault(FaultConfig::new(Fault::LeadingGarbage { len: 3 }, 0)),
    );
    SimulatedSerialPort::new(generator).paced(sim.frame_period)
}

pub fn spi_bus(sim: &SimulationConfig) -> SimulatedSpiBus {
    SimulatedSpiBus::new(
        FrameGenerator::new(sim.seed.wrapping_add(1)).with_node(NodeProfile::indoor(SPI_NODE)),
    )
}

/// I2C bus with an indoor device on every supported address.
pub fn i2c_bus(bus: u8, addresses: &[u8], sim: &SimulationConfig) -> SimulatedI2cBus {
    let sim_bus = SimulatedI2cBus::new(bus, sim.seed.wrapping_add(2));
    for &address in addresses {
        if sim_bus.attach(address, NodeProfile::indoor(u32::from(address))) {
            debug!("Simulated I2C device at 0x{:02X}", address);
        } else {
            debug!("No simulated device for I2C address 0x{:02X}", address);
        }
    }
    sim_bus
}

/// Attach simulated UART, SPI and I2C readers to the gateway.
pub fn attach_simulated(gateway: &mut Gateway, sim: &SimulationConfig) -> Result<()> {
    let config = gateway.config().clone();

    gateway.add_reader(UartReader::with_settings(
        uart_port(sim),
        uart_settings(&config),
    ))?;
    gateway.add_reader(SpiReader::with_settings(spi_bus(sim), spi_settings(&config)))?;
    gateway.add_reader(I2cReader::with_settings(
        i2c_bus(config.i2c_bus, &config.i2c_addresses, sim),
        i2c_settings(&config),
    ))?;

    info!(
        "Simulation enabled: {} UART nodes, seed {}",
        sim.uart_nodes + 2,
        sim.seed
    );
    Ok(())
}
