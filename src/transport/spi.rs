// SensorBridge - Gateway sensor ingestion
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! SPI reader: one 14-byte full-duplex transfer per poll

use super::{FrameCallback, LoopContext, ReaderCore, ReaderStats, TransportReader};
use crate::device::SpiBus;
use crate::error::{DecodeError, TransportError};
use crate::protocol::{decode, sensor_identity, Interface, Reading, FRAME_LEN, SYNC};
use log::{debug, error};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// SPI reader settings
#[derive(Debug, Clone)]
pub struct SpiSettings {
    /// Interval between transfers
    pub poll_interval: Duration,
    /// Location stamped on readings
    pub location: String,
    /// Confidence stamped on readings
    pub data_confidence: f64,
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            location: "SPI_Bus".to_string(),
            data_confidence: 0.98,
        }
    }
}

/// Reader polling a single SPI peripheral
pub struct SpiReader {
    bus: Arc<Mutex<Box<dyn SpiBus>>>,
    settings: SpiSettings,
    core: ReaderCore,
}

impl SpiReader {
    pub fn new(bus: impl SpiBus + 'static) -> Self {
        Self::with_settings(bus, SpiSettings::default())
    }

    pub fn with_settings(bus: impl SpiBus + 'static, settings: SpiSettings) -> Self {
        Self {
            bus: Arc::new(Mutex::new(Box::new(bus))),
            settings,
            core: ReaderCore::new(Interface::Spi),
        }
    }
}

impl TransportReader for SpiReader {
    fn interface(&self) -> Interface {
        Interface::Spi
    }

    fn initialize(&mut self) -> Result<(), TransportError> {
        {
            let mut bus = self.bus.lock();
            bus.open()?;
            debug!("SPI opened {}", bus.describe());
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

fn run(ctx: LoopContext, bus: Arc<Mutex<Box<dyn SpiBus>>>, settings: SpiSettings) {
    let tx = [0u8; FRAME_LEN];
    let mut rx = [0u8; FRAME_LEN];

    while ctx.running() {
        let result = bus.lock().transfer(&tx, &mut rx);
        match result {
            Ok(()) => {
                ctx.counters.add_bytes(FRAME_LEN);
                if rx[0..2] == SYNC {
                    match decode(&rx) {
                        Ok(frame) => {
                            let reading = Reading::from_frame(
                                &frame,
                                Interface::Spi,
                                sensor_identity("spi_sensor_", frame.node_id),
                                &settings.location,
                                settings.data_confidence,
                            );
                            ctx.emit(reading);
                        }
                        Err(DecodeError::ChecksumMismatch { .. }) => {
                            ctx.counters.add_checksum_failures(1);
                            debug!("SPI frame dropped: bad checksum");
                        }
                        Err(e) => debug!("SPI frame dropped: {}", e),
                    }
                }
            }
            Err(e) => {
                ctx.counters.io_error();
                error!("SPI transfer failed: {}", e);
            }
        }
        ctx.pause(settings.poll_interval);
    }
}
