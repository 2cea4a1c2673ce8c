// SensorBridge - Gateway sensor ingestion
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! UART reader: continuous byte stream reassembled into frames

use super::{FrameCallback, LoopContext, ReaderCore, ReaderStats, TransportReader};
use crate::decoder::StreamDecoder;
use crate::device::SerialPort;
use crate::error::TransportError;
use crate::protocol::{sensor_identity, Interface, Reading};
use log::{debug, error};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// UART reader settings
#[derive(Debug, Clone)]
pub struct UartSettings {
    /// Sleep between read attempts
    pub poll_interval: Duration,
    /// Maximum bytes taken per read
    pub read_chunk: usize,
    /// Location stamped on readings
    pub location: String,
    /// Confidence stamped on readings
    pub data_confidence: f64,
}

impl Default for UartSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            read_chunk: 256,
            location: "Unknown".to_string(),
            data_confidence: 0.95,
        }
    }
}

/// Reader for a byte-stream link
pub struct UartReader {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
    settings: UartSettings,
    core: ReaderCore,
}

impl UartReader {
    pub fn new(port: impl SerialPort + 'static) -> Self {
        Self::with_settings(port, UartSettings::default())
    }

    pub fn with_settings(port: impl SerialPort + 'static, settings: UartSettings) -> Self {
        Self {
            port: Arc::new(Mutex::new(Box::new(port))),
            settings,
            core: ReaderCore::new(Interface::Uart),
        }
    }

    pub fn settings(&self) -> &UartSettings {
        &self.settings
    }
}

impl TransportReader for UartReader {
    fn interface(&self) -> Interface {
        Interface::Uart
    }

    fn initialize(&mut self) -> Result<(), TransportError> {
        {
            let mut port = self.port.lock();
            port.open()?;
            debug!("UART opened {}", port.describe());
        }
        self.core.mark_initialized();
        Ok(())
    }

    fn on_frame(&mut self, callback: FrameCallback) -> Result<(), TransportError> {
        self.core.set_callback(callback)
    }

    fn start(&mut self) -> Result<(), TransportError> {
        let port = Arc::clone(&self.port);
        let settings = self.settings.clone();
        self.core.spawn(move |ctx| run(ctx, port, settings))
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

fn run(ctx: LoopContext, port: Arc<Mutex<Box<dyn SerialPort>>>, settings: UartSettings) {
    let mut decoder = StreamDecoder::new();
    let mut buf = vec![0u8; settings.read_chunk.max(1)];
    let mut seen_failures = 0;

    while ctx.running() {
        let result = port.lock().read(&mut buf);
        match result {
            Ok(0) => {}
            Ok(n) => {
                ctx.counters.add_bytes(n);
                for frame in decoder.feed(&buf[..n]) {
                    let reading = Reading::from_frame(
                        &frame,
                        Interface::Uart,
                        sensor_identity("sensor_", frame.node_id),
                        &settings.location,
                        settings.data_confidence,
                    );
                    ctx.emit(reading);
                }
                let failures = decoder.stats().checksum_failures;
                ctx.counters.add_checksum_failures(failures - seen_failures);
                seen_failures = failures;
            }
            Err(e) => {
                ctx.counters.io_error();
                error!("UART read failed: {}", e);
            }
        }
        ctx.pause(settings.poll_interval);
    }
}
