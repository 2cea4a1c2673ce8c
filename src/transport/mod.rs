// SensorBridge - Gateway sensor ingestion
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Transport readers
//!
//! Each reader owns one hardware handle and runs its own acquisition thread.
//! Readings, valid or not, are reported through the single `on_frame`
//! callback assigned before `start`.

mod i2c;
mod spi;
mod uart;

pub use i2c::{DeviceProfile, I2cReader, I2cSettings};
pub use spi::{SpiReader, SpiSettings};
pub use uart::{UartReader, UartSettings};

use crate::error::TransportError;
use crate::protocol::{Interface, Reading};
use log::{error, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback invoked for every reading a transport produces
pub type FrameCallback = Arc<dyn Fn(Reading) + Send + Sync>;

/// Common contract of the UART, SPI and I2C readers
pub trait TransportReader: Send {
    /// Link this reader serves
    fn interface(&self) -> Interface;

    /// Display name, e.g. "UART"
    fn name(&self) -> &'static str {
        self.interface().as_str()
    }

    /// Open the hardware handle
    fn initialize(&mut self) -> Result<(), TransportError>;

    /// Assign the reading callback; may only be called once
    fn on_frame(&mut self, callback: FrameCallback) -> Result<(), TransportError>;

    /// Spawn the acquisition thread; a no-op when already active
    fn start(&mut self) -> Result<(), TransportError>;

    /// Stop the acquisition thread and wait for it to exit
    fn stop(&mut self);

    /// Whether the acquisition thread is running
    fn is_active(&self) -> bool;

    /// Counters snapshot
    fn stats(&self) -> ReaderStats;
}

/// Per-reader counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Raw bytes read from the link
    pub bytes_read: u64,
    /// Readings handed to the callback
    pub readings_emitted: u64,
    /// Emitted readings that failed range validation
    pub invalid_readings: u64,
    /// Frames dropped for a bad checksum
    pub checksum_failures: u64,
    /// Failed I/O attempts
    pub io_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ReaderCounters {
    bytes_read: AtomicU64,
    readings_emitted: AtomicU64,
    invalid_readings: AtomicU64,
    checksum_failures: AtomicU64,
    io_errors: AtomicU64,
}

impl ReaderCounters {
    pub(crate) fn add_bytes(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_checksum_failures(&self, n: u64) {
        self.checksum_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ReaderStats {
        ReaderStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            readings_emitted: self.readings_emitted.load(Ordering::Relaxed),
            invalid_readings: self.invalid_readings.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
        }
    }
}

/// Lifecycle state shared by every reader implementation
pub(crate) struct ReaderCore {
    interface: Interface,
    initialized: bool,
    active: Arc<AtomicBool>,
    callback: Option<FrameCallback>,
    handle: Option<JoinHandle<()>>,
    counters: Arc<ReaderCounters>,
}

/// Everything an acquisition loop needs from its reader
pub(crate) struct LoopContext {
    pub active: Arc<AtomicBool>,
    pub callback: FrameCallback,
    pub counters: Arc<ReaderCounters>,
}

impl LoopContext {
    pub fn running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Hand a reading to the callback
    pub fn emit(&self, reading: Reading) {
        if !reading.is_valid {
            self.counters.invalid_readings.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.readings_emitted.fetch_add(1, Ordering::Relaxed);
        (self.callback)(reading);
    }

    /// Sleep for `interval`, waking early once the reader is stopped
    pub fn pause(&self, interval: Duration) {
        const SLICE: Duration = Duration::from_millis(20);
        let mut remaining = interval;
        while !remaining.is_zero() && self.running() {
            let step = remaining.min(SLICE);
            thread::sleep(step);
            remaining -= step;
        }
    }
}

impl ReaderCore {
    pub(crate) fn new(interface: Interface) -> Self {
        Self {
            interface,
            initialized: false,
            active: Arc::new(AtomicBool::new(false)),
            callback: None,
            handle: None,
            counters: Arc::new(ReaderCounters::default()),
        }
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
        info!("{} interface initialized", self.interface);
    }

    pub(crate) fn set_callback(&mut self, callback: FrameCallback) -> Result<(), TransportError> {
        if self.callback.is_some() {
            return Err(TransportError::CallbackAlreadySet(self.interface.as_str()));
        }
        self.callback = Some(callback);
        Ok(())
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> ReaderStats {
        self.counters.snapshot()
    }

    /// Spawn `body` on a named thread unless the reader is already running
    pub(crate) fn spawn<F>(&mut self, body: F) -> Result<(), TransportError>
    where
        F: FnOnce(LoopContext) + Send + 'static,
    {
        let name = self.interface.as_str();
        if !self.initialized {
            return Err(TransportError::NotInitialized(name));
        }
        if self.is_active() {
            return Ok(());
        }
        let callback = self
            .callback
            .clone()
            .ok_or(TransportError::CallbackMissing(name))?;

        self.active.store(true, Ordering::Release);
        let ctx = LoopContext {
            active: Arc::clone(&self.active),
            callback,
            counters: Arc::clone(&self.counters),
        };

        let handle = thread::Builder::new()
            .name(format!("{}-reader", name.to_lowercase()))
            .spawn(move || body(ctx))
            .map_err(|e| {
                self.active.store(false, Ordering::Release);
                TransportError::Spawn {
                    interface: name,
                    reason: e.to_string(),
                }
            })?;
        self.handle = Some(handle);
        info!("{} reader started", name);
        Ok(())
    }

    pub(crate) fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("{} reader thread panicked", self.interface);
            }
            info!("{} reader stopped", self.interface);
        }
    }
}

impl Drop for ReaderCore {
    fn drop(&mut self) {
        self.stop();
    }
}
