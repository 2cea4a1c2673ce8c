// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! High-level Gateway API
//!
//! The [`Gateway`] owns the transport readers, the worker pool and the status
//! thread, and drives them through `Created → Initialized → Running → Stopped`.
//!
//! # Example
//!
//! ```rust
//! use sensorbridge::{Frame, MemorySerialPort, UartReader};
//! use sensorbridge_gateway::{Gateway, GatewayConfig};
//!
//! let port = MemorySerialPort::new();
//! let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
//! gateway.add_reader(UartReader::new(port.clone())).unwrap();
//! gateway.on_alert(|category, text, _alert| println!("[{}] {}", category, text));
//!
//! gateway.initialize().unwrap();
//! gateway.start().unwrap();
//! port.push_bytes(&Frame::new(42, 22.5, 48.0, 3.3).to_bytes());
//! // ...
//! gateway.stop();
//! ```

use crate::alerts::Alert;
use crate::analytics::EdgeAnalyticsResult;
use crate::config::GatewayConfig;
use crate::error::{ForwardingError, GatewayError, Result};
use crate::pipeline::Pipeline;
use crate::sink::Sinks;
use crate::stats::SensorStatistics;
use crate::status::{GatewayStatus, InterfaceStatus, StatusMonitor};
use crate::worker::WorkerPool;
use log::{error, info, warn};
use parking_lot::Mutex;
use sensorbridge::{Reading, TransportReader};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Default number of results returned by `recent_edge_results`
pub const DEFAULT_RECENT_RESULTS: usize = 10;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayState {
    Created,
    Initialized,
    Running,
    Stopped,
}

impl GatewayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayState::Created => "created",
            GatewayState::Initialized => "initialized",
            GatewayState::Running => "running",
            GatewayState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for GatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct GatewayShared {
    config: GatewayConfig,
    pipeline: Arc<Pipeline>,
    readers: Mutex<Vec<Box<dyn TransportReader>>>,
    state: Mutex<GatewayState>,
    started_at: Mutex<Option<Instant>>,
}

/// Cloneable query handle onto a running gateway
///
/// Handles stay valid after the gateway is stopped; they then report the
/// final state.
#[derive(Clone)]
pub struct GatewayHandle {
    shared: Arc<GatewayShared>,
}

impl GatewayHandle {
    pub fn state(&self) -> GatewayState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == GatewayState::Running
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.shared.config
    }

    /// Shared pipeline the readers and workers operate on
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.shared.pipeline
    }

    /// Current status snapshot
    pub fn status(&self) -> GatewayStatus {
        let shared = &self.shared;
        let pipeline = &shared.pipeline;

        let interfaces = shared
            .readers
            .lock()
            .iter()
            .map(|reader| {
                let stats = reader.stats();
                InterfaceStatus {
                    name: reader.name().to_string(),
                    active: reader.is_active(),
                    bytes_read: stats.bytes_read,
                    readings: stats.readings_emitted,
                    invalid: stats.invalid_readings,
                    checksum_failures: stats.checksum_failures,
                    io_errors: stats.io_errors,
                }
            })
            .collect();

        let uptime = shared
            .started_at
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or_default();
        let queue = pipeline.queue.stats();
        let processing = pipeline.stats();
        let forwarding = pipeline.forwarder.stats();
        let throughput = if uptime.as_secs_f64() > 0.0 {
            processing.processed as f64 / uptime.as_secs_f64()
        } else {
            0.0
        };

        GatewayStatus {
            gateway_id: shared.config.gateway_id.clone(),
            location: shared.config.location.clone(),
            state: self.state(),
            uptime_seconds: uptime.as_secs(),
            interfaces,
            queue_depth: queue.depth,
            queue_capacity: queue.capacity,
            queue_dropped: queue.dropped,
            processed: processing.processed,
            valid: processing.valid,
            invalid: processing.invalid,
            aggregates_sent: processing.aggregates_sent,
            mqtt_messages: forwarding.mqtt_messages,
            websocket_messages: forwarding.websocket_messages,
            forwarding_failures: forwarding.forwarding_failures,
            alerts_raised: forwarding.alerts_raised,
            known_sensors: pipeline.registry.len(),
            active_sensors: pipeline.registry.active_count(),
            edge_results: pipeline.edge_results.len(),
            throughput_per_second: throughput,
        }
    }

    /// Statistics for one sensor, if it has ever reported
    pub fn sensor_statistics(&self, sensor_id: &str) -> Option<SensorStatistics> {
        self.shared.pipeline.registry.statistics(sensor_id)
    }

    /// Statistics for every known sensor, keyed by sensor id
    pub fn all_statistics(&self) -> BTreeMap<String, SensorStatistics> {
        self.shared.pipeline.registry.all_statistics()
    }

    /// The newest `count` edge analytics results, oldest first
    pub fn recent_edge_results(&self, count: usize) -> Vec<EdgeAnalyticsResult> {
        self.shared.pipeline.edge_results.recent(count)
    }

    /// Forget every sensor and analysis result
    pub fn clear_sensors(&self) {
        self.shared.pipeline.clear();
        info!("Cleared all sensor data");
    }

    /// Run an aggregation sweep now; returns the number of aggregates sent
    pub fn trigger_aggregation(&self) -> usize {
        self.shared.pipeline.aggregate(Instant::now())
    }

    /// Inject a reading as if a transport had produced it
    ///
    /// Returns false when the queue dropped it.
    pub fn ingest(&self, reading: Reading) -> bool {
        self.shared.pipeline.ingest(reading)
    }
}

/// Gateway orchestrator
pub struct Gateway {
    handle: GatewayHandle,
    pool: Option<WorkerPool>,
    monitor: Option<StatusMonitor>,
}

impl Gateway {
    /// Create a gateway in the `Created` state
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let pipeline = Arc::new(Pipeline::new(&config));
        let shared = GatewayShared {
            config,
            pipeline,
            readers: Mutex::new(Vec::new()),
            state: Mutex::new(GatewayState::Created),
            started_at: Mutex::new(None),
        };
        Ok(Self {
            handle: GatewayHandle {
                shared: Arc::new(shared),
            },
            pool: None,
            monitor: None,
        })
    }

    /// Register a transport reader
    ///
    /// # Errors
    ///
    /// Readers can only be added before `initialize`.
    pub fn add_reader(&mut self, reader: impl TransportReader + 'static) -> Result<()> {
        self.require(GatewayState::Created, "add a reader")?;
        info!("Registered {} reader", reader.name());
        self.shared().readers.lock().push(Box::new(reader));
        Ok(())
    }

    /// Number of registered readers
    pub fn reader_count(&self) -> usize {
        self.shared().readers.lock().len()
    }

    /// Publish callback for MQTT `(topic, payload)`
    pub fn on_mqtt<F>(&self, callback: F)
    where
        F: Fn(&str, &str) -> std::result::Result<(), ForwardingError> + Send + Sync + 'static,
    {
        self.update_sinks(|sinks| sinks.mqtt = Some(Arc::new(callback)));
    }

    /// Broadcast callback for WebSocket clients `(payload)`
    pub fn on_websocket<F>(&self, callback: F)
    where
        F: Fn(&str) -> std::result::Result<(), ForwardingError> + Send + Sync + 'static,
    {
        self.update_sinks(|sinks| sinks.websocket = Some(Arc::new(callback)));
    }

    /// Alert callback `(category, "<sensor_id>: <message>", alert)`
    pub fn on_alert<F>(&self, callback: F)
    where
        F: Fn(&str, &str, &Alert) + Send + Sync + 'static,
    {
        self.update_sinks(|sinks| sinks.alert = Some(Arc::new(callback)));
    }

    /// Thermal monitor callback `(sensor_id, temperature, humidity)`
    pub fn on_thermal<F>(&self, callback: F)
    where
        F: Fn(&str, f64, f64) + Send + Sync + 'static,
    {
        self.update_sinks(|sinks| sinks.thermal = Some(Arc::new(callback)));
    }

    /// Open every reader and wire it to the pipeline
    ///
    /// # Errors
    ///
    /// Any reader failing to initialize aborts; the gateway stays `Created`
    /// and should be discarded.
    pub fn initialize(&mut self) -> Result<()> {
        self.require(GatewayState::Created, "initialize")?;
        let shared = Arc::clone(&self.handle.shared);

        for reader in shared.readers.lock().iter_mut() {
            if let Err(e) = reader.initialize() {
                error!("Failed to initialize {} reader: {}", reader.name(), e);
                return Err(e.into());
            }
            let pipeline = Arc::clone(&shared.pipeline);
            reader.on_frame(Arc::new(move |reading: Reading| {
                pipeline.ingest(reading);
            }))?;
        }

        self.pool = Some(WorkerPool::new(shared.config.worker_thread_count));
        *shared.state.lock() = GatewayState::Initialized;
        info!(
            "Gateway {} initialized with {} readers",
            shared.config.gateway_id,
            shared.readers.lock().len()
        );
        Ok(())
    }

    /// Start workers, then readers, then the status thread
    ///
    /// Starting a running gateway is a no-op.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::NotInitialized`] before `initialize`
    /// - [`GatewayError::InvalidState`] once stopped
    /// - a reader or thread failing to start; everything already started is
    ///   stopped again and the gateway ends `Stopped`
    pub fn start(&mut self) -> Result<()> {
        match self.state() {
            GatewayState::Created => return Err(GatewayError::NotInitialized),
            GatewayState::Running => return Ok(()),
            GatewayState::Stopped => return Err(self.invalid_state("start")),
            GatewayState::Initialized => {}
        }
        let shared = Arc::clone(&self.handle.shared);

        if let Some(pool) = self.pool.as_mut() {
            if let Err(e) = pool.start(&shared.pipeline) {
                self.teardown();
                return Err(e);
            }
        }

        let started = {
            let mut readers = shared.readers.lock();
            readers
                .iter_mut()
                .try_for_each(|reader| reader.start())
        };
        if let Err(e) = started {
            error!("Failed to start reader: {}", e);
            self.teardown();
            return Err(e.into());
        }

        let status_handle = self.handle.clone();
        let monitor = StatusMonitor::spawn(shared.config.status_interval(), move || {
            status_tick(&status_handle)
        });
        match monitor {
            Ok(monitor) => self.monitor = Some(monitor),
            Err(e) => {
                self.teardown();
                return Err(e);
            }
        }

        *shared.started_at.lock() = Some(Instant::now());
        *shared.state.lock() = GatewayState::Running;
        info!(
            "Gateway {} running ({} workers)",
            shared.config.gateway_id, shared.config.worker_thread_count
        );
        Ok(())
    }

    /// Stop readers, drain the worker pool and stop the status thread
    ///
    /// Idempotent; a stopped gateway cannot be restarted.
    pub fn stop(&mut self) {
        if self.state() == GatewayState::Stopped {
            return;
        }
        info!("Stopping gateway {}", self.shared().config.gateway_id);
        self.teardown();
        info!("Gateway stopped: {}", self.handle.status().summary());
    }

    /// Cloneable query handle
    pub fn handle(&self) -> GatewayHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> GatewayState {
        self.handle.state()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn config(&self) -> &GatewayConfig {
        self.handle.config()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        self.handle.pipeline()
    }

    pub fn status(&self) -> GatewayStatus {
        self.handle.status()
    }

    pub fn sensor_statistics(&self, sensor_id: &str) -> Option<SensorStatistics> {
        self.handle.sensor_statistics(sensor_id)
    }

    pub fn all_statistics(&self) -> BTreeMap<String, SensorStatistics> {
        self.handle.all_statistics()
    }

    pub fn recent_edge_results(&self, count: usize) -> Vec<EdgeAnalyticsResult> {
        self.handle.recent_edge_results(count)
    }

    pub fn clear_sensors(&self) {
        self.handle.clear_sensors()
    }

    pub fn trigger_aggregation(&self) -> usize {
        self.handle.trigger_aggregation()
    }

    pub fn ingest(&self, reading: Reading) -> bool {
        self.handle.ingest(reading)
    }

    fn shared(&self) -> &GatewayShared {
        &self.handle.shared
    }

    fn update_sinks(&self, update: impl FnOnce(&mut Sinks)) {
        self.shared().pipeline.forwarder.update_sinks(update);
    }

    fn require(&self, expected: GatewayState, operation: &'static str) -> Result<()> {
        if self.state() == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> GatewayError {
        GatewayError::InvalidState {
            operation,
            state: self.state().to_string(),
        }
    }

    fn teardown(&mut self) {
        let shared = Arc::clone(&self.handle.shared);
        for reader in shared.readers.lock().iter_mut() {
            reader.stop();
        }
        match self.pool.as_mut() {
            Some(pool) => pool.shutdown(&shared.pipeline),
            None => shared.pipeline.queue.shutdown(),
        }
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        *shared.state.lock() = GatewayState::Stopped;
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.stop();
    }
}

fn status_tick(handle: &GatewayHandle) {
    let offline = handle.pipeline().check_offline(Instant::now());
    if !offline.is_empty() {
        warn!("{} sensors went offline: {}", offline.len(), offline.join(", "));
    }
    info!("Status: {}", handle.status().summary());
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorbridge::{Interface, MemorySerialPort, UartReader};

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = GatewayConfig {
            worker_thread_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            Gateway::new(config),
            Err(GatewayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_lifecycle_states() {
        let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
        assert_eq!(gateway.state(), GatewayState::Created);

        gateway.initialize().unwrap();
        assert_eq!(gateway.state(), GatewayState::Initialized);

        gateway.start().unwrap();
        assert!(gateway.is_running());
        gateway.start().unwrap();

        gateway.stop();
        assert_eq!(gateway.state(), GatewayState::Stopped);
        gateway.stop();
        assert_eq!(gateway.state(), GatewayState::Stopped);
    }

    #[test]
    fn test_start_requires_initialize() {
        let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
        assert!(matches!(gateway.start(), Err(GatewayError::NotInitialized)));
    }

    #[test]
    fn test_stopped_gateway_cannot_restart() {
        let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
        gateway.initialize().unwrap();
        gateway.start().unwrap();
        gateway.stop();
        assert!(matches!(
            gateway.start(),
            Err(GatewayError::InvalidState { operation: "start", .. })
        ));
    }

    #[test]
    fn test_readers_only_added_before_initialize() {
        let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
        gateway
            .add_reader(UartReader::new(MemorySerialPort::new()))
            .unwrap();
        gateway.initialize().unwrap();
        let late = gateway.add_reader(UartReader::new(MemorySerialPort::new()));
        assert!(matches!(late, Err(GatewayError::InvalidState { .. })));
        assert_eq!(gateway.reader_count(), 1);
    }

    #[test]
    fn test_initialize_failure_aborts() {
        let port = MemorySerialPort::new();
        port.fail_open("no such device");
        let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
        gateway.add_reader(UartReader::new(port)).unwrap();

        assert!(matches!(
            gateway.initialize(),
            Err(GatewayError::Transport(_))
        ));
        assert_eq!(gateway.state(), GatewayState::Created);
    }

    #[test]
    fn test_status_before_start() {
        let gateway = Gateway::new(GatewayConfig::with_gateway_id("gw-test")).unwrap();
        let status = gateway.status();
        assert_eq!(status.gateway_id, "gw-test");
        assert_eq!(status.state, GatewayState::Created);
        assert_eq!(status.uptime_seconds, 0);
        assert_eq!(status.queue_capacity, 10_000);
        assert!(status.interfaces.is_empty());
    }

    #[test]
    fn test_handle_outlives_gateway() {
        let handle = {
            let mut gateway = Gateway::new(GatewayConfig::default()).unwrap();
            gateway.initialize().unwrap();
            gateway.handle()
        };
        assert_eq!(handle.state(), GatewayState::Stopped);
        assert!(!handle.ingest(Reading::new("s1", Interface::Uart, 20.0, 40.0, 3.3)));
    }
}
