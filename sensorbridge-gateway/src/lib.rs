// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # SensorBridge Gateway - Ingestion pipeline
//!
//! Turns readings from the `sensorbridge` transport readers into per-sensor
//! statistics, alerts, trend analysis and downstream messages.
//!
//! ## Features
//!
//! - **Bounded ingestion**: readers enqueue, a fixed worker pool drains;
//!   overflow drops the newest reading and counts it
//! - **Per-sensor statistics**: running averages, min/max, packet loss
//! - **Alerts**: thresholds, fault bits, packet loss and offline sensors,
//!   with optional throttling
//! - **Edge analytics**: least-squares temperature trend per sensor
//! - **Aggregation**: windowed per-sensor summaries on a fixed cadence
//! - **Pluggable sinks**: MQTT, WebSocket, alert and thermal callbacks
//!
//! ## Quick Start
//!
//! ```rust
//! use sensorbridge::{Interface, Reading};
//! use sensorbridge_gateway::{Gateway, GatewayConfig};
//!
//! let config = GatewayConfig {
//!     temp_alert_low: 18.0,
//!     temp_alert_high: 28.0,
//!     ..Default::default()
//! };
//! let mut gateway = Gateway::new(config).unwrap();
//! gateway.on_mqtt(|topic, payload| {
//!     println!("{} {}", topic, payload);
//!     Ok(())
//! });
//!
//! gateway.initialize().unwrap();
//! gateway.start().unwrap();
//! gateway.ingest(Reading::new("sensor_1", Interface::Uart, 22.5, 45.0, 3.3));
//! gateway.stop();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────┐ ┌─────┐ ┌─────┐
//! │ UART │ │ SPI │ │ I2C │   one thread per reader
//! └──┬───┘ └──┬──┘ └──┬──┘
//!    └────────┼───────┘
//!             ▼
//!    ┌─────────────────┐
//!    │ IngestionQueue  │     bounded, drop-newest
//!    └────────┬────────┘
//!             ▼
//!    ┌─────────────────┐
//!    │   WorkerPool    │     stats → alerts → analytics → sinks → aggregation
//!    └────────┬────────┘
//!             ▼
//!    MQTT / WebSocket / alert callbacks
//! ```

mod aggregator;
mod alerts;
mod analytics;
mod config;
mod error;
mod gateway;
mod pipeline;
mod queue;
mod registry;
mod sink;
mod stats;
mod status;
mod worker;

// Public API
pub use aggregator::{AggregateMessage, Aggregator, AverageSummary, RangeSummary};
pub use alerts::{
    check_thresholds, offline_alert, packet_loss_alert, Alert, AlertKind, AlertThrottle,
    Thresholds, ALERT_CATEGORY, PACKET_LOSS_MIN_FRAMES,
};
pub use analytics::{
    analyze_trend, linear_fit, EdgeAnalyticsResult, EdgeResults, MIN_HISTORY, RESULT_CAPACITY,
    TREND_ANALYSIS,
};
pub use config::{GatewayConfig, Preset};
pub use error::{ForwardingError, GatewayError, QueueFull, Result};
pub use gateway::{Gateway, GatewayHandle, GatewayState, DEFAULT_RECENT_RESULTS};
pub use pipeline::{Pipeline, PipelineStats};
pub use queue::{IngestionQueue, QueueEntry, QueueStats};
pub use registry::{HistoryEntry, RecordOutcome, SensorRecord, SensorRegistry, WindowSlice};
pub use sink::{
    aggregated_topic, data_topic, AlertCallback, ForwardStats, Forwarder, MqttCallback,
    ReadingMessage, Sinks, ThermalCallback, WebSocketCallback,
};
pub use stats::SensorStatistics;
pub use status::{GatewayStatus, InterfaceStatus, StatusMonitor};
pub use worker::WorkerPool;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
