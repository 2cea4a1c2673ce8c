// SensorBridge Daemon - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for SensorBridge monitoring.
//!
//! Gauges are refreshed from a [`GatewayStatus`] snapshot and the per-sensor
//! statistics each time `/metrics` is scraped.

use crate::error::Result;
use lazy_static::lazy_static;
use prometheus::{register_gauge, register_gauge_vec, Encoder, Gauge, GaugeVec, TextEncoder};
use sensorbridge_gateway::{GatewayState, GatewayStatus, SensorStatistics};
use std::collections::BTreeMap;

lazy_static! {
    // ============================================================
    // Gateway Metrics (from GatewayStatus)
    // ============================================================

    /// Lifecycle state: 0 = created, 1 = initialized, 2 = running, 3 = stopped.
    pub static ref GATEWAY_STATE: Gauge = register_gauge!(
        "sensorbridge_gateway_state",
        "Gateway lifecycle state (0=created, 1=initialized, 2=running, 3=stopped)"
    ).expect("register sensorbridge_gateway_state");

    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "sensorbridge_uptime_seconds",
        "Seconds since the gateway started"
    ).expect("register sensorbridge_uptime_seconds");

    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "sensorbridge_queue_depth",
        "Readings waiting in the ingestion queue"
    ).expect("register sensorbridge_queue_depth");

    pub static ref QUEUE_CAPACITY: Gauge = register_gauge!(
        "sensorbridge_queue_capacity",
        "Ingestion queue capacity"
    ).expect("register sensorbridge_queue_capacity");

    pub static ref QUEUE_DROPPED: Gauge = register_gauge!(
        "sensorbridge_queue_dropped_total",
        "Readings dropped because the queue was full"
    ).expect("register sensorbridge_queue_dropped_total");

    /// Processed readings, labeled by outcome (valid, invalid).
    pub static ref READINGS_PROCESSED: GaugeVec = register_gauge_vec!(
        "sensorbridge_readings_processed_total",
        "Readings processed by the worker pool",
        &["outcome"]
    ).expect("register sensorbridge_readings_processed_total");

    /// Forwarded messages, labeled by sink (mqtt, websocket).
    pub static ref MESSAGES_FORWARDED: GaugeVec = register_gauge_vec!(
        "sensorbridge_messages_forwarded_total",
        "Messages handed to a forwarding sink",
        &["sink"]
    ).expect("register sensorbridge_messages_forwarded_total");

    pub static ref FORWARDING_FAILURES: Gauge = register_gauge!(
        "sensorbridge_forwarding_failures_total",
        "Sink callbacks that reported a failure"
    ).expect("register sensorbridge_forwarding_failures_total");

    pub static ref AGGREGATES_SENT: Gauge = register_gauge!(
        "sensorbridge_aggregates_sent_total",
        "Per-sensor aggregates forwarded"
    ).expect("register sensorbridge_aggregates_sent_total");

    pub static ref ALERTS_RAISED: Gauge = register_gauge!(
        "sensorbridge_alerts_raised_total",
        "Alerts routed to the alert callback"
    ).expect("register sensorbridge_alerts_raised_total");

    pub static ref SENSORS: GaugeVec = register_gauge_vec!(
        "sensorbridge_sensors",
        "Known sensors by activity",
        &["state"]
    ).expect("register sensorbridge_sensors");

    pub static ref THROUGHPUT: Gauge = register_gauge!(
        "sensorbridge_throughput_per_second",
        "Processed readings per second of uptime"
    ).expect("register sensorbridge_throughput_per_second");

    // ============================================================
    // Interface Metrics
    // ============================================================

    pub static ref INTERFACE_ACTIVE: GaugeVec = register_gauge_vec!(
        "sensorbridge_interface_active",
        "Whether the interface reader thread is running (1) or not (0)",
        &["interface"]
    ).expect("register sensorbridge_interface_active");

    pub static ref INTERFACE_BYTES: GaugeVec = register_gauge_vec!(
        "sensorbridge_interface_bytes_total",
        "Bytes read from the interface",
        &["interface"]
    ).expect("register sensorbridge_interface_bytes_total");

    pub static ref INTERFACE_CHECKSUM_FAILURES: GaugeVec = register_gauge_vec!(
        "sensorbridge_interface_checksum_failures_total",
        "Frames rejected for a checksum mismatch",
        &["interface"]
    ).expect("register sensorbridge_interface_checksum_failures_total");

    pub static ref INTERFACE_IO_ERRORS: GaugeVec = register_gauge_vec!(
        "sensorbridge_interface_io_errors_total",
        "Device read failures",
        &["interface"]
    ).expect("register sensorbridge_interface_io_errors_total");

    // ============================================================
    // Per-Sensor Metrics
    // ============================================================

    pub static ref SENSOR_TEMPERATURE_AVG: GaugeVec = register_gauge_vec!(
        "sensorbridge_sensor_temperature_avg_celsius",
        "Running average temperature per sensor",
        &["sensor"]
    ).expect("register sensorbridge_sensor_temperature_avg_celsius");

    pub static ref SENSOR_HUMIDITY_AVG: GaugeVec = register_gauge_vec!(
        "sensorbridge_sensor_humidity_avg_percent",
        "Running average humidity per sensor",
        &["sensor"]
    ).expect("register sensorbridge_sensor_humidity_avg_percent");

    pub static ref SENSOR_PACKET_LOSS: GaugeVec = register_gauge_vec!(
        "sensorbridge_sensor_packet_loss_ratio",
        "Invalid readings over total readings per sensor",
        &["sensor"]
    ).expect("register sensorbridge_sensor_packet_loss_ratio");
}

fn state_value(state: GatewayState) -> f64 {
    match state {
        GatewayState::Created => 0.0,
        GatewayState::Initialized => 1.0,
        GatewayState::Running => 2.0,
        GatewayState::Stopped => 3.0,
    }
}

/// Update gateway-level metrics from a status snapshot.
pub fn update_gateway_metrics(status: &GatewayStatus) {
    GATEWAY_STATE.set(state_value(status.state));
    UPTIME_SECONDS.set(status.uptime_seconds as f64);
    QUEUE_DEPTH.set(status.queue_depth as f64);
    QUEUE_CAPACITY.set(status.queue_capacity as f64);
    QUEUE_DROPPED.set(status.queue_dropped as f64);
    READINGS_PROCESSED
        .with_label_values(&["valid"])
        .set(status.valid as f64);
    READINGS_PROCESSED
        .with_label_values(&["invalid"])
        .set(status.invalid as f64);
    MESSAGES_FORWARDED
        .with_label_values(&["mqtt"])
        .set(status.mqtt_messages as f64);
    MESSAGES_FORWARDED
        .with_label_values(&["websocket"])
        .set(status.websocket_messages as f64);
    FORWARDING_FAILURES.set(status.forwarding_failures as f64);
    AGGREGATES_SENT.set(status.aggregates_sent as f64);
    ALERTS_RAISED.set(status.alerts_raised as f64);
    SENSORS
        .with_label_values(&["active"])
        .set(status.active_sensors as f64);
    SENSORS
        .with_label_values(&["inactive"])
        .set(status.known_sensors.saturating_sub(status.active_sensors) as f64);
    THROUGHPUT.set(status.throughput_per_second);

    for interface in &status.interfaces {
        let label = [interface.name.as_str()];
        INTERFACE_ACTIVE
            .with_label_values(&label)
            .set(if interface.active { 1.0 } else { 0.0 });
        INTERFACE_BYTES
            .with_label_values(&label)
            .set(interface.bytes_read as f64);
        INTERFACE_CHECKSUM_FAILURES
            .with_label_values(&label)
            .set(interface.checksum_failures as f64);
        INTERFACE_IO_ERRORS
            .with_label_values(&label)
            .set(interface.io_errors as f64);
    }
}

/// Replace the per-sensor series with the current statistics.
pub fn update_sensor_metrics(statistics: &BTreeMap<String, SensorStatistics>) {
    SENSOR_TEMPERATURE_AVG.reset();
    SENSOR_HUMIDITY_AVG.reset();
    SENSOR_PACKET_LOSS.reset();

    for (sensor_id, stats) in statistics {
        let label = [sensor_id.as_str()];
        if stats.valid_packets > 0 {
            SENSOR_TEMPERATURE_AVG
                .with_label_values(&label)
                .set(stats.avg_temperature);
            SENSOR_HUMIDITY_AVG
                .with_label_values(&label)
                .set(stats.avg_humidity);
        }
        SENSOR_PACKET_LOSS
            .with_label_values(&label)
            .set(stats.packet_loss_rate);
    }
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
