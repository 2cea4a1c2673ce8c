// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Threshold alerts and alert throttling

use crate::config::GatewayConfig;
use crate::stats::SensorStatistics;
use parking_lot::Mutex;
use sensorbridge::{now_ms, Reading};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Category string handed to the alert callback
pub const ALERT_CATEGORY: &str = "SENSOR_ALERT";

/// Minimum frames seen before a loss-rate alert can fire
pub const PACKET_LOSS_MIN_FRAMES: u64 = 10;

/// What triggered an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlertKind {
    TemperatureLow,
    TemperatureHigh,
    HumidityHigh,
    LowVoltage,
    SensorFault,
    CommunicationFault,
    PacketLoss,
    SensorOffline,
}

/// A single alert about one sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub sensor_id: String,
    pub kind: AlertKind,
    pub message: String,
    pub timestamp_ms: u64,
}

impl Alert {
    pub fn new(sensor_id: impl Into<String>, kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            kind,
            message: message.into(),
            timestamp_ms: now_ms(),
        }
    }

    /// `"<sensor_id>: <message>"`, the text routed to the alert callback
    pub fn routed_text(&self) -> String {
        format!("{}: {}", self.sensor_id, self.message)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sensor_id, self.message)
    }
}

/// Bounds checked against every valid reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub temp_low: f64,
    pub temp_high: f64,
    pub humidity_high: f64,
    pub low_voltage: f64,
    pub packet_loss: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

impl Thresholds {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            temp_low: config.temp_alert_low,
            temp_high: config.temp_alert_high,
            humidity_high: config.humidity_alert_high,
            low_voltage: config.low_voltage_alert,
            packet_loss: config.packet_loss_alert_threshold,
        }
    }
}

/// Every alert a reading triggers, in a fixed order
pub fn check_thresholds(reading: &Reading, thresholds: &Thresholds) -> Vec<Alert> {
    let id = reading.sensor_id.as_str();
    let mut alerts = Vec::new();

    if reading.temperature < thresholds.temp_low {
        alerts.push(Alert::new(
            id,
            AlertKind::TemperatureLow,
            format!("Temperature too low: {:.2}°C", reading.temperature),
        ));
    }
    if reading.temperature > thresholds.temp_high {
        alerts.push(Alert::new(
            id,
            AlertKind::TemperatureHigh,
            format!("Temperature too high: {:.2}°C", reading.temperature),
        ));
    }
    if reading.humidity > thresholds.humidity_high {
        alerts.push(Alert::new(
            id,
            AlertKind::HumidityHigh,
            format!("Humidity too high: {:.2}%", reading.humidity),
        ));
    }
    if reading.supply_voltage < thresholds.low_voltage {
        alerts.push(Alert::new(
            id,
            AlertKind::LowVoltage,
            format!("Low battery voltage: {:.2}V", reading.supply_voltage),
        ));
    }
    if reading.status.sensor_fault() {
        alerts.push(Alert::new(id, AlertKind::SensorFault, "Sensor fault detected"));
    }
    if reading.status.comm_fault() {
        alerts.push(Alert::new(
            id,
            AlertKind::CommunicationFault,
            "Communication fault",
        ));
    }

    alerts
}

/// Loss-rate alert once enough frames have been seen
pub fn packet_loss_alert(
    sensor_id: &str,
    stats: &SensorStatistics,
    threshold: f64,
) -> Option<Alert> {
    if stats.total_packets < PACKET_LOSS_MIN_FRAMES || stats.packet_loss_rate <= threshold {
        return None;
    }
    Some(Alert::new(
        sensor_id,
        AlertKind::PacketLoss,
        format!(
            "High packet loss: {:.1}% of {} frames",
            stats.packet_loss_rate * 100.0,
            stats.total_packets
        ),
    ))
}

/// Alert for a sensor that stopped reporting
pub fn offline_alert(sensor_id: &str, silent_for: Duration) -> Alert {
    Alert::new(
        sensor_id,
        AlertKind::SensorOffline,
        format!("Sensor offline: no data for {}s", silent_for.as_secs()),
    )
}

/// Suppresses repeats of the same alert kind for the same sensor
#[derive(Debug)]
pub struct AlertThrottle {
    window: Duration,
    last_sent: Mutex<HashMap<(String, AlertKind), Instant>>,
}

impl AlertThrottle {
    /// A zero window lets every alert through
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `alert` may be emitted now; records it when allowed
    pub fn allow(&self, alert: &Alert) -> bool {
        self.allow_at(alert, Instant::now())
    }

    pub fn allow_at(&self, alert: &Alert, now: Instant) -> bool {
        if self.window.is_zero() {
            return true;
        }
        let mut last_sent = self.last_sent.lock();
        let key = (alert.sensor_id.clone(), alert.kind);
        match last_sent.get(&key) {
            Some(sent) if now.saturating_duration_since(*sent) < self.window => false,
            _ => {
                last_sent.insert(key, now);
                true
            }
        }
    }

    pub fn clear(&self) {
        self.last_sent.lock().clear();
    }
}
