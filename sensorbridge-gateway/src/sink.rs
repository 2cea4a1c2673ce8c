// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Downstream sinks
//!
//! MQTT, WebSocket, alert and thermal consumers are plain callbacks supplied
//! by the embedding application. Forwarding is fire-and-forget: a failing
//! sink is logged and counted, never retried, and never stalls a worker.

use crate::aggregator::AggregateMessage;
use crate::alerts::{Alert, ALERT_CATEGORY};
use crate::error::ForwardingError;
use log::{debug, warn};
use parking_lot::RwLock;
use sensorbridge::Reading;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// `(topic, payload)`
pub type MqttCallback = Arc<dyn Fn(&str, &str) -> Result<(), ForwardingError> + Send + Sync>;
/// `(payload)`
pub type WebSocketCallback = Arc<dyn Fn(&str) -> Result<(), ForwardingError> + Send + Sync>;
/// `(category, "<sensor_id>: <message>", alert)`
pub type AlertCallback = Arc<dyn Fn(&str, &str, &Alert) + Send + Sync>;
/// `(sensor_id, temperature, humidity)`
pub type ThermalCallback = Arc<dyn Fn(&str, f64, f64) + Send + Sync>;

/// Topic for per-reading messages
pub fn data_topic(base: &str, sensor_id: &str) -> String {
    format!("{}/sensors/{}/data", base, sensor_id)
}

/// Topic for aggregates
pub fn aggregated_topic(base: &str, sensor_id: &str) -> String {
    format!("{}/sensors/{}/aggregated", base, sensor_id)
}

/// Per-reading JSON payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingMessage<'a> {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub message_type: Option<&'static str>,
    pub sensor_id: &'a str,
    pub location: &'a str,
    pub timestamp_ms: u64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub supply_voltage: f64,
    pub sensor_status: u8,
    pub interface: &'static str,
    pub signal_strength: f64,
    pub data_confidence: f64,
    pub gateway_id: &'a str,
}

impl<'a> ReadingMessage<'a> {
    /// Payload published on the data topic
    pub fn mqtt(reading: &'a Reading, gateway_id: &'a str) -> Self {
        Self {
            message_type: None,
            sensor_id: &reading.sensor_id,
            location: &reading.location,
            timestamp_ms: reading.timestamp_ms,
            temperature: reading.temperature,
            humidity: reading.humidity,
            pressure: reading.pressure,
            supply_voltage: reading.supply_voltage,
            sensor_status: reading.status.bits(),
            interface: reading.interface.as_str(),
            signal_strength: reading.signal_strength,
            data_confidence: reading.data_confidence,
            gateway_id,
        }
    }

    /// Payload pushed to WebSocket clients, tagged `"type": "sensor_data"`
    pub fn websocket(reading: &'a Reading, gateway_id: &'a str) -> Self {
        Self {
            message_type: Some("sensor_data"),
            ..Self::mqtt(reading, gateway_id)
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Callbacks registered by the embedding application
#[derive(Clone, Default)]
pub struct Sinks {
    pub mqtt: Option<MqttCallback>,
    pub websocket: Option<WebSocketCallback>,
    pub alert: Option<AlertCallback>,
    pub thermal: Option<ThermalCallback>,
}

/// Forwarding counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForwardStats {
    pub mqtt_messages: u64,
    pub websocket_messages: u64,
    pub forwarding_failures: u64,
    pub alerts_raised: u64,
}

#[derive(Debug, Default)]
struct ForwardCounters {
    mqtt_messages: AtomicU64,
    websocket_messages: AtomicU64,
    forwarding_failures: AtomicU64,
    alerts_raised: AtomicU64,
}

/// Formats messages and hands them to the registered sinks
pub struct Forwarder {
    sinks: RwLock<Sinks>,
    counters: ForwardCounters,
    gateway_id: String,
    base_topic: String,
}

impl Forwarder {
    pub fn new(gateway_id: impl Into<String>, base_topic: impl Into<String>) -> Self {
        Self {
            sinks: RwLock::new(Sinks::default()),
            counters: ForwardCounters::default(),
            gateway_id: gateway_id.into(),
            base_topic: base_topic.into(),
        }
    }

    /// Replace the registered sinks
    pub fn set_sinks(&self, sinks: Sinks) {
        *self.sinks.write() = sinks;
    }

    pub fn update_sinks(&self, update: impl FnOnce(&mut Sinks)) {
        update(&mut self.sinks.write());
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// Publish a reading to MQTT and WebSocket
    pub fn forward_reading(&self, reading: &Reading) {
        let sinks = self.sinks.read().clone();

        if let Some(mqtt) = &sinks.mqtt {
            let topic = data_topic(&self.base_topic, &reading.sensor_id);
            let payload = ReadingMessage::mqtt(reading, &self.gateway_id).to_json();
            self.send_mqtt(mqtt, &topic, payload);
        }
        if let Some(websocket) = &sinks.websocket {
            let payload = ReadingMessage::websocket(reading, &self.gateway_id).to_json();
            self.send_websocket(websocket, payload);
        }
    }

    /// Publish an aggregate to MQTT and WebSocket
    pub fn forward_aggregate(&self, message: &AggregateMessage) {
        let sinks = self.sinks.read().clone();
        let payload = message.to_json();

        if let Some(mqtt) = &sinks.mqtt {
            let topic = aggregated_topic(&self.base_topic, &message.sensor_id);
            self.send_mqtt(mqtt, &topic, message.to_json());
        }
        if let Some(websocket) = &sinks.websocket {
            self.send_websocket(websocket, payload);
        }
    }

    /// Route an alert to the alert callback
    pub fn raise_alert(&self, alert: &Alert) {
        self.counters.alerts_raised.fetch_add(1, Ordering::Relaxed);
        warn!("ALERT - {}", alert);
        let callback = self.sinks.read().alert.clone();
        if let Some(callback) = callback {
            callback(ALERT_CATEGORY, &alert.routed_text(), alert);
        }
    }

    /// Offer a valid reading to the thermal monitor
    pub fn offer_thermal(&self, reading: &Reading) {
        let callback = self.sinks.read().thermal.clone();
        if let Some(callback) = callback {
            callback(&reading.sensor_id, reading.temperature, reading.humidity);
        }
    }

    pub fn stats(&self) -> ForwardStats {
        ForwardStats {
            mqtt_messages: self.counters.mqtt_messages.load(Ordering::Relaxed),
            websocket_messages: self.counters.websocket_messages.load(Ordering::Relaxed),
            forwarding_failures: self.counters.forwarding_failures.load(Ordering::Relaxed),
            alerts_raised: self.counters.alerts_raised.load(Ordering::Relaxed),
        }
    }

    fn send_mqtt(&self, mqtt: &MqttCallback, topic: &str, payload: serde_json::Result<String>) {
        let result = payload
            .map_err(|e| ForwardingError::new("mqtt", e.to_string()))
            .and_then(|payload| mqtt(topic, &payload));
        match result {
            Ok(()) => {
                self.counters.mqtt_messages.fetch_add(1, Ordering::Relaxed);
                debug!("Published to {}", topic);
            }
            Err(e) => self.failed(e),
        }
    }

    fn send_websocket(&self, websocket: &WebSocketCallback, payload: serde_json::Result<String>) {
        let result = payload
            .map_err(|e| ForwardingError::new("websocket", e.to_string()))
            .and_then(|payload| websocket(&payload));
        match result {
            Ok(()) => {
                self.counters.websocket_messages.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.failed(e),
        }
    }

    fn failed(&self, error: ForwardingError) {
        self.counters.forwarding_failures.fetch_add(1, Ordering::Relaxed);
        warn!("{}", error);
    }
}
