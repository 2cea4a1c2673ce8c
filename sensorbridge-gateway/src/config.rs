// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for SensorBridge Gateway

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Gateway-level configuration
///
/// Missing fields take their default when loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identifier stamped on every forwarded message
    pub gateway_id: String,
    /// Site description
    pub location: String,

    /// UART device node
    pub uart_device: String,
    /// UART line speed
    pub uart_baud_rate: u32,
    /// UART poll interval in milliseconds
    pub uart_poll_interval_ms: u64,
    /// SPI device node
    pub spi_device: String,
    /// SPI clock in Hz
    pub spi_speed_hz: u32,
    /// SPI poll interval in milliseconds
    pub spi_poll_interval_ms: u64,
    /// I2C bus number
    pub i2c_bus: u8,
    /// I2C device addresses polled each cycle
    pub i2c_addresses: Vec<u8>,
    /// I2C cycle interval in milliseconds
    pub i2c_poll_interval_ms: u64,

    /// Prefix of every MQTT topic
    pub mqtt_base_topic: String,

    /// Trailing window covered by each aggregate (default: 60)
    pub aggregation_window_seconds: u64,
    /// Rolling history kept per sensor (default: 1000)
    pub max_sensor_history: usize,
    /// Run trend analysis on each valid reading
    pub enable_edge_analytics: bool,

    /// Alert below this temperature (C)
    pub temp_alert_low: f64,
    /// Alert above this temperature (C)
    pub temp_alert_high: f64,
    /// Alert above this humidity (%)
    pub humidity_alert_high: f64,
    /// Alert below this supply voltage (V)
    pub low_voltage_alert: f64,
    /// Alert when a sensor's loss rate exceeds this fraction
    pub packet_loss_alert_threshold: f64,
    /// Suppress repeats of the same alert per sensor for this long (0 disables)
    pub alert_throttle_seconds: u64,

    /// Ingestion queue capacity (default: 10000)
    pub max_queue_size: usize,
    /// Worker threads draining the queue (default: 4)
    pub worker_thread_count: usize,

    /// Mark a sensor offline after this long without an update
    pub sensor_timeout_seconds: u64,
    /// Period of the status thread
    pub status_interval_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_id: "sensorbridge_001".to_string(),
            location: "Unknown".to_string(),
            uart_device: "/dev/ttyAMA0".to_string(),
            uart_baud_rate: 115_200,
            uart_poll_interval_ms: 10,
            spi_device: "/dev/spidev0.0".to_string(),
            spi_speed_hz: 1_000_000,
            spi_poll_interval_ms: 500,
            i2c_bus: 1,
            i2c_addresses: vec![0x76, 0x77, 0x44, 0x45],
            i2c_poll_interval_ms: 1000,
            mqtt_base_topic: "gateway".to_string(),
            aggregation_window_seconds: 60,
            max_sensor_history: 1000,
            enable_edge_analytics: true,
            temp_alert_low: 10.0,
            temp_alert_high: 35.0,
            humidity_alert_high: 80.0,
            low_voltage_alert: 3.0,
            packet_loss_alert_threshold: 0.1,
            alert_throttle_seconds: 0,
            max_queue_size: 10_000,
            worker_thread_count: 4,
            sensor_timeout_seconds: 300,
            status_interval_seconds: 30,
        }
    }
}

/// Deployment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Home,
    Industrial,
    Agricultural,
    EdgeAi,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Home,
        Preset::Industrial,
        Preset::Agricultural,
        Preset::EdgeAi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Home => "home",
            Preset::Industrial => "industrial",
            Preset::Agricultural => "agricultural",
            Preset::EdgeAi => "edge_ai",
        }
    }
}

impl FromStr for Preset {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| GatewayError::InvalidConfig(format!("unknown preset '{}'", s)))
    }
}

impl GatewayConfig {
    /// Default configuration with a specific gateway id
    pub fn with_gateway_id(gateway_id: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            ..Default::default()
        }
    }

    /// Configuration for a deployment preset
    pub fn preset(preset: Preset, gateway_id: impl Into<String>) -> Self {
        let base = Self::with_gateway_id(gateway_id);
        match preset {
            Preset::Home => Self {
                location: "Home".to_string(),
                aggregation_window_seconds: 300,
                temp_alert_low: 15.0,
                temp_alert_high: 30.0,
                humidity_alert_high: 70.0,
                i2c_addresses: vec![0x76, 0x77, 0x44, 0x45],
                ..base
            },
            Preset::Industrial => Self {
                location: "Industrial".to_string(),
                aggregation_window_seconds: 60,
                worker_thread_count: 8,
                temp_alert_low: 5.0,
                temp_alert_high: 40.0,
                humidity_alert_high: 80.0,
                i2c_addresses: vec![0x76, 0x77, 0x44, 0x45, 0x48, 0x49],
                ..base
            },
            Preset::Agricultural => Self {
                location: "Agricultural".to_string(),
                aggregation_window_seconds: 600,
                temp_alert_low: 0.0,
                temp_alert_high: 45.0,
                humidity_alert_high: 95.0,
                i2c_addresses: vec![0x76, 0x77, 0x44, 0x45],
                ..base
            },
            Preset::EdgeAi => Self {
                location: "EdgeAI".to_string(),
                aggregation_window_seconds: 10,
                worker_thread_count: 16,
                enable_edge_analytics: true,
                max_sensor_history: 5000,
                temp_alert_low: -20.0,
                temp_alert_high: 85.0,
                humidity_alert_high: 100.0,
                i2c_addresses: vec![0x76, 0x77, 0x44, 0x45, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D],
                ..base
            },
        }
    }

    /// Parse a JSON document and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.gateway_id.trim().is_empty() {
            return Err(invalid("gateway_id must not be empty"));
        }
        if self.mqtt_base_topic.trim().is_empty() {
            return Err(invalid("mqtt_base_topic must not be empty"));
        }
        if self.worker_thread_count == 0 {
            return Err(invalid("worker_thread_count must be at least 1"));
        }
        if self.max_queue_size == 0 {
            return Err(invalid("max_queue_size must be at least 1"));
        }
        if self.max_sensor_history == 0 {
            return Err(invalid("max_sensor_history must be at least 1"));
        }
        if self.aggregation_window_seconds == 0 {
            return Err(invalid("aggregation_window_seconds must be at least 1"));
        }
        if self.status_interval_seconds == 0 {
            return Err(invalid("status_interval_seconds must be at least 1"));
        }
        if self.temp_alert_low >= self.temp_alert_high {
            return Err(invalid(&format!(
                "temp_alert_low ({}) must be below temp_alert_high ({})",
                self.temp_alert_low, self.temp_alert_high
            )));
        }
        if !(0.0..=100.0).contains(&self.humidity_alert_high) {
            return Err(invalid("humidity_alert_high must be within [0, 100]"));
        }
        if !(0.0..=1.0).contains(&self.packet_loss_alert_threshold) {
            return Err(invalid("packet_loss_alert_threshold must be within [0, 1]"));
        }
        Ok(())
    }

    pub fn aggregation_window(&self) -> Duration {
        Duration::from_secs(self.aggregation_window_seconds)
    }

    pub fn alert_throttle(&self) -> Duration {
        Duration::from_secs(self.alert_throttle_seconds)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_secs(self.sensor_timeout_seconds)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_seconds)
    }
}

fn invalid(msg: &str) -> GatewayError {
    GatewayError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.worker_thread_count, 4);
        assert_eq!(config.max_queue_size, 10_000);
        assert_eq!(config.max_sensor_history, 1000);
        assert_eq!(config.aggregation_window_seconds, 60);
        assert_eq!(config.mqtt_base_topic, "gateway");
        assert_eq!(config.alert_throttle_seconds, 0);
        assert!(config.enable_edge_analytics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let home = GatewayConfig::preset(Preset::Home, "gw-home");
        assert_eq!(home.gateway_id, "gw-home");
        assert_eq!(home.aggregation_window_seconds, 300);
        assert_eq!(home.humidity_alert_high, 70.0);

        let industrial = GatewayConfig::preset(Preset::Industrial, "gw");
        assert_eq!(industrial.worker_thread_count, 8);
        assert_eq!(industrial.i2c_addresses.len(), 6);

        let edge = GatewayConfig::preset(Preset::EdgeAi, "gw");
        assert_eq!(edge.worker_thread_count, 16);
        assert_eq!(edge.max_sensor_history, 5000);
        assert_eq!(edge.i2c_addresses.len(), 10);

        for preset in Preset::ALL {
            assert!(GatewayConfig::preset(preset, "gw").validate().is_ok());
        }
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("edge_ai".parse::<Preset>().unwrap(), Preset::EdgeAi);
        assert_eq!("agricultural".parse::<Preset>().unwrap(), Preset::Agricultural);
        assert!(matches!(
            "warehouse".parse::<Preset>(),
            Err(GatewayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GatewayConfig::from_json_str(
            r#"{"gateway_id": "lab-7", "worker_thread_count": 2, "temp_alert_high": 28.5}"#,
        )
        .unwrap();
        assert_eq!(config.gateway_id, "lab-7");
        assert_eq!(config.worker_thread_count, 2);
        assert_eq!(config.temp_alert_high, 28.5);
        assert_eq!(config.max_queue_size, 10_000);
    }

    #[test]
    fn test_json_rejected_by_validation() {
        let err = GatewayConfig::from_json_str(r#"{"worker_thread_count": 0}"#).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));

        let err =
            GatewayConfig::from_json_str(r#"{"temp_alert_low": 30, "temp_alert_high": 20}"#)
                .unwrap_err();
        assert!(err.to_string().contains("temp_alert_low"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            GatewayConfig::from_json_str("{ not json"),
            Err(GatewayError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let original = GatewayConfig::preset(Preset::Agricultural, "farm-3");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(original.to_json().unwrap().as_bytes())
            .unwrap();

        let loaded = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            GatewayConfig::from_file("/nonexistent/sensorbridge.json"),
            Err(GatewayError::ConfigIo(_))
        ));
    }
}
