// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Windowed aggregation
//!
//! The [`Aggregator`] summarizes each sensor's readings over the trailing
//! window. Workers call [`Aggregator::try_claim`] after every reading; the
//! first caller after the window has elapsed runs the sweep.

use crate::registry::{SensorRegistry, WindowSlice};
use parking_lot::Mutex;
use sensorbridge::now_ms;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Average, minimum and maximum of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Average of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AverageSummary {
    pub avg: f64,
}

/// Per-sensor aggregate forwarded downstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub sensor_id: String,
    pub location: String,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    pub window_seconds: u64,
    pub sample_count: usize,
    pub valid_count: usize,
    pub temperature: RangeSummary,
    pub humidity: AverageSummary,
    pub pressure: AverageSummary,
    pub gateway_id: String,
}

impl AggregateMessage {
    pub const TYPE: &'static str = "aggregated_data";

    /// Summarize one window slice; `None` when it is empty
    pub fn from_slice(slice: &WindowSlice, window_seconds: u64, gateway_id: &str) -> Option<Self> {
        let first = slice.entries.first()?;
        let count = slice.entries.len() as f64;

        let mut min = first.temperature;
        let mut max = first.temperature;
        let (mut sum_temp, mut sum_hum, mut sum_press) = (0.0, 0.0, 0.0);
        for entry in &slice.entries {
            min = min.min(entry.temperature);
            max = max.max(entry.temperature);
            sum_temp += entry.temperature;
            sum_hum += entry.humidity;
            sum_press += entry.pressure;
        }

        Some(Self {
            message_type: Self::TYPE,
            sensor_id: slice.sensor_id.clone(),
            location: slice.location.clone(),
            timestamp: now_ms() / 1000,
            window_seconds,
            sample_count: slice.entries.len(),
            valid_count: slice.entries.len(),
            temperature: RangeSummary {
                avg: sum_temp / count,
                min,
                max,
            },
            humidity: AverageSummary {
                avg: sum_hum / count,
            },
            pressure: AverageSummary {
                avg: sum_press / count,
            },
            gateway_id: gateway_id.to_string(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Decides when a sweep is due and produces the aggregates
#[derive(Debug)]
pub struct Aggregator {
    window: Duration,
    last_run: Mutex<Instant>,
}

impl Aggregator {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    /// Aggregator whose first window starts at `start`
    pub fn starting_at(window: Duration, start: Instant) -> Self {
        Self {
            window,
            last_run: Mutex::new(start),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True for exactly one caller once the window has elapsed since the last run
    pub fn try_claim(&self, now: Instant) -> bool {
        let mut last_run = self.last_run.lock();
        if now.saturating_duration_since(*last_run) >= self.window {
            *last_run = now;
            true
        } else {
            false
        }
    }

    /// One aggregate per sensor with readings in the window ending at `now`
    pub fn collect(
        &self,
        registry: &SensorRegistry,
        gateway_id: &str,
        now: Instant,
    ) -> Vec<AggregateMessage> {
        let window_seconds = self.window.as_secs();
        registry
            .window(self.window, now)
            .iter()
            .filter_map(|slice| AggregateMessage::from_slice(slice, window_seconds, gateway_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sensorbridge::{Interface, Reading};

    fn record(registry: &SensorRegistry, id: &str, temp: f64, at: Instant) {
        let reading = Reading::new(id, Interface::Spi, temp, 40.0 + temp, 3.3)
            .with_location("SPI_Bus")
            .with_pressure(1000.0 + temp);
        registry.record_at(&reading, false, at);
    }

    #[test]
    fn test_try_claim_once_per_window() {
        let start = Instant::now();
        let aggregator = Aggregator::starting_at(Duration::from_secs(60), start);

        assert!(!aggregator.try_claim(start + Duration::from_secs(30)));
        assert!(aggregator.try_claim(start + Duration::from_secs(60)));
        assert!(!aggregator.try_claim(start + Duration::from_secs(61)));
        assert!(aggregator.try_claim(start + Duration::from_secs(125)));
    }

    #[test]
    fn test_collect_summarizes_window_only() {
        let registry = SensorRegistry::new(100);
        let start = Instant::now();
        let now = start + Duration::from_secs(100);

        record(&registry, "s1", 50.0, start);
        record(&registry, "s1", 20.0, now - Duration::from_secs(30));
        record(&registry, "s1", 24.0, now - Duration::from_secs(10));
        record(&registry, "idle", 22.0, start);

        let aggregator = Aggregator::starting_at(Duration::from_secs(60), start);
        let messages = aggregator.collect(&registry, "gw-1", now);
        assert_eq!(messages.len(), 1);

        let msg = &messages[0];
        assert_eq!(msg.sensor_id, "s1");
        assert_eq!(msg.location, "SPI_Bus");
        assert_eq!(msg.sample_count, 2);
        assert_eq!(msg.valid_count, 2);
        assert_eq!(msg.window_seconds, 60);
        assert_relative_eq!(msg.temperature.avg, 22.0);
        assert_relative_eq!(msg.temperature.min, 20.0);
        assert_relative_eq!(msg.temperature.max, 24.0);
        assert_relative_eq!(msg.humidity.avg, 62.0);
        assert_relative_eq!(msg.pressure.avg, 1022.0);
    }

    #[test]
    fn test_no_recent_readings_no_aggregate() {
        let registry = SensorRegistry::new(100);
        let start = Instant::now();
        record(&registry, "s1", 20.0, start);

        let aggregator = Aggregator::starting_at(Duration::from_secs(60), start);
        assert!(aggregator
            .collect(&registry, "gw", start + Duration::from_secs(61))
            .is_empty());
    }

    #[test]
    fn test_json_shape() {
        let registry = SensorRegistry::new(10);
        let now = Instant::now();
        record(&registry, "s1", 21.0, now);

        let aggregator = Aggregator::starting_at(Duration::from_secs(60), now);
        let msg = aggregator.collect(&registry, "gw-9", now).remove(0);
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "aggregated_data");
        assert_eq!(json["sensor_id"], "s1");
        assert_eq!(json["gateway_id"], "gw-9");
        assert_eq!(json["window_seconds"], 60);
        assert_eq!(json["temperature"]["max"], 21.0);
        assert!(json["humidity"]["avg"].is_number());
        assert!(json["pressure"]["avg"].is_number());
        assert!(json["timestamp"].as_u64().unwrap() > 1_600_000_000);
    }
}
