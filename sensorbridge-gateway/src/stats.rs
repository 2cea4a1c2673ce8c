// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Running per-sensor statistics

use serde::Serialize;

/// Counters and running temperature/humidity figures for one sensor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorStatistics {
    pub total_packets: u64,
    pub valid_packets: u64,
    pub error_packets: u64,
    /// error_packets / total_packets
    pub packet_loss_rate: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub avg_temperature: f64,
    pub avg_humidity: f64,
    /// Distance of the latest valid temperature from the running average
    pub temperature_deviation: f64,
    /// Sample standard deviation of all valid temperatures
    pub temperature_stddev: f64,
    /// Wall-clock time of the latest valid reading (ms since epoch)
    pub last_update_ms: u64,
    #[serde(skip)]
    m2: f64,
}

impl SensorStatistics {
    /// Fold in a valid reading
    pub fn record_valid(&mut self, temperature: f64, humidity: f64, timestamp_ms: u64) {
        self.total_packets += 1;
        self.valid_packets += 1;

        if self.valid_packets == 1 {
            self.min_temperature = temperature;
            self.max_temperature = temperature;
        } else {
            self.min_temperature = self.min_temperature.min(temperature);
            self.max_temperature = self.max_temperature.max(temperature);
        }

        let n = self.valid_packets as f64;
        let delta = temperature - self.avg_temperature;
        self.avg_temperature += delta / n;
        self.avg_humidity += (humidity - self.avg_humidity) / n;

        // Welford
        self.m2 += delta * (temperature - self.avg_temperature);
        self.temperature_stddev = if self.valid_packets > 1 {
            (self.m2 / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        self.temperature_deviation = (temperature - self.avg_temperature).abs();

        self.last_update_ms = timestamp_ms;
        self.update_loss_rate();
    }

    /// Count a reading that failed validation
    pub fn record_error(&mut self) {
        self.total_packets += 1;
        self.error_packets += 1;
        self.update_loss_rate();
    }

    fn update_loss_rate(&mut self) {
        self.packet_loss_rate = if self.total_packets == 0 {
            0.0
        } else {
            self.error_packets as f64 / self.total_packets as f64
        };
    }
}
