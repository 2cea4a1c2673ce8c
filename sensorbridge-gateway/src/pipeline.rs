// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Shared pipeline state and the per-reading processing path
//!
//! A [`Pipeline`] is shared between the reader callbacks (producers), the
//! worker pool (consumers) and the status thread. Readers call
//! [`Pipeline::ingest`]; workers call [`Pipeline::process`] for every entry
//! they pop.

use crate::aggregator::Aggregator;
use crate::alerts::{
    check_thresholds, offline_alert, packet_loss_alert, Alert, AlertThrottle, Thresholds,
};
use crate::analytics::{analyze_trend, EdgeResults, MIN_HISTORY};
use crate::config::GatewayConfig;
use crate::queue::{IngestionQueue, QueueEntry};
use crate::registry::SensorRegistry;
use crate::sink::Forwarder;
use crate::stats::SensorStatistics;
use log::{debug, info};
use sensorbridge::Reading;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Processing counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub processed: u64,
    pub valid: u64,
    pub invalid: u64,
    pub aggregates_sent: u64,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    processed: AtomicU64,
    valid: AtomicU64,
    invalid: AtomicU64,
    aggregates_sent: AtomicU64,
}

/// Everything the readers, workers and status thread share
pub struct Pipeline {
    pub queue: IngestionQueue,
    pub registry: SensorRegistry,
    pub edge_results: EdgeResults,
    pub aggregator: Aggregator,
    pub forwarder: Forwarder,
    throttle: AlertThrottle,
    thresholds: Thresholds,
    gateway_id: String,
    edge_analytics: bool,
    sensor_timeout: Duration,
    counters: PipelineCounters,
}

impl Pipeline {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            queue: IngestionQueue::new(config.max_queue_size),
            registry: SensorRegistry::new(config.max_sensor_history),
            edge_results: EdgeResults::default(),
            aggregator: Aggregator::new(config.aggregation_window()),
            forwarder: Forwarder::new(&config.gateway_id, &config.mqtt_base_topic),
            throttle: AlertThrottle::new(config.alert_throttle()),
            thresholds: Thresholds::from_config(config),
            gateway_id: config.gateway_id.clone(),
            edge_analytics: config.enable_edge_analytics,
            sensor_timeout: config.sensor_timeout(),
            counters: PipelineCounters::default(),
        }
    }

    /// Reader-side entry point; returns false when the reading was dropped
    pub fn ingest(&self, reading: Reading) -> bool {
        if reading.is_valid {
            self.forwarder.offer_thermal(&reading);
        }
        self.queue.push(QueueEntry::new(reading)).is_ok()
    }

    /// Run one queue entry through statistics, alerts, analytics and forwarding
    pub fn process(&self, entry: QueueEntry) {
        let reading = entry.reading;
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        if !reading.is_valid {
            self.counters.invalid.fetch_add(1, Ordering::Relaxed);
            let outcome = self.registry.record(&reading, false);
            debug!(
                "Invalid reading from {} ({} errors)",
                reading.sensor_id, outcome.stats.error_packets
            );
            self.check_packet_loss(&reading.sensor_id, &outcome.stats);
            return;
        }
        self.counters.valid.fetch_add(1, Ordering::Relaxed);

        let outcome = self.registry.record(&reading, self.edge_analytics);
        if outcome.reactivated {
            info!("Sensor {} back online", reading.sensor_id);
        }

        for alert in check_thresholds(&reading, &self.thresholds) {
            self.emit_alert(alert);
        }
        self.check_packet_loss(&reading.sensor_id, &outcome.stats);

        if let Some(temperatures) = outcome.temperatures.filter(|t| t.len() >= MIN_HISTORY) {
            if let Some(result) = analyze_trend(
                &reading.sensor_id,
                &temperatures,
                reading.humidity,
                reading.data_confidence,
            ) {
                debug!(
                    "Edge analysis for {}: slope {:.3}",
                    reading.sensor_id,
                    result.slope().unwrap_or_default()
                );
                self.edge_results.push(result);
            }
        }

        self.forwarder.forward_reading(&reading);

        let now = Instant::now();
        if self.aggregator.try_claim(now) {
            self.aggregate(now);
        }
    }

    /// Aggregate and forward every sensor with readings in the window ending at `now`
    ///
    /// Returns the number of aggregates forwarded.
    pub fn aggregate(&self, now: Instant) -> usize {
        let messages = self.aggregator.collect(&self.registry, &self.gateway_id, now);
        for message in &messages {
            self.forwarder.forward_aggregate(message);
        }
        self.counters
            .aggregates_sent
            .fetch_add(messages.len() as u64, Ordering::Relaxed);
        info!("Aggregated {} sensors", messages.len());
        messages.len()
    }

    /// Mark silent sensors offline and alert once per transition
    pub fn check_offline(&self, now: Instant) -> Vec<String> {
        if self.sensor_timeout.is_zero() {
            return Vec::new();
        }
        let offline = self.registry.mark_stale(self.sensor_timeout, now);
        for sensor_id in &offline {
            self.emit_alert(offline_alert(sensor_id, self.sensor_timeout));
        }
        offline
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            valid: self.counters.valid.load(Ordering::Relaxed),
            invalid: self.counters.invalid.load(Ordering::Relaxed),
            aggregates_sent: self.counters.aggregates_sent.load(Ordering::Relaxed),
        }
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// Forget all sensors, analysis results and throttle state
    pub fn clear(&self) {
        self.registry.clear();
        self.edge_results.clear();
        self.throttle.clear();
    }

    fn check_packet_loss(&self, sensor_id: &str, stats: &SensorStatistics) {
        if let Some(alert) = packet_loss_alert(sensor_id, stats, self.thresholds.packet_loss) {
            self.emit_alert(alert);
        }
    }

    fn emit_alert(&self, alert: Alert) {
        if self.throttle.allow(&alert) {
            self.forwarder.raise_alert(&alert);
        } else {
            debug!("Throttled alert for {}: {}", alert.sensor_id, alert.message);
        }
    }
}
