// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor registry
//!
//! Maps sensor identities to their rolling history and running statistics.
//! Every mutation goes through one exclusive lock; callers copy out what they
//! need and do further work (analytics, forwarding) after releasing it.

use crate::stats::SensorStatistics;
use parking_lot::Mutex;
use sensorbridge::{Interface, Reading};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

/// One valid reading kept in a sensor's rolling history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub supply_voltage: f64,
    pub timestamp_ms: u64,
    pub recorded_at: Instant,
}

/// Everything the gateway knows about one sensor
#[derive(Debug, Clone)]
pub struct SensorRecord {
    pub sensor_id: String,
    pub location: String,
    pub interface: Interface,
    pub last_temperature: f64,
    pub last_humidity: f64,
    pub last_pressure: f64,
    pub last_voltage: f64,
    pub last_update_ms: u64,
    pub last_seen: Instant,
    pub is_active: bool,
    pub stats: SensorStatistics,
    history: VecDeque<HistoryEntry>,
}

impl SensorRecord {
    fn new(reading: &Reading, now: Instant) -> Self {
        Self {
            sensor_id: reading.sensor_id.clone(),
            location: reading.location.clone(),
            interface: reading.interface,
            last_temperature: 0.0,
            last_humidity: 0.0,
            last_pressure: 0.0,
            last_voltage: 0.0,
            last_update_ms: 0,
            last_seen: now,
            is_active: true,
            stats: SensorStatistics::default(),
            history: VecDeque::new(),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

/// What a worker needs after recording a reading
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// Statistics after the update
    pub stats: SensorStatistics,
    /// Rolling history length after the update
    pub history_len: usize,
    /// Temperature history (oldest first), when requested and the reading was valid
    pub temperatures: Option<Vec<f64>>,
    /// The sensor was offline and this reading brought it back
    pub reactivated: bool,
}

/// Readings of one sensor inside an aggregation window
#[derive(Debug, Clone)]
pub struct WindowSlice {
    pub sensor_id: String,
    pub location: String,
    pub entries: Vec<HistoryEntry>,
}

/// Concurrent map of sensor records
#[derive(Debug)]
pub struct SensorRegistry {
    sensors: Mutex<HashMap<String, SensorRecord>>,
    history_capacity: usize,
}

impl SensorRegistry {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            sensors: Mutex::new(HashMap::new()),
            history_capacity: history_capacity.max(1),
        }
    }

    /// Apply a reading, creating the record on first sight
    ///
    /// Invalid readings only bump the total and error counters.
    pub fn record(&self, reading: &Reading, copy_history: bool) -> RecordOutcome {
        self.record_at(reading, copy_history, Instant::now())
    }

    /// [`record`](Self::record) with an explicit arrival instant
    pub fn record_at(&self, reading: &Reading, copy_history: bool, now: Instant) -> RecordOutcome {
        let mut sensors = self.sensors.lock();
        let record = sensors
            .entry(reading.sensor_id.clone())
            .or_insert_with(|| SensorRecord::new(reading, now));

        if !reading.is_valid {
            record.stats.record_error();
            return RecordOutcome {
                stats: record.stats.clone(),
                history_len: record.history.len(),
                temperatures: None,
                reactivated: false,
            };
        }

        record.stats.record_valid(reading.temperature, reading.humidity, reading.timestamp_ms);
        record.last_temperature = reading.temperature;
        record.last_humidity = reading.humidity;
        record.last_pressure = reading.pressure;
        record.last_voltage = reading.supply_voltage;
        record.last_update_ms = reading.timestamp_ms;
        record.last_seen = now;
        let reactivated = !record.is_active;
        record.is_active = true;

        record.history.push_back(HistoryEntry {
            temperature: reading.temperature,
            humidity: reading.humidity,
            pressure: reading.pressure,
            supply_voltage: reading.supply_voltage,
            timestamp_ms: reading.timestamp_ms,
            recorded_at: now,
        });
        while record.history.len() > self.history_capacity {
            record.history.pop_front();
        }

        RecordOutcome {
            stats: record.stats.clone(),
            history_len: record.history.len(),
            temperatures: copy_history
                .then(|| record.history.iter().map(|h| h.temperature).collect()),
            reactivated,
        }
    }

    pub fn statistics(&self, sensor_id: &str) -> Option<SensorStatistics> {
        self.sensors.lock().get(sensor_id).map(|r| r.stats.clone())
    }

    /// Statistics for every known sensor, ordered by id
    pub fn all_statistics(&self) -> BTreeMap<String, SensorStatistics> {
        self.sensors
            .lock()
            .iter()
            .map(|(id, r)| (id.clone(), r.stats.clone()))
            .collect()
    }

    /// Copy of a full sensor record
    pub fn snapshot(&self, sensor_id: &str) -> Option<SensorRecord> {
        self.sensors.lock().get(sensor_id).cloned()
    }

    pub fn temperature_history(&self, sensor_id: &str) -> Vec<f64> {
        self.sensors
            .lock()
            .get(sensor_id)
            .map(|r| r.history.iter().map(|h| h.temperature).collect())
            .unwrap_or_default()
    }

    /// History entries recorded within `window` before `now`, per sensor
    ///
    /// Sensors with nothing in the window are left out.
    pub fn window(&self, window: Duration, now: Instant) -> Vec<WindowSlice> {
        let sensors = self.sensors.lock();
        let mut slices: Vec<WindowSlice> = sensors
            .values()
            .filter_map(|record| {
                let entries: Vec<HistoryEntry> = record
                    .history
                    .iter()
                    .filter(|h| now.saturating_duration_since(h.recorded_at) <= window)
                    .cloned()
                    .collect();
                (!entries.is_empty()).then(|| WindowSlice {
                    sensor_id: record.sensor_id.clone(),
                    location: record.location.clone(),
                    entries,
                })
            })
            .collect();
        slices.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        slices
    }

    /// Mark sensors silent for longer than `timeout` inactive
    ///
    /// Returns the ids that went offline in this sweep.
    pub fn mark_stale(&self, timeout: Duration, now: Instant) -> Vec<String> {
        let mut sensors = self.sensors.lock();
        let mut offline: Vec<String> = sensors
            .values_mut()
            .filter(|r| r.is_active && now.saturating_duration_since(r.last_seen) > timeout)
            .map(|r| {
                r.is_active = false;
                r.sensor_id.clone()
            })
            .collect();
        offline.sort();
        offline
    }

    pub fn active_count(&self) -> usize {
        self.sensors.lock().values().filter(|r| r.is_active).count()
    }

    pub fn len(&self) -> usize {
        self.sensors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every sensor
    pub fn clear(&self) {
        self.sensors.lock().clear();
    }
}
