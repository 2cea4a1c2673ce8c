// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Edge analytics
//!
//! Least-squares trend over a sensor's temperature history. The x axis is the
//! position in the history, so the slope is in degrees C per reading, not per
//! second.

use parking_lot::Mutex;
use sensorbridge::now_ms;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Analysis kind stamped on trend results
pub const TREND_ANALYSIS: &str = "trend";

/// History length below which no analysis runs
pub const MIN_HISTORY: usize = 5;

/// |slope| above which a trend alert fires (C per reading)
pub const TREND_SLOPE_THRESHOLD: f64 = 0.5;

/// Current humidity above which a ventilation alert fires (%)
pub const HUMIDITY_ADVISORY: f64 = 70.0;

/// Results retained by [`EdgeResults`]
pub const RESULT_CAPACITY: usize = 100;

/// Output of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeAnalyticsResult {
    pub sensor_id: String,
    pub analysis_type: String,
    /// `temperature_trend_slope` (C per reading), `temperature_trend_intercept`,
    /// `temperature_current`, `humidity_current`
    pub metrics: BTreeMap<String, f64>,
    pub confidence: f64,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
    pub timestamp_ms: u64,
}

impl EdgeAnalyticsResult {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn slope(&self) -> Option<f64> {
        self.metric("temperature_trend_slope")
    }
}

/// Ordinary least squares over (index, value); `None` for fewer than two points
pub fn linear_fit(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let sum_x = n * (n - 1.0) / 2.0;
    let sum_y: f64 = values.iter().sum();
    let (sum_xy, sum_x2) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(xy, x2), (i, y)| {
            let x = i as f64;
            (xy + x * y, x2 + x * x)
        });

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Some((slope, intercept))
}

/// Trend analysis over `temperatures` (oldest first)
///
/// `None` when the history is shorter than [`MIN_HISTORY`]. The current
/// temperature is the newest history entry.
pub fn analyze_trend(
    sensor_id: &str,
    temperatures: &[f64],
    current_humidity: f64,
    data_confidence: f64,
) -> Option<EdgeAnalyticsResult> {
    if temperatures.len() < MIN_HISTORY {
        return None;
    }
    let (slope, intercept) = linear_fit(temperatures)?;
    let current = *temperatures.last()?;

    let mut metrics = BTreeMap::new();
    metrics.insert("temperature_trend_slope".to_string(), slope);
    metrics.insert("temperature_trend_intercept".to_string(), intercept);
    metrics.insert("temperature_current".to_string(), current);
    metrics.insert("humidity_current".to_string(), current_humidity);

    let mut alerts = Vec::new();
    let mut recommendations = Vec::new();
    if slope.abs() > TREND_SLOPE_THRESHOLD {
        if slope > 0.0 {
            alerts.push("Rising temperature trend detected".to_string());
            recommendations.push("Monitor for overheating".to_string());
        } else {
            alerts.push("Falling temperature trend detected".to_string());
            recommendations.push("Check heating system".to_string());
        }
    }
    if current_humidity > HUMIDITY_ADVISORY {
        alerts.push("High humidity detected".to_string());
        recommendations.push("Improve ventilation".to_string());
    }

    Some(EdgeAnalyticsResult {
        sensor_id: sensor_id.to_string(),
        analysis_type: TREND_ANALYSIS.to_string(),
        metrics,
        confidence: (data_confidence * temperatures.len() as f64 / 10.0).min(1.0),
        alerts,
        recommendations,
        timestamp_ms: now_ms(),
    })
}

/// Bounded ring of recent analysis results
#[derive(Debug)]
pub struct EdgeResults {
    results: Mutex<VecDeque<EdgeAnalyticsResult>>,
    capacity: usize,
}

impl Default for EdgeResults {
    fn default() -> Self {
        Self::with_capacity(RESULT_CAPACITY)
    }
}

impl EdgeResults {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Append a result, evicting the oldest beyond capacity
    pub fn push(&self, result: EdgeAnalyticsResult) {
        let mut results = self.results.lock();
        results.push_back(result);
        while results.len() > self.capacity {
            results.pop_front();
        }
    }

    /// The newest `count` results, oldest first
    pub fn recent(&self, count: usize) -> Vec<EdgeAnalyticsResult> {
        let results = self.results.lock();
        let skip = results.len().saturating_sub(count);
        results.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.results.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_fit_exact_line() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 + 0.25 * i as f64).collect();
        let (slope, intercept) = linear_fit(&values).unwrap();
        assert_relative_eq!(slope, 0.25, epsilon = 1e-9);
        assert_relative_eq!(intercept, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_linear_fit_degenerate() {
        assert!(linear_fit(&[]).is_none());
        assert!(linear_fit(&[1.0]).is_none());
    }

    #[test]
    fn test_rising_trend() {
        // 20.0, 20.8, ..., 27.2
        let temps: Vec<f64> = (0..10).map(|i| 20.0 + 0.8 * i as f64).collect();
        let result = analyze_trend("s1", &temps, 45.0, 0.95).unwrap();

        assert_eq!(result.analysis_type, "trend");
        assert_relative_eq!(result.slope().unwrap(), 0.8, epsilon = 1e-9);
        assert_relative_eq!(result.metric("temperature_current").unwrap(), 27.2, epsilon = 1e-9);
        assert_eq!(result.alerts, vec!["Rising temperature trend detected"]);
        assert_eq!(result.recommendations, vec!["Monitor for overheating"]);
        assert_relative_eq!(result.confidence, 0.95, epsilon = 1e-9);
    }

    #[test]
    fn test_falling_trend_and_humidity() {
        let temps = [30.0, 29.0, 28.0, 27.0, 26.0];
        let result = analyze_trend("s1", &temps, 75.0, 0.98).unwrap();
        assert_eq!(
            result.alerts,
            vec!["Falling temperature trend detected", "High humidity detected"]
        );
        assert_eq!(
            result.recommendations,
            vec!["Check heating system", "Improve ventilation"]
        );
        assert_relative_eq!(result.confidence, 0.49, epsilon = 1e-9);
    }

    #[test]
    fn test_flat_history_is_quiet() {
        let temps = [21.0, 21.2, 20.9, 21.1, 21.0, 21.05];
        let result = analyze_trend("s1", &temps, 50.0, 0.95).unwrap();
        assert!(result.alerts.is_empty());
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_short_history_skipped() {
        assert!(analyze_trend("s1", &[20.0, 21.0, 22.0, 23.0], 50.0, 1.0).is_none());
    }

    #[test]
    fn test_confidence_capped() {
        let temps = vec![20.0; 40];
        let result = analyze_trend("s1", &temps, 50.0, 0.95).unwrap();
        assert_relative_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_results_ring_evicts_oldest() {
        let ring = EdgeResults::with_capacity(3);
        let temps = [20.0; 5];
        for id in ["a", "b", "c", "d"] {
            ring.push(analyze_trend(id, &temps, 50.0, 1.0).unwrap());
        }
        assert_eq!(ring.len(), 3);
        let ids: Vec<String> = ring.recent(10).into_iter().map(|r| r.sensor_id).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
        let ids: Vec<String> = ring.recent(2).into_iter().map(|r| r.sensor_id).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn test_default_capacity() {
        let ring = EdgeResults::default();
        let temps = [20.0; 5];
        for _ in 0..150 {
            ring.push(analyze_trend("s", &temps, 50.0, 1.0).unwrap());
        }
        assert_eq!(ring.len(), RESULT_CAPACITY);
    }
}
