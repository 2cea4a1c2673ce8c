// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Status snapshots and the periodic status thread

use crate::error::{GatewayError, Result};
use crate::gateway::GatewayState;
use log::debug;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One transport reader as seen by the status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceStatus {
    pub name: String,
    pub active: bool,
    pub bytes_read: u64,
    pub readings: u64,
    pub invalid: u64,
    pub checksum_failures: u64,
    pub io_errors: u64,
}

/// Point-in-time view of the whole gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayStatus {
    pub gateway_id: String,
    pub location: String,
    pub state: GatewayState,
    pub uptime_seconds: u64,
    pub interfaces: Vec<InterfaceStatus>,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub queue_dropped: u64,
    pub processed: u64,
    pub valid: u64,
    pub invalid: u64,
    pub aggregates_sent: u64,
    pub mqtt_messages: u64,
    pub websocket_messages: u64,
    pub forwarding_failures: u64,
    pub alerts_raised: u64,
    pub known_sensors: usize,
    pub active_sensors: usize,
    pub edge_results: usize,
    /// Processed readings per second of uptime
    pub throughput_per_second: f64,
}

impl GatewayStatus {
    /// Single-line summary for the status log
    pub fn summary(&self) -> String {
        let interfaces: Vec<String> = self
            .interfaces
            .iter()
            .map(|i| format!("{}={}", i.name, if i.active { "up" } else { "down" }))
            .collect();
        format!(
            "{} [{}] up {}s | {} | queue {}/{} (dropped {}) | processed {} ({} invalid) | \
             sensors {}/{} active | mqtt {} ws {} failed {} | alerts {} | {:.1} msg/s",
            self.gateway_id,
            self.state,
            self.uptime_seconds,
            interfaces.join(" "),
            self.queue_depth,
            self.queue_capacity,
            self.queue_dropped,
            self.processed,
            self.invalid,
            self.active_sensors,
            self.known_sensors,
            self.mqtt_messages,
            self.websocket_messages,
            self.forwarding_failures,
            self.alerts_raised,
            self.throughput_per_second,
        )
    }
}

type StopSignal = Arc<(Mutex<bool>, Condvar)>;

/// Background thread running a tick every interval until stopped
pub struct StatusMonitor {
    signal: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl StatusMonitor {
    /// Spawn the thread; the first tick runs one `interval` after spawning
    pub fn spawn<F>(interval: Duration, tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let signal: StopSignal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("sb-status".to_string())
            .spawn(move || run(thread_signal, interval, tick))
            .map_err(|e| GatewayError::ThreadSpawn {
                name: "sb-status".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Wake the thread and wait for it to exit
    pub fn stop(&mut self) {
        {
            let (stopped, wake) = &*self.signal;
            *stopped.lock() = true;
            wake.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<F: FnMut()>(signal: StopSignal, interval: Duration, mut tick: F) {
    let (stopped, wake) = &*signal;
    loop {
        {
            let mut stopped = stopped.lock();
            if !*stopped {
                wake.wait_for(&mut stopped, interval);
            }
            if *stopped {
                break;
            }
        }
        tick();
    }
    debug!("Status thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn status() -> GatewayStatus {
        GatewayStatus {
            gateway_id: "gw-1".to_string(),
            location: "Lab".to_string(),
            state: GatewayState::Running,
            uptime_seconds: 12,
            interfaces: vec![InterfaceStatus {
                name: "UART".to_string(),
                active: true,
                bytes_read: 140,
                readings: 10,
                invalid: 1,
                checksum_failures: 0,
                io_errors: 0,
            }],
            queue_depth: 3,
            queue_capacity: 100,
            queue_dropped: 0,
            processed: 7,
            valid: 6,
            invalid: 1,
            aggregates_sent: 0,
            mqtt_messages: 6,
            websocket_messages: 0,
            forwarding_failures: 0,
            alerts_raised: 2,
            known_sensors: 2,
            active_sensors: 2,
            edge_results: 0,
            throughput_per_second: 0.58,
        }
    }

    #[test]
    fn test_summary_mentions_key_counters() {
        let line = status().summary();
        assert!(line.starts_with("gw-1 [running]"));
        assert!(line.contains("UART=up"));
        assert!(line.contains("queue 3/100"));
        assert!(line.contains("alerts 2"));
    }

    #[test]
    fn test_status_json() {
        let json = serde_json::to_value(status()).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["interfaces"][0]["name"], "UART");
        assert_eq!(json["queue_capacity"], 100);
    }

    #[test]
    fn test_monitor_ticks_and_stops_promptly() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut monitor = StatusMonitor::spawn(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        monitor.stop();
        assert!(!monitor.is_running());
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_long_interval_does_not_delay_stop() {
        let mut monitor = StatusMonitor::spawn(Duration::from_secs(3600), || {}).unwrap();
        let started = Instant::now();
        monitor.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
