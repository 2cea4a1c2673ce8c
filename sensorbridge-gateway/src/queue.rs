// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded ingestion queue shared by readers and workers
//!
//! Producers never block: a push on a full queue drops the new entry and
//! counts it. Consumers block in [`IngestionQueue::pop`] until an entry
//! arrives or the queue is shut down.

use crate::error::QueueFull;
use log::warn;
use parking_lot::{Condvar, Mutex};
use sensorbridge::Reading;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// One reading in flight between a reader and a worker
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub reading: Reading,
    pub enqueued_at: Instant,
}

impl QueueEntry {
    pub fn new(reading: Reading) -> Self {
        Self {
            reading,
            enqueued_at: Instant::now(),
        }
    }

    pub fn sensor_id(&self) -> &str {
        &self.reading.sensor_id
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    shutdown: bool,
}

/// Queue counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    pub pushed: u64,
    pub dropped: u64,
}

/// Bounded multi-producer multi-consumer FIFO
#[derive(Debug)]
pub struct IngestionQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl IngestionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            capacity: capacity.max(1),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an entry, dropping it when the queue is full or shut down
    pub fn push(&self, entry: QueueEntry) -> Result<(), QueueFull> {
        let mut state = self.state.lock();
        if state.shutdown || state.entries.len() >= self.capacity {
            drop(state);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let err = QueueFull {
                capacity: self.capacity,
                sensor_id: entry.reading.sensor_id,
            };
            warn!("{}", err);
            return Err(err);
        }
        state.entries.push_back(entry);
        drop(state);

        self.pushed.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        Ok(())
    }

    /// Block until an entry is available; `None` once shut down
    ///
    /// Entries still queued at shutdown are left in place.
    pub fn pop(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(entry) = state.entries.pop_front() {
                return Some(entry);
            }
            self.available.wait(&mut state);
        }
    }

    /// Wake every blocked consumer and refuse further entries
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.available.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            capacity: self.capacity,
            pushed: self.pushed.load(Ordering::Relaxed),
            dropped: self.dropped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorbridge::Interface;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn entry(id: &str) -> QueueEntry {
        QueueEntry::new(Reading::new(id, Interface::Uart, 20.0, 50.0, 3.3))
    }

    #[test]
    fn test_fifo_order() {
        let queue = IngestionQueue::new(8);
        for id in ["a", "b", "c"] {
            queue.push(entry(id)).unwrap();
        }
        let ids: Vec<String> = (0..3)
            .filter_map(|_| queue.pop())
            .map(|e| e.reading.sensor_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let queue = IngestionQueue::new(2);
        queue.push(entry("first")).unwrap();
        queue.push(entry("second")).unwrap();
        let err = queue.push(entry("third")).unwrap_err();
        assert_eq!(err.sensor_id, "third");
        assert_eq!(err.capacity, 2);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop().unwrap().sensor_id(), "first");
        assert_eq!(queue.pop().unwrap().sensor_id(), "second");
    }

    #[test]
    fn test_depth_never_exceeds_capacity_under_contention() {
        let queue = Arc::new(IngestionQueue::new(50));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..100 {
                        let _ = queue.push(entry(&format!("p{}_{}", p, i)));
                        assert!(queue.len() <= 50);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let stats = queue.stats();
        assert_eq!(stats.depth, 50);
        assert_eq!(stats.pushed, 50);
        assert_eq!(stats.dropped, 350);
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(IngestionQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop().map(|e| e.reading.sensor_id))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(entry("late")).unwrap();
        assert_eq!(consumer.join().unwrap().as_deref(), Some("late"));
    }

    #[test]
    fn test_shutdown_wakes_all_consumers() {
        let queue = Arc::new(IngestionQueue::new(4));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop().is_none())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        queue.shutdown();
        for c in consumers {
            assert!(c.join().unwrap());
        }
        assert!(queue.push(entry("after")).is_err());
    }
}
