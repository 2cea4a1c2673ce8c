// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fixed-size worker pool draining the ingestion queue

use crate::error::{GatewayError, Result};
use crate::pipeline::Pipeline;
use log::{debug, error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// N long-lived workers started and joined together
pub struct WorkerPool {
    size: usize,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            handles: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Spawn every worker; on failure the ones already running are shut down
    pub fn start(&mut self, pipeline: &Arc<Pipeline>) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        for index in 0..self.size {
            let worker_pipeline = Arc::clone(pipeline);
            let name = format!("sb-worker-{}", index);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || run(index, worker_pipeline));
            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    self.shutdown(pipeline);
                    return Err(GatewayError::ThreadSpawn {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!("Started {} workers", self.size);
        Ok(())
    }

    /// Wake every worker and wait for all of them to exit
    pub fn shutdown(&mut self, pipeline: &Pipeline) {
        pipeline.queue.shutdown();
        self.join();
    }

    fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

fn run(index: usize, pipeline: Arc<Pipeline>) {
    debug!("Worker {} running", index);
    while let Some(entry) = pipeline.queue.pop() {
        pipeline.process(entry);
    }
    debug!("Worker {} exiting", index);
}
