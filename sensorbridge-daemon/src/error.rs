// SensorBridge Daemon - Error types
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

use sensorbridge_gateway::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics encoding failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Metrics output is not UTF-8: {0}")]
    MetricsUtf8(#[from] std::string::FromUtf8Error),

    #[cfg(not(feature = "simulation"))]
    #[error("Simulation requested but the daemon was built without the `simulation` feature")]
    SimulationUnavailable,
}

pub type Result<T> = std::result::Result<T, DaemonError>;
