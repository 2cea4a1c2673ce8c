// SensorBridge Gateway - Ingestion pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for SensorBridge Gateway

use thiserror::Error;

/// Main error type for Gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Operation requires `initialize` first
    #[error("Gateway not initialized")]
    NotInitialized,

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid gateway state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport reader failure
    #[error("Transport error: {0}")]
    Transport(#[from] sensorbridge::TransportError),

    /// Worker or status thread could not be spawned
    #[error("Failed to spawn thread {name}: {reason}")]
    ThreadSpawn { name: String, reason: String },

    /// Configuration file could not be read
    #[error("Config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Configuration file is not valid JSON
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result type alias for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Returned by the ingestion queue when an entry is dropped
///
/// Never propagated to producers; readers only see a `false` from `push`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Ingestion queue full ({capacity} entries), reading from {sensor_id} dropped")]
pub struct QueueFull {
    pub capacity: usize,
    pub sensor_id: String,
}

/// A downstream sink rejected a message
///
/// Logged and counted, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Forwarding to {sink} failed: {reason}")]
pub struct ForwardingError {
    pub sink: String,
    pub reason: String,
}

impl ForwardingError {
    pub fn new(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}
