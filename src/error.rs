//! Error types for SensorBridge
//!
//! This module defines the error types shared by the frame codec and the
//! transport readers.

use thiserror::Error;

/// Result type alias for SensorBridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for SensorBridge operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Frame decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Frame failed domain validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Transport (hardware handle) error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors while decoding a 14-byte frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input is not exactly one frame long
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Frame does not start with the sync bytes
    #[error("Missing sync bytes: got {0:02x} {1:02x}")]
    MissingSync(u8, u8),

    /// XOR checksum does not match the payload
    #[error("Checksum mismatch: expected {expected:02x}, got {actual:02x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Errors raised by the range checks on a decoded frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A physical value lies outside its plausible range
    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Errors related to a transport reader or its hardware handle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Device could not be opened or configured
    #[error("Failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    /// Read from a byte stream failed
    #[error("{interface} read failed: {reason}")]
    Read {
        interface: &'static str,
        reason: String,
    },

    /// Bus transfer failed
    #[error("{interface} transfer failed: {reason}")]
    Transfer {
        interface: &'static str,
        reason: String,
    },

    /// No device answered at the given bus address
    #[error("No device at address 0x{address:02x}")]
    NoDevice { address: u8 },

    /// `start` was called before `initialize`
    #[error("{0} interface not initialized")]
    NotInitialized(&'static str),

    /// `on_frame` was called twice
    #[error("{0} frame callback already assigned")]
    CallbackAlreadySet(&'static str),

    /// `start` was called without a frame callback
    #[error("{0} frame callback not assigned")]
    CallbackMissing(&'static str),

    /// Acquisition thread could not be spawned
    #[error("Failed to spawn {interface} thread: {reason}")]
    Spawn {
        interface: &'static str,
        reason: String,
    },
}
