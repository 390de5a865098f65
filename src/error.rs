//! Error types for the air-monitor daemon.
//!
//! This module defines custom error enums for each component of the daemon,
//! providing descriptive error messages with context information.

use thiserror::Error;

/// Errors reported by the gas sensor adapter.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Gas sensor not detected on '{device}'")]
    NotDetected { device: String },

    #[error("Unsupported gas sensor product (feature set {0:#06x})")]
    UnsupportedProduct(u16),

    #[error("IAQ measurement failed")]
    MeasureFailed,

    #[error("Failed to read IAQ baseline from sensor")]
    BaselineReadFailed,

    #[error("Sensor rejected IAQ baseline eCO2={eco2_base} TVOC={tvoc_base}")]
    BaselineWriteFailed { eco2_base: u16, tvoc_base: u16 },

    #[error("Failed to re-initialize IAQ algorithm")]
    ReinitFailed,

    #[error("CRC mismatch on sensor word: expected {expected:#04x}, got {actual:#04x}")]
    Crc { expected: u8, actual: u8 },

    #[error("I2C bus error: {0:?}")]
    Bus(embedded_hal::i2c::ErrorKind),
}

/// Errors related to the key-value persistence store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No namespace is open")]
    NamespaceNotOpen,

    #[error("Failed to access store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize store contents: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors related to baseline calibration persistence.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Cannot retrieve current device baseline: {0}")]
    BaselineReadFailure(#[source] SensorError),

    #[error("No valid baseline stored (eCO2={eco2_base}, TVOC={tvoc_base})")]
    BaselineInvalid { eco2_base: u16, tvoc_base: u16 },

    #[error("Sensor refused stored baseline: {0}")]
    BaselineRejected(#[source] SensorError),

    #[error("Baseline reset failed: {0}")]
    ResetFailed(#[source] SensorError),

    #[error("Baseline store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gas sensor is not connected")]
    SensorNotConnected,
}

/// Graph configuration errors, caught when a scale is constructed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("Graph scale must satisfy min < mid < max (got {min}/{mid}/{max})")]
    DegenerateScale { min: u16, mid: u16, max: u16 },

    #[error("Graph area must be non-empty (got {width}x{height})")]
    EmptyArea { width: u32, height: u32 },
}

/// Errors related to IPC server operations.
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Failed to bind socket at '{path}': {source}")]
    SocketBindFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Monitor loop is no longer accepting commands")]
    MonitorGone,

    #[error("Failed to serialize response: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors related to configuration management.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to write configuration: {0}")]
    WriteError(#[from] std::io::Error),
}

/// Top-level daemon errors.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}
