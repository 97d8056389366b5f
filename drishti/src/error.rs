//! Error types for Drishti
//!
//! `ScanError` carries the failure itself; `ErrorKind` is the closed
//! classification the recovery coordinator and the user-facing layer work
//! with.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::types::{ScanningMode, ScanningState, SignalKind};

/// Result type alias
pub type Result<T> = std::result::Result<T, ScanError>;

/// Drishti error types
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A signal could not be computed because its input buffer is absent
    #[error("Signal unavailable: {0}")]
    SignalUnavailable(SignalKind),

    /// Quality stayed below the acceptance thresholds
    #[error("Quality below threshold: {0}")]
    QualityBelowThreshold(String),

    /// Scene lighting is too dark to capture
    #[error("Insufficient lighting: {level:.2} < {required:.2}")]
    InsufficientLighting {
        /// Measured lighting level
        level: f32,
        /// Required minimum
        required: f32,
    },

    /// Device cannot run any capture mode
    #[error("Device not supported: {0}")]
    DeviceNotSupported(String),

    /// Fallback chain is exhausted
    #[error("No fallback available from {0} mode")]
    NoFallbackAvailable(ScanningMode),

    /// A frame is already being processed
    #[error("Processing in progress")]
    ProcessingInProgress,

    /// Frame buffers are malformed
    #[error("Invalid frame data: {0}")]
    InvalidFrameData(String),

    /// Fatal failure surfaced to the user
    #[error("Unrecoverable error: {0}")]
    Unrecoverable(String),

    /// State machine rejected a transition
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// State the session was in
        from: ScanningState,
        /// Requested state
        to: ScanningState,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ScanError {
    fn from(e: toml::de::Error) -> Self {
        ScanError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for ScanError {
    fn from(e: toml::ser::Error) -> Self {
        ScanError::Config(e.to_string())
    }
}

impl ScanError {
    /// Classify into the closed error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::SignalUnavailable(_) => ErrorKind::SignalUnavailable,
            ScanError::QualityBelowThreshold(_) => ErrorKind::QualityBelowThreshold,
            ScanError::InsufficientLighting { .. } => ErrorKind::InsufficientLighting,
            ScanError::DeviceNotSupported(_) => ErrorKind::DeviceNotSupported,
            ScanError::NoFallbackAvailable(_) => ErrorKind::NoFallbackAvailable,
            ScanError::ProcessingInProgress => ErrorKind::ProcessingInProgress,
            ScanError::InvalidFrameData(_) => ErrorKind::InvalidFrameData,
            ScanError::Unrecoverable(_)
            | ScanError::InvalidTransition { .. }
            | ScanError::Config(_)
            | ScanError::Io(_) => ErrorKind::UnrecoverableError,
        }
    }
}

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SignalUnavailable,
    QualityBelowThreshold,
    InsufficientLighting,
    DeviceNotSupported,
    NoFallbackAvailable,
    ProcessingInProgress,
    InvalidFrameData,
    UnrecoverableError,
}

/// How loudly a failure should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Absorbed silently (skip and continue)
    Info,
    /// Recoverable, worth a hint to the user
    Warning,
    /// Recovery exhausted
    Error,
    /// Session cannot continue
    Critical,
}

impl ErrorKind {
    /// Whether the failure can be handled without user involvement.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            ErrorKind::SignalUnavailable
                | ErrorKind::QualityBelowThreshold
                | ErrorKind::InsufficientLighting
                | ErrorKind::ProcessingInProgress
                | ErrorKind::InvalidFrameData
        )
    }

    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::SignalUnavailable
            | ErrorKind::ProcessingInProgress
            | ErrorKind::InvalidFrameData => Severity::Info,
            ErrorKind::QualityBelowThreshold | ErrorKind::InsufficientLighting => {
                Severity::Warning
            }
            ErrorKind::NoFallbackAvailable => Severity::Error,
            ErrorKind::DeviceNotSupported | ErrorKind::UnrecoverableError => Severity::Critical,
        }
    }

    /// Human-readable classification.
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::SignalUnavailable => "A sensor signal is temporarily unavailable",
            ErrorKind::QualityBelowThreshold => "Scan quality is below the required level",
            ErrorKind::InsufficientLighting => "The scene is too dark to scan",
            ErrorKind::DeviceNotSupported => "This device cannot perform the scan",
            ErrorKind::NoFallbackAvailable => "No alternative scanning mode is available",
            ErrorKind::ProcessingInProgress => "The previous frame is still being processed",
            ErrorKind::InvalidFrameData => "The camera delivered an unreadable frame",
            ErrorKind::UnrecoverableError => "The scan could not be completed",
        }
    }

    /// Static hint shown next to the description, where one applies.
    pub fn recovery_suggestion(self) -> Option<&'static str> {
        match self {
            ErrorKind::QualityBelowThreshold => Some("Move closer and hold steady"),
            ErrorKind::InsufficientLighting => Some("Improve lighting"),
            ErrorKind::InvalidFrameData => Some("Hold steady"),
            ErrorKind::NoFallbackAvailable | ErrorKind::UnrecoverableError => {
                Some("Restart the scan")
            }
            ErrorKind::DeviceNotSupported => Some("Use a device with a depth sensor"),
            ErrorKind::SignalUnavailable | ErrorKind::ProcessingInProgress => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::SignalUnavailable => "signal_unavailable",
            ErrorKind::QualityBelowThreshold => "quality_below_threshold",
            ErrorKind::InsufficientLighting => "insufficient_lighting",
            ErrorKind::DeviceNotSupported => "device_not_supported",
            ErrorKind::NoFallbackAvailable => "no_fallback_available",
            ErrorKind::ProcessingInProgress => "processing_in_progress",
            ErrorKind::InvalidFrameData => "invalid_frame_data",
            ErrorKind::UnrecoverableError => "unrecoverable_error",
        };
        f.write_str(s)
    }
}
