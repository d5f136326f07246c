// Transport and loop-store error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Transport error code constants exposed to the host app
///
/// Error code range: 3001-3003
pub struct TransportErrorCodes {}

impl TransportErrorCodes {
    /// BPM value is outside the supported tempo range
    pub const BPM_INVALID: i32 = 3001;

    /// Track id does not exist on the loop board
    pub const UNKNOWN_TRACK: i32 = 3002;

    /// Loop store lock was poisoned
    pub const LOCK_POISONED: i32 = 3003;
}

/// Log a transport error with structured context
pub fn log_transport_error(err: &TransportError, context: &str) {
    error!(
        "Transport error in {}: code={}, component=QuantizedLoopStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Transport and loop-store errors
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// BPM value is outside [`MIN_BPM`, `MAX_BPM`]
    BpmInvalid { bpm: f64 },

    /// Track id does not exist
    UnknownTrack { track_id: String },

    /// Store lock poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for TransportError {
    fn code(&self) -> i32 {
        match self {
            TransportError::BpmInvalid { .. } => TransportErrorCodes::BPM_INVALID,
            TransportError::UnknownTrack { .. } => TransportErrorCodes::UNKNOWN_TRACK,
            TransportError::LockPoisoned { .. } => TransportErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            TransportError::BpmInvalid { bpm } => {
                format!("BPM must be between {} and {} (got {})", MIN_BPM, MAX_BPM, bpm)
            }
            TransportError::UnknownTrack { track_id } => {
                format!("Unknown track: {}", track_id)
            }
            TransportError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TransportError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for TransportError {}

/// Slowest accepted tempo.
pub const MIN_BPM: f64 = 20.0;

/// Fastest accepted tempo.
pub const MAX_BPM: f64 = 999.0;

/// Validate a tempo value.
pub fn validate_bpm(bpm: f64) -> Result<f64, TransportError> {
    if (MIN_BPM..=MAX_BPM).contains(&bpm) {
        Ok(bpm)
    } else {
        Err(TransportError::BpmInvalid { bpm })
    }
}
