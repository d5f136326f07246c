// Audio graph error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants exposed to the host app
///
/// Error code range: 1001-1008
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Audio clock was closed; handles are no longer valid
    pub const CLOCK_CLOSED: i32 = 1001;

    /// Command ring buffer towards the audio thread is full
    pub const COMMAND_QUEUE_FULL: i32 = 1002;

    /// Failed to open the output stream
    pub const STREAM_OPEN_FAILED: i32 = 1003;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1004;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1005;

    /// Output backend is already running
    pub const ALREADY_RUNNING: i32 = 1006;

    /// Output backend is not running
    pub const NOT_RUNNING: i32 = 1007;

    /// Configuration value out of range
    pub const INVALID_CONFIG: i32 = 1008;
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioClock, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-graph errors
///
/// These errors cover the output stream lifecycle and the command path
/// between the control side and the realtime renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// The clock was closed and can no longer schedule playback
    ClockClosed,

    /// The renderer has not drained its command queue yet
    CommandQueueFull { capacity: usize },

    /// Failed to open the output stream
    StreamOpenFailed { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Output backend already started
    AlreadyRunning,

    /// Output backend not started
    NotRunning,

    /// Configuration value out of range
    InvalidConfig { field: String, reason: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::ClockClosed => AudioErrorCodes::CLOCK_CLOSED,
            AudioError::CommandQueueFull { .. } => AudioErrorCodes::COMMAND_QUEUE_FULL,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::NotRunning => AudioErrorCodes::NOT_RUNNING,
            AudioError::InvalidConfig { .. } => AudioErrorCodes::INVALID_CONFIG,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::ClockClosed => {
                "Audio clock closed. Create a new EngineHandle to resume playback.".to_string()
            }
            AudioError::CommandQueueFull { capacity } => {
                format!("Audio command queue full (capacity {})", capacity)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::AlreadyRunning => "Output stream already running".to_string(),
            AudioError::NotRunning => "Output stream not running".to_string(),
            AudioError::InvalidConfig { field, reason } => {
                format!("Invalid config value for {}: {}", field, reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}
