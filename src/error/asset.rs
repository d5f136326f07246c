// Asset decode and load error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Asset error code constants exposed to the host app
///
/// Error code range: 2001-2004
pub struct AssetErrorCodes {}

impl AssetErrorCodes {
    /// Bytes are not a decodable audio file
    pub const DECODE_FAILED: i32 = 2001;

    /// Asset source could not be read
    pub const READ_FAILED: i32 = 2002;

    /// Background decode task panicked or was cancelled
    pub const TASK_FAILED: i32 = 2003;

    /// Sound id was marked unavailable by an earlier failure
    pub const UNAVAILABLE: i32 = 2004;
}

/// Malformed audio input handed to [`crate::audio::AudioClock::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for DecodeError {
    fn code(&self) -> i32 {
        AssetErrorCodes::DECODE_FAILED
    }

    fn message(&self) -> String {
        format!("Failed to decode audio: {}", self.reason)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecodeError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for DecodeError {}

impl From<hound::Error> for DecodeError {
    fn from(err: hound::Error) -> Self {
        DecodeError::new(err.to_string())
    }
}

/// Per-asset load failure reported by the buffer cache.
///
/// One id failing never affects its siblings; the cache reports each
/// failure against the logical sound id that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Bytes were read but could not be decoded
    Decode { sound_id: String, source: DecodeError },

    /// Path could not be read
    Read { sound_id: String, reason: String },

    /// Decode task did not complete
    TaskFailed { sound_id: String, reason: String },

    /// Id is marked unavailable and no source was supplied to retry
    Unavailable { sound_id: String },
}

impl LoadError {
    pub fn sound_id(&self) -> &str {
        match self {
            LoadError::Decode { sound_id, .. }
            | LoadError::Read { sound_id, .. }
            | LoadError::TaskFailed { sound_id, .. }
            | LoadError::Unavailable { sound_id } => sound_id,
        }
    }
}

impl ErrorCode for LoadError {
    fn code(&self) -> i32 {
        match self {
            LoadError::Decode { .. } => AssetErrorCodes::DECODE_FAILED,
            LoadError::Read { .. } => AssetErrorCodes::READ_FAILED,
            LoadError::TaskFailed { .. } => AssetErrorCodes::TASK_FAILED,
            LoadError::Unavailable { .. } => AssetErrorCodes::UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            LoadError::Decode { sound_id, source } => {
                format!("Failed to decode {}: {}", sound_id, source.reason)
            }
            LoadError::Read { sound_id, reason } => {
                format!("Failed to read {}: {}", sound_id, reason)
            }
            LoadError::TaskFailed { sound_id, reason } => {
                format!("Load task for {} failed: {}", sound_id, reason)
            }
            LoadError::Unavailable { sound_id } => {
                format!("Sound {} is unavailable", sound_id)
            }
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoadError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Log a load error with structured context
pub fn log_load_error(err: &LoadError, context: &str) {
    error!(
        "Asset error in {}: code={}, component=BufferCache, sound_id={}, message={}",
        context,
        err.code(),
        err.sound_id(),
        err.message()
    );
}
