// Error types for the loop board engine
//
// This module defines custom error types for the audio graph, asset loading and
// transport operations, providing structured error handling with error codes
// suitable for FFI communication.

mod asset;
mod audio;
mod transport;

pub use asset::{log_load_error, AssetErrorCodes, DecodeError, LoadError};
pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use transport::{
    log_transport_error, validate_bpm, TransportError, TransportErrorCodes, MAX_BPM, MIN_BPM,
};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
