//! Backend abstractions for the engine core.
//!
//! An [`AudioBackend`] owns the platform output stream and drives the
//! [`GraphRenderer`] from its realtime callback. A [`TimeSource`] is the
//! clock that schedulers poll; it is injected so tests can run on simulated
//! time.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::audio::GraphRenderer;
use crate::config::AudioConfig;
use crate::error::AudioError;

/// Format actually negotiated with the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Trait implemented by platform-specific output backends.
///
/// `start` takes ownership of the renderer and must call
/// [`GraphRenderer::render`] once per hardware block.
pub trait AudioBackend: Send + Sync {
    fn start(&self, renderer: GraphRenderer, config: &AudioConfig)
        -> Result<StreamFormat, AudioError>;
    fn stop(&self) -> Result<(), AudioError>;
}

/// Which clock a [`TimeSource`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDomain {
    /// Host wall clock; only meaningful before an audio graph exists
    Wall,
    /// Hardware output clock; times can be passed to `schedule_playback`
    Audio,
}

/// Trait representing a monotonic clock in seconds.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> f64;

    fn domain(&self) -> ClockDomain {
        ClockDomain::Wall
    }
}

/// Wall-clock time source (seconds since the Unix epoch).
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

#[cfg(target_os = "android")]
mod oboe;
#[cfg(target_os = "android")]
pub use oboe::OboeBackend;

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use cpal::CpalBackend;

mod manual;
pub use manual::{ManualBackend, StubTimeSource};

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        /// Output backend for the current platform.
        pub fn platform_backend() -> Box<dyn AudioBackend> {
            Box::new(OboeBackend::new())
        }
    } else {
        /// Output backend for the current platform.
        pub fn platform_backend() -> Box<dyn AudioBackend> {
            Box::new(CpalBackend::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_source_is_wall_clock() {
        let source = SystemTimeSource::default();
        let a = source.now();
        let b = source.now();
        assert!(a > 1_000_000_000.0, "expected seconds since epoch");
        assert!(b >= a);
        assert_eq!(source.domain(), ClockDomain::Wall);
    }
}
