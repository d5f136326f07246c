use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::GraphRenderer;
use crate::config::AudioConfig;
use crate::error::AudioError;

use super::{AudioBackend, ClockDomain, StreamFormat, TimeSource};

/// Backend driven by the caller instead of a device callback.
///
/// Used for deterministic tests and offline rendering: hardware time only
/// moves when [`ManualBackend::advance`] renders frames. Clones share the
/// same stream, so a test can keep one clone while the clock owns another.
#[derive(Clone)]
pub struct ManualBackend {
    format: StreamFormat,
    renderer: Arc<Mutex<Option<GraphRenderer>>>,
}

impl ManualBackend {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            format: StreamFormat {
                sample_rate,
                channels,
            },
            renderer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Render `frames` frames and return the interleaved output.
    ///
    /// Returns an empty vector when the stream is not running.
    pub fn advance(&self, frames: usize) -> Vec<f32> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(renderer) => {
                let channels = self.format.channels as usize;
                let mut out = vec![0.0; frames * channels];
                renderer.render(&mut out, channels);
                out
            }
            None => Vec::new(),
        }
    }

    /// Render the number of frames closest to `seconds`.
    pub fn advance_seconds(&self, seconds: f64) -> Vec<f32> {
        let frames = (seconds * self.format.sample_rate as f64).round() as usize;
        self.advance(frames)
    }

    fn lock(&self) -> MutexGuard<'_, Option<GraphRenderer>> {
        self.renderer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualBackend {
    fn default() -> Self {
        let config = AudioConfig::default();
        Self::new(config.sample_rate, config.channels)
    }
}

impl AudioBackend for ManualBackend {
    fn start(
        &self,
        renderer: GraphRenderer,
        _config: &AudioConfig,
    ) -> Result<StreamFormat, AudioError> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Err(AudioError::AlreadyRunning);
        }
        *guard = Some(renderer);
        Ok(self.format)
    }

    fn stop(&self) -> Result<(), AudioError> {
        if self.lock().take().is_none() {
            return Err(AudioError::NotRunning);
        }
        Ok(())
    }
}

/// Settable time source for simulated-time tests.
///
/// Time only moves through [`StubTimeSource::set`] and
/// [`StubTimeSource::advance`].
pub struct StubTimeSource {
    seconds_bits: AtomicU64,
    domain: ClockDomain,
}

impl StubTimeSource {
    pub fn new(start: f64) -> Self {
        Self {
            seconds_bits: AtomicU64::new(start.to_bits()),
            domain: ClockDomain::Wall,
        }
    }

    /// Stub that reports itself as the hardware clock.
    pub fn audio(start: f64) -> Self {
        Self {
            seconds_bits: AtomicU64::new(start.to_bits()),
            domain: ClockDomain::Audio,
        }
    }

    pub fn set(&self, seconds: f64) {
        self.seconds_bits.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds_bits.load(Ordering::SeqCst))
    }

    fn domain(&self) -> ClockDomain {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_time_source_moves_only_when_told() {
        let source = StubTimeSource::new(1.5);
        assert_eq!(source.now(), 1.5);
        assert_eq!(source.now(), 1.5);

        source.advance(0.25);
        assert_eq!(source.now(), 1.75);

        source.set(10.0);
        assert_eq!(source.now(), 10.0);
    }

    #[test]
    fn test_manual_backend_lifecycle() {
        let backend = ManualBackend::new(8_000, 1);
        assert!(backend.advance(16).is_empty());
        assert_eq!(backend.stop(), Err(AudioError::NotRunning));
        assert!(!backend.is_running());
    }
}
