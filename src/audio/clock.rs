//! AudioClock - hardware timebase and buffer-start scheduling
//!
//! Owns the output graph for the session. Time is derived from the number of
//! frames the renderer has produced, so it advances with the hardware and not
//! with whatever thread happens to be polling it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::buffer::AudioBuffer;
use super::graph::{build_graph, GraphCommand, GraphController, GraphShared};
use crate::config::AudioConfig;
use crate::engine::backend::{AudioBackend, ClockDomain, StreamFormat, TimeSource};
use crate::error::{log_audio_error, AudioError, DecodeError};

/// Opaque id of one started playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Scheduling seam shared by every scheduler in the crate.
///
/// Implemented by [`AudioClock`] and by recording doubles in tests.
pub trait AudioOutput: Send + Sync {
    /// Hardware time in seconds. Must not block.
    fn current_time(&self) -> f64;

    /// Start `buffer` at `start_time`, or at the next block if that time has
    /// already passed. A late looping start joins mid-buffer at the phase it
    /// would have reached had it started on time.
    fn schedule_playback(
        &self,
        buffer: Arc<AudioBuffer>,
        start_time: f64,
        looping: bool,
    ) -> Result<PlaybackHandle, AudioError>;

    /// Stop a playback. Unknown or finished handles are ignored.
    fn stop(&self, handle: PlaybackHandle);
}

/// The session's output graph and its clock
pub struct AudioClock {
    backend: Box<dyn AudioBackend>,
    controller: Mutex<GraphController>,
    shared: Arc<GraphShared>,
    format: StreamFormat,
    next_handle: AtomicU64,
    closed: AtomicBool,
    reported_drops: AtomicU64,
}

impl AudioClock {
    /// Build the graph and start the backend stream.
    pub fn open(config: &AudioConfig, backend: Box<dyn AudioBackend>) -> Result<Self, AudioError> {
        let (controller, renderer, shared) =
            build_graph(config.command_queue_capacity, config.max_voices);

        let format = backend.start(renderer, config).map_err(|err| {
            log_audio_error(&err, "audio_clock_open");
            err
        })?;

        log::info!(
            "[AudioClock] Opened at {} Hz, {} channel(s), {} voices",
            format.sample_rate,
            format.channels,
            config.max_voices
        );

        Ok(Self {
            backend,
            controller: Mutex::new(controller),
            shared,
            format,
            next_handle: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            reported_drops: AtomicU64::new(0),
        })
    }

    /// Decode a WAV asset for playback on this clock.
    pub fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
        AudioBuffer::decode_wav(bytes)
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn frames_rendered(&self) -> u64 {
        self.shared.frames_rendered()
    }

    pub fn active_voices(&self) -> usize {
        self.shared.active_voices()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the backend stream and invalidate every handle.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn close(&self) -> Result<(), AudioError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Ok(mut controller) = self.lock_controller() {
            // Best effort: the backend may already be gone
            let _ = controller.send(GraphCommand::StopAll);
        }

        match self.backend.stop() {
            Ok(()) | Err(AudioError::NotRunning) => {
                log::info!("[AudioClock] Closed");
                Ok(())
            }
            Err(err) => {
                log_audio_error(&err, "audio_clock_close");
                Err(err)
            }
        }
    }

    fn lock_controller(&self) -> Result<MutexGuard<'_, GraphController>, AudioError> {
        self.controller.lock().map_err(|_| AudioError::LockPoisoned {
            component: "graph_controller".to_string(),
        })
    }

    fn report_dropped_voices(&self) {
        let dropped = self.shared.dropped_voices();
        let reported = self.reported_drops.swap(dropped, Ordering::Relaxed);
        if dropped > reported {
            tracing::warn!(
                "[AudioClock] Voice limit reached, {} start(s) dropped",
                dropped - reported
            );
        }
    }
}

impl AudioOutput for AudioClock {
    fn current_time(&self) -> f64 {
        self.shared.frames_rendered() as f64 / self.format.sample_rate as f64
    }

    fn schedule_playback(
        &self,
        buffer: Arc<AudioBuffer>,
        start_time: f64,
        looping: bool,
    ) -> Result<PlaybackHandle, AudioError> {
        if self.is_closed() {
            return Err(AudioError::ClockClosed);
        }
        self.report_dropped_voices();

        // Past frames are clamped to the next block by the renderer
        let start_frame = (start_time.max(0.0) * self.format.sample_rate as f64).round() as u64;

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.lock_controller()?.send(GraphCommand::Start {
            handle,
            buffer,
            start_frame,
            looping,
        })?;

        Ok(PlaybackHandle(handle))
    }

    fn stop(&self, handle: PlaybackHandle) {
        if self.is_closed() {
            return;
        }
        let result = self
            .lock_controller()
            .and_then(|mut controller| controller.send(GraphCommand::Stop { handle: handle.0 }));
        if let Err(err) = result {
            log_audio_error(&err, "audio_clock_stop");
        }
    }
}

impl TimeSource for AudioClock {
    fn now(&self) -> f64 {
        self.current_time()
    }

    fn domain(&self) -> ClockDomain {
        ClockDomain::Audio
    }
}

impl Drop for AudioClock {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
