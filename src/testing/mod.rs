//! Deterministic doubles and fixtures for tests.
//!
//! `RecordingOutput` stands in for the audio clock with a settable time and
//! a log of every start/stop; `RecordingPlayer` does the same for the loop
//! player seam. Neither touches audio hardware.

pub mod fixtures;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::{AudioBuffer, AudioOutput, PlaybackHandle};
use crate::engine::backend::{ClockDomain, StubTimeSource, TimeSource};
use crate::error::AudioError;
use crate::loops::LoopPlayer;

/// One `schedule_playback` call.
#[derive(Debug, Clone)]
pub struct RecordedStart {
    pub handle: PlaybackHandle,
    pub buffer: Arc<AudioBuffer>,
    pub start_time: f64,
    pub looping: bool,
    /// Output time when the call was made
    pub requested_at: f64,
}

#[derive(Debug, Clone)]
pub enum OutputEvent {
    Started(RecordedStart),
    Stopped(PlaybackHandle),
}

/// `AudioOutput` double with manual time.
pub struct RecordingOutput {
    time: StubTimeSource,
    next_handle: AtomicU64,
    events: Mutex<Vec<OutputEvent>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            time: StubTimeSource::audio(0.0),
            next_handle: AtomicU64::new(1),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn set_time(&self, seconds: f64) {
        self.time.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.time.advance(seconds);
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.lock().clone()
    }

    pub fn starts(&self) -> Vec<RecordedStart> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Started(start) => Some(start.clone()),
                OutputEvent::Stopped(_) => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<PlaybackHandle> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Stopped(handle) => Some(*handle),
                OutputEvent::Started(_) => None,
            })
            .collect()
    }

    /// Looping starts that have not been stopped.
    pub fn active_handles(&self) -> Vec<PlaybackHandle> {
        let stopped: HashSet<PlaybackHandle> = self.stops().into_iter().collect();
        self.starts()
            .into_iter()
            .filter(|s| s.looping && !stopped.contains(&s.handle))
            .map(|s| s.handle)
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutputEvent>> {
        self.events.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for RecordingOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for RecordingOutput {
    fn current_time(&self) -> f64 {
        self.time.now()
    }

    fn schedule_playback(
        &self,
        buffer: Arc<AudioBuffer>,
        start_time: f64,
        looping: bool,
    ) -> Result<PlaybackHandle, AudioError> {
        let handle = PlaybackHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.lock().push(OutputEvent::Started(RecordedStart {
            handle,
            buffer,
            start_time,
            looping,
            requested_at: self.time.now(),
        }));
        Ok(handle)
    }

    fn stop(&self, handle: PlaybackHandle) {
        self.lock().push(OutputEvent::Stopped(handle));
    }
}

impl TimeSource for RecordingOutput {
    fn now(&self) -> f64 {
        self.time.now()
    }

    fn domain(&self) -> ClockDomain {
        ClockDomain::Audio
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Play { track_id: String, loop_id: String },
    Stop { track_id: String },
    StopAll,
}

/// `LoopPlayer` double that records calls in order.
#[derive(Default)]
pub struct RecordingPlayer {
    events: Mutex<Vec<PlayerEvent>>,
    start_times: Mutex<Vec<f64>>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlayerEvent> {
        self.lock().clone()
    }

    /// `start_time` of every `play_loop` call, in call order.
    pub fn start_times(&self) -> Vec<f64> {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PlayerEvent>> {
        self.events.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl LoopPlayer for RecordingPlayer {
    fn play_loop(&self, track_id: &str, loop_id: &str, start_time: f64) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(start_time);
        self.lock().push(PlayerEvent::Play {
            track_id: track_id.to_string(),
            loop_id: loop_id.to_string(),
        });
    }

    fn stop_loop(&self, track_id: &str) {
        self.lock().push(PlayerEvent::Stop {
            track_id: track_id.to_string(),
        });
    }

    fn stop_all(&self) {
        self.lock().push(PlayerEvent::StopAll);
    }
}
