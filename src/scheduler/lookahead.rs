//! Lookahead scheduler for arrangement playback
//!
//! A coarse timer (25 ms by default) cannot start sounds precisely, so each
//! poll hands every note falling inside the next `lookahead` seconds to the
//! audio graph with its exact start time. The graph then starts it on the
//! right frame regardless of how late the poll itself ran.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioBuffer, AudioOutput, PlaybackHandle};
use crate::config::SchedulerConfig;
use crate::error::log_audio_error;

use super::poller::Pollable;

/// One buffer start relative to the scheduler's origin.
#[derive(Debug, Clone)]
pub struct ScheduledNote {
    /// Seconds after the origin captured by [`LookaheadScheduler::start`]
    pub fire_time: f64,
    pub sound_id: String,
    /// `None` when the sound is not loaded; such notes are skipped
    pub buffer: Option<Arc<AudioBuffer>>,
}

impl ScheduledNote {
    pub fn new(fire_time: f64, sound_id: impl Into<String>, buffer: Option<Arc<AudioBuffer>>) -> Self {
        Self {
            fire_time,
            sound_id: sound_id.into(),
            buffer,
        }
    }
}

pub struct LookaheadScheduler {
    output: Arc<dyn AudioOutput>,
    notes: Vec<ScheduledNote>,
    /// Indices into `notes` that were already handed off (or skipped)
    fired: HashSet<usize>,
    /// Started notes that may still be pending or sounding, with their end time
    handles: Vec<(PlaybackHandle, f64)>,
    lookahead: f64,
    poll_interval: Duration,
    origin: f64,
    running: bool,
}

impl LookaheadScheduler {
    pub fn new(output: Arc<dyn AudioOutput>, config: &SchedulerConfig) -> Self {
        Self {
            output,
            notes: Vec::new(),
            fired: HashSet::new(),
            handles: Vec::new(),
            lookahead: config.lookahead_secs,
            poll_interval: config.poll_interval(),
            origin: 0.0,
            running: false,
        }
    }

    /// Replace the note list. Replay restarts from the first note.
    pub fn set_notes(&mut self, notes: Vec<ScheduledNote>) {
        self.notes = notes;
        self.fired.clear();
    }

    pub fn notes(&self) -> &[ScheduledNote] {
        &self.notes
    }

    /// Start playback with the origin at the current audio time.
    ///
    /// Polls once immediately so notes at time 0 are not a poll late.
    pub fn start(&mut self) -> usize {
        let now = self.output.current_time();
        self.start_at(now)
    }

    /// Start playback with an explicit origin (for example a bar boundary).
    pub fn start_at(&mut self, origin: f64) -> usize {
        if self.running {
            self.stop();
        }
        self.origin = origin;
        self.fired.clear();
        self.running = true;
        log::info!(
            "[LookaheadScheduler] Started {} note(s) at origin {:.3}s",
            self.notes.len(),
            origin
        );
        self.tick()
    }

    /// Stop polling, forget fired state and silence what this scheduler started.
    pub fn stop(&mut self) {
        self.running = false;
        self.fired.clear();
        for (handle, _) in self.handles.drain(..) {
            self.output.stop(handle);
        }
    }

    /// Hand off every unfired note inside `[now, now + lookahead)`.
    ///
    /// Returns the number of notes consumed by this poll.
    pub fn tick(&mut self) -> usize {
        if !self.running {
            return 0;
        }

        let now = self.output.current_time();
        let horizon = now + self.lookahead;
        let mut consumed = 0;
        self.handles.retain(|&(_, end)| end > now);

        for (index, note) in self.notes.iter().enumerate() {
            if self.fired.contains(&index) {
                continue;
            }
            let start_time = self.origin + note.fire_time;
            if start_time < now || start_time >= horizon {
                continue;
            }

            self.fired.insert(index);
            consumed += 1;

            let Some(buffer) = &note.buffer else {
                log::warn!(
                    "[LookaheadScheduler] No buffer for {}, skipping note at {:.3}s",
                    note.sound_id,
                    note.fire_time
                );
                continue;
            };

            let end = start_time + buffer.duration();
            match self
                .output
                .schedule_playback(Arc::clone(buffer), start_time, false)
            {
                Ok(handle) => self.handles.push((handle, end)),
                Err(err) => log_audio_error(&err, "lookahead_tick"),
            }
        }

        consumed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// True once every note has been handed off.
    pub fn is_finished(&self) -> bool {
        self.fired.len() >= self.notes.len()
    }

    /// Started notes that `stop` would still cancel.
    pub fn pending_handles(&self) -> usize {
        self.handles.len()
    }

    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }
}

impl Pollable for LookaheadScheduler {
    fn poll(&mut self) {
        self.tick();
    }

    // The timer has nothing left to do once every note is handed off
    fn is_running(&self) -> bool {
        self.running && !self.is_finished()
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
