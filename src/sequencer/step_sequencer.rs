//! StepSequencer - turns step clock ticks into one-shot hits
//!
//! On the audio clock each hit is scheduled for its tick time, so the 100 ms
//! schedule-ahead window turns into sample-accurate starts. On the wall clock
//! (no graph timebase to aim at) hits start as soon as the tick is emitted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use super::grid::StepGrid;
use crate::audio::{AudioOutput, BufferCache, PlaybackHandle};
use crate::engine::backend::ClockDomain;
use crate::error::{log_audio_error, log_load_error, TransportError};
use crate::scheduler::{Pollable, StepClock, StepTick};

pub struct StepSequencer {
    clock: StepClock,
    grid: StepGrid,
    output: Arc<dyn AudioOutput>,
    cache: Arc<BufferCache>,
    ticks: broadcast::Sender<StepTick>,
    // Instruments already reported missing since the last start
    missing: HashSet<String>,
    /// Hits that may still be pending or sounding, with their end time
    hits: Vec<(PlaybackHandle, f64)>,
}

impl StepSequencer {
    pub fn new(
        clock: StepClock,
        grid: StepGrid,
        output: Arc<dyn AudioOutput>,
        cache: Arc<BufferCache>,
    ) -> Self {
        let (ticks, _) = broadcast::channel(64);
        let mut clock = clock;
        clock.set_step_count(grid.step_count());
        Self {
            clock,
            grid,
            output,
            cache,
            ticks,
            missing: HashSet::new(),
            hits: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.missing.clear();
        self.clock.start();
    }

    /// Pause and silence every hit already handed to the output.
    pub fn stop(&mut self) {
        self.clock.stop();
        self.silence();
    }

    pub fn reset(&mut self) {
        self.clock.reset();
        self.silence();
    }

    fn silence(&mut self) {
        for (handle, _) in self.hits.drain(..) {
            self.output.stop(handle);
        }
    }

    /// Hits scheduled or sounding that `stop` would cancel.
    pub fn pending_hits(&self) -> usize {
        self.hits.len()
    }

    /// Emit due steps and schedule their hits.
    pub fn tick(&mut self) -> Vec<StepTick> {
        let Self {
            clock,
            grid,
            output,
            cache,
            ticks,
            missing,
            hits,
        } = self;
        let sample_accurate = clock.time_source().domain() == ClockDomain::Audio;
        let now = output.current_time();
        hits.retain(|&(_, end)| end > now);

        let mut emitted = Vec::new();
        clock.tick_with(|tick| {
            for instrument in grid.active_at(tick.index) {
                let Some(buffer) = cache.get(instrument) else {
                    if missing.insert(instrument.to_string()) {
                        log::warn!(
                            "[StepSequencer] No buffer for {}, skipping its steps",
                            instrument
                        );
                    }
                    continue;
                };
                let start_time = if sample_accurate { tick.time } else { 0.0 };
                let end = start_time.max(now) + buffer.duration();
                match output.schedule_playback(buffer, start_time, false) {
                    Ok(handle) => hits.push((handle, end)),
                    Err(err) => log_audio_error(&err, "step_sequencer_tick"),
                }
            }
            let _ = ticks.send(tick);
            emitted.push(tick);
        });
        emitted
    }

    /// Play one instrument right now, outside the grid.
    pub fn preview(&self, instrument_id: &str) -> Option<PlaybackHandle> {
        let buffer = match self.cache.require(instrument_id) {
            Ok(buffer) => buffer,
            Err(err) => {
                log_load_error(&err, "preview");
                return None;
            }
        };
        match self
            .output
            .schedule_playback(buffer, self.output.current_time(), false)
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                log_audio_error(&err, "preview");
                None
            }
        }
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), TransportError> {
        self.clock.set_bpm(bpm)
    }

    /// Flip one step; see [`StepGrid::toggle`].
    pub fn toggle_step(&mut self, instrument_id: &str, step: usize) -> Option<bool> {
        self.grid.toggle(instrument_id, step)
    }

    pub fn set_grid(&mut self, grid: StepGrid) {
        self.clock.set_step_count(grid.step_count());
        self.grid = grid;
    }

    pub fn grid(&self) -> &StepGrid {
        &self.grid
    }

    pub fn clock(&self) -> &StepClock {
        &self.clock
    }

    pub fn current_step(&self) -> usize {
        self.clock.current_step()
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Ticks as they are emitted, for the visual playhead.
    pub fn subscribe(&self) -> broadcast::Receiver<StepTick> {
        self.ticks.subscribe()
    }
}

impl Pollable for StepSequencer {
    fn poll(&mut self) {
        self.tick();
    }

    fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    fn poll_interval(&self) -> Duration {
        self.clock.poll_interval()
    }
}
