//! Self-correcting 1/16-note step clock
//!
//! Steps are timestamped from an absolute `next_step_time` that advances by
//! exactly one step per emission, so timer jitter never accumulates into
//! drift. If the host stalls (app backgrounded, debugger pause) the clock
//! resyncs to "now" instead of firing a burst of catch-up steps.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::StepClockConfig;
use crate::engine::backend::TimeSource;
use crate::error::{validate_bpm, TransportError};

/// Upper bound on steps emitted by a single poll.
pub const MAX_STEPS_PER_TICK: usize = 64;

/// Length of one 1/16 note in seconds.
pub fn seconds_per_step(bpm: f64) -> f64 {
    (60.0 / bpm) / 4.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
}

/// One emitted step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepTick {
    pub index: usize,
    /// Absolute time in the clock's time source
    pub time: f64,
}

pub struct StepClock {
    time_source: Arc<dyn TimeSource>,
    bpm: f64,
    step_count: usize,
    schedule_ahead: f64,
    stall_threshold: f64,
    poll_interval: Duration,
    state: ClockState,
    next_step_time: f64,
    // None until the first step after start()
    cursor: Option<usize>,
    current_step: usize,
    stall_recoveries: u64,
}

impl StepClock {
    pub fn new(
        time_source: Arc<dyn TimeSource>,
        bpm: f64,
        config: &StepClockConfig,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            time_source,
            bpm: validate_bpm(bpm)?,
            step_count: config.step_count.max(1),
            schedule_ahead: config.schedule_ahead_secs,
            stall_threshold: config.stall_threshold_secs,
            poll_interval: config.poll_interval(),
            state: ClockState::Stopped,
            next_step_time: 0.0,
            cursor: None,
            current_step: 0,
            stall_recoveries: 0,
        })
    }

    /// Begin emitting from step 0 at the current time.
    ///
    /// Does nothing when already running.
    pub fn start(&mut self) {
        if self.state == ClockState::Running {
            return;
        }
        self.cursor = None;
        self.next_step_time = self.time_source.now();
        self.state = ClockState::Running;
        log::debug!("[StepClock] Started at {} BPM", self.bpm);
    }

    /// Pause. The last emitted step stays observable.
    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    pub fn reset(&mut self) {
        self.stop();
        self.cursor = Some(0);
        self.current_step = 0;
    }

    /// Emit every step due before `now + schedule_ahead`.
    ///
    /// `on_step` runs once per step, in order, before this returns.
    pub fn tick_with<F: FnMut(StepTick)>(&mut self, mut on_step: F) -> usize {
        if self.state != ClockState::Running {
            return 0;
        }

        let now = self.time_source.now();
        if self.next_step_time < now - self.stall_threshold {
            tracing::debug!(
                "[StepClock] Stalled {:.3}s, resyncing",
                now - self.next_step_time
            );
            self.next_step_time = now;
            self.stall_recoveries += 1;
        }

        let step_duration = seconds_per_step(self.bpm);
        let mut emitted = 0;
        while self.next_step_time < now + self.schedule_ahead {
            if emitted == MAX_STEPS_PER_TICK {
                tracing::warn!(
                    "[StepClock] {} steps due in one poll, deferring the rest",
                    emitted
                );
                break;
            }
            let index = match self.cursor {
                Some(step) => (step + 1) % self.step_count,
                None => 0,
            };
            self.cursor = Some(index);
            self.current_step = index;

            on_step(StepTick {
                index,
                time: self.next_step_time,
            });
            emitted += 1;

            self.next_step_time += step_duration;
        }
        emitted
    }

    /// Like [`tick_with`](Self::tick_with), collecting the steps.
    pub fn tick(&mut self) -> Vec<StepTick> {
        let mut ticks = Vec::new();
        self.tick_with(|tick| ticks.push(tick));
        ticks
    }

    /// Change tempo. Applies from the next step onwards.
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), TransportError> {
        self.bpm = validate_bpm(bpm)?;
        Ok(())
    }

    /// Change the grid length, wrapping the cursor if it falls outside.
    pub fn set_step_count(&mut self, step_count: usize) {
        self.step_count = step_count.max(1);
        if let Some(step) = self.cursor {
            self.cursor = Some(step % self.step_count);
        }
        self.current_step %= self.step_count;
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    /// Last emitted step index.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn next_step_time(&self) -> f64 {
        self.next_step_time
    }

    /// How many times a stall forced a resync.
    pub fn stall_recoveries(&self) -> u64 {
        self.stall_recoveries
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.time_source
    }
}
