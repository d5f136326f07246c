// Scheduler module - timer-driven schedulers that feed the audio graph
//
// Each scheduler is an owned struct with explicit state and a `tick()`; the
// repeating timer lives in `poller` so tests can drive ticks by hand.

pub mod lookahead;
pub mod poller;
pub mod step_clock;

pub use lookahead::{LookaheadScheduler, ScheduledNote};
pub use poller::{spawn_poller, Pollable, PollerHandle};
pub use step_clock::{seconds_per_step, ClockState, StepClock, StepTick, MAX_STEPS_PER_TICK};
