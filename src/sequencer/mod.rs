// Sequencer module - step grid and the sequencer that plays it

pub mod grid;
pub mod step_sequencer;

pub use grid::StepGrid;
pub use step_sequencer::StepSequencer;
