// Loops module - quantized loop board

pub mod bar;
pub mod playback;
pub mod store;

pub use bar::{bar_duration, BarBoundaryDetector};
pub use playback::LoopPlaybackEngine;
pub use store::{LoopPlayer, LoopStoreEvent, QuantizedLoopStore, QueuedChange, TrackState, Transport};
