// Audio module - output graph, hardware clock and decoded buffers

pub mod buffer;
pub mod cache;
pub mod clock;
pub mod graph;

// Re-export commonly used types for convenience
pub use buffer::AudioBuffer;
pub use cache::{AssetSource, BufferCache, LoadReport};
pub use clock::{AudioClock, AudioOutput, PlaybackHandle};
pub use graph::{GraphRenderer, GraphShared};
