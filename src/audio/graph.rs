//! Output graph - realtime voice mixer driven by the platform audio callback
//!
//! The graph is split in two halves:
//! - [`GraphController`] lives on the control side (inside `AudioClock`) and
//!   pushes start/stop commands into a lock-free SPSC ring buffer.
//! - [`GraphRenderer`] is moved into the output stream callback. Every block it
//!   drains commands, mixes active voices into the output slice and advances
//!   the shared frame counter that `AudioClock::current_time` reads.
//!
//! # Real-Time Safety
//! - No heap allocations while rendering (voice storage is pre-allocated)
//! - No mutex locks (ring buffers and atomics only)
//! - Finished voices hand their buffer back over a second ring buffer so the
//!   last `Arc` drop, and any deallocation, happens on the control side
//!
//! ```text
//! AudioClock::schedule_playback()
//!   └─> GraphController::send(Start)       [control thread]
//!       └─> rtrb command queue
//!           └─> GraphRenderer::render()    [audio thread]
//!               ├─> drain_commands()
//!               ├─> mix voices from their exact start frame
//!               └─> frame_counter += frames
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use super::buffer::AudioBuffer;
use crate::error::AudioError;

/// Commands sent from the control side to the renderer.
pub(crate) enum GraphCommand {
    Start {
        handle: u64,
        buffer: Arc<AudioBuffer>,
        start_frame: u64,
        looping: bool,
    },
    Stop {
        handle: u64,
    },
    StopAll,
}

/// Counters shared between the renderer and the control side.
#[derive(Debug, Default)]
pub struct GraphShared {
    /// Total frames rendered since the stream started
    frame_counter: AtomicU64,
    /// Starts rejected because every voice slot was busy
    dropped_voices: AtomicU64,
    /// Voices alive after the last rendered block
    active_voices: AtomicUsize,
}

impl GraphShared {
    pub fn frames_rendered(&self) -> u64 {
        self.frame_counter.load(Ordering::Acquire)
    }

    pub fn dropped_voices(&self) -> u64 {
        self.dropped_voices.load(Ordering::Relaxed)
    }

    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }
}

struct Voice {
    handle: u64,
    buffer: Arc<AudioBuffer>,
    start_frame: u64,
    position: usize,
    looping: bool,
}

/// Control-side half of the graph.
pub(crate) struct GraphController {
    commands: Producer<GraphCommand>,
    retired: Consumer<Arc<AudioBuffer>>,
    capacity: usize,
}

impl GraphController {
    pub(crate) fn send(&mut self, command: GraphCommand) -> Result<(), AudioError> {
        self.collect_retired();
        self.commands
            .push(command)
            .map_err(|_| AudioError::CommandQueueFull {
                capacity: self.capacity,
            })
    }

    /// Drop buffers the renderer is done with.
    pub(crate) fn collect_retired(&mut self) -> usize {
        let mut collected = 0;
        while self.retired.pop().is_ok() {
            collected += 1;
        }
        collected
    }
}

/// Audio-thread half of the graph.
pub struct GraphRenderer {
    commands: Consumer<GraphCommand>,
    retired: Producer<Arc<AudioBuffer>>,
    voices: Vec<Voice>,
    max_voices: usize,
    shared: Arc<GraphShared>,
}

/// Create a connected controller/renderer pair.
pub(crate) fn build_graph(
    command_capacity: usize,
    max_voices: usize,
) -> (GraphController, GraphRenderer, Arc<GraphShared>) {
    let (command_tx, command_rx) = RingBuffer::new(command_capacity);
    let (retired_tx, retired_rx) = RingBuffer::new(command_capacity + max_voices);
    let shared = Arc::new(GraphShared::default());

    let controller = GraphController {
        commands: command_tx,
        retired: retired_rx,
        capacity: command_capacity,
    };
    let renderer = GraphRenderer {
        commands: command_rx,
        retired: retired_tx,
        voices: Vec::with_capacity(max_voices),
        max_voices,
        shared: Arc::clone(&shared),
    };

    (controller, renderer, shared)
}

impl GraphRenderer {
    /// Render one block of interleaved output.
    ///
    /// Real-time audio callback - NO ALLOCATIONS, LOCKS, OR BLOCKING!
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let block_start = self.shared.frame_counter.load(Ordering::Acquire);

        self.drain_commands(block_start);
        out.fill(0.0);

        let mut i = 0;
        while i < self.voices.len() {
            if mix_voice(&mut self.voices[i], out, channels, frames, block_start) {
                let voice = self.voices.swap_remove(i);
                self.retire(voice.buffer);
            } else {
                i += 1;
            }
        }

        self.shared
            .active_voices
            .store(self.voices.len(), Ordering::Relaxed);
        self.shared
            .frame_counter
            .fetch_add(frames as u64, Ordering::Release);
    }

    fn drain_commands(&mut self, block_start: u64) {
        while let Ok(command) = self.commands.pop() {
            match command {
                GraphCommand::Start {
                    handle,
                    buffer,
                    start_frame,
                    looping,
                } => {
                    if self.voices.len() >= self.max_voices {
                        self.shared.dropped_voices.fetch_add(1, Ordering::Relaxed);
                        self.retire(buffer);
                        continue;
                    }
                    // Late starts sound from the top of this block. A late
                    // loop joins at the phase it would have reached.
                    let position = if looping && start_frame < block_start {
                        ((block_start - start_frame) % buffer.frames().max(1) as u64) as usize
                    } else {
                        0
                    };
                    self.voices.push(Voice {
                        handle,
                        buffer,
                        start_frame: start_frame.max(block_start),
                        position,
                        looping,
                    });
                }
                GraphCommand::Stop { handle } => {
                    if let Some(index) = self.voices.iter().position(|v| v.handle == handle) {
                        let voice = self.voices.swap_remove(index);
                        self.retire(voice.buffer);
                    }
                }
                GraphCommand::StopAll => {
                    while let Some(voice) = self.voices.pop() {
                        self.retire(voice.buffer);
                    }
                }
            }
        }
    }

    fn retire(&mut self, buffer: Arc<AudioBuffer>) {
        // If the control side stopped draining, dropping here is the only option left
        let _ = self.retired.push(buffer);
    }
}

/// Mix one voice into the block. Returns true when a one-shot voice ends.
#[inline]
fn mix_voice(
    voice: &mut Voice,
    out: &mut [f32],
    channels: usize,
    frames: usize,
    block_start: u64,
) -> bool {
    let offset = voice.start_frame.saturating_sub(block_start);
    if offset >= frames as u64 {
        return false;
    }

    let len = voice.buffer.frames();
    for frame in offset as usize..frames {
        let base = frame * channels;
        for ch in 0..channels {
            out[base + ch] += voice.buffer.sample(voice.position, ch);
        }
        voice.position += 1;
        if voice.position >= len {
            if voice.looping {
                voice.position = 0;
            } else {
                return true;
            }
        }
    }

    false
}
