//! Android output backend built on Oboe
//!
//! The graph renderer is wrapped in an `AudioOutputCallback` and driven from
//! Oboe's realtime thread. Like the desktop backend, the stream object is
//! owned by a dedicated thread so the backend itself stays `Send + Sync`.

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use oboe::{
    AudioOutputCallback, AudioOutputStreamSafe, AudioStream, AudioStreamAsync,
    AudioStreamBase, AudioStreamBuilder, DataCallbackResult, Output, PerformanceMode,
    SharingMode,
};

use crate::audio::GraphRenderer;
use crate::config::AudioConfig;
use crate::error::{log_audio_error, AudioError};

use super::{AudioBackend, StreamFormat};

/// Realtime callback feeding Oboe from the graph renderer.
///
/// Real-time audio callback - NO ALLOCATIONS, LOCKS, OR BLOCKING!
struct GraphCallback {
    renderer: GraphRenderer,
}

impl AudioOutputCallback for GraphCallback {
    type FrameType = (f32, oboe::Mono);

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [f32],
    ) -> DataCallbackResult {
        self.renderer.render(frames, 1);
        DataCallbackResult::Continue
    }
}

struct OutputThread {
    shutdown: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

/// Android backend that drives the graph from a low-latency Oboe stream.
pub struct OboeBackend {
    thread: Mutex<Option<OutputThread>>,
}

impl OboeBackend {
    pub fn new() -> Self {
        Self {
            thread: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<OutputThread>>, AudioError> {
        self.thread.lock().map_err(|_| AudioError::LockPoisoned {
            component: "oboe_output_thread".to_string(),
        })
    }
}

impl Default for OboeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for OboeBackend {
    fn start(
        &self,
        renderer: GraphRenderer,
        config: &AudioConfig,
    ) -> Result<StreamFormat, AudioError> {
        let mut guard = self.lock()?;
        if guard.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sample_rate = config.sample_rate;

        let join = thread::Builder::new()
            .name("loopboard-oboe".to_string())
            .spawn(move || match open_output_stream(renderer, sample_rate) {
                Ok((mut stream, format)) => {
                    let _ = ready_tx.send(Ok(format));
                    let _ = shutdown_rx.recv();
                    if let Err(e) = stream.stop() {
                        log::warn!("[OboeBackend] Output stop failed: {:?}", e);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(AudioError::from)?;

        let format = ready_rx
            .recv()
            .map_err(|_| AudioError::StreamOpenFailed {
                reason: "output thread exited before reporting".to_string(),
            })?
            .map_err(|err| {
                log_audio_error(&err, "oboe_start");
                err
            })?;

        log::info!(
            "[OboeBackend] Output stream running at {} Hz",
            format.sample_rate
        );

        *guard = Some(OutputThread {
            shutdown: shutdown_tx,
            join,
        });
        Ok(format)
    }

    fn stop(&self) -> Result<(), AudioError> {
        let thread = self.lock()?.take().ok_or(AudioError::NotRunning)?;
        let _ = thread.shutdown.send(());
        thread.join.join().map_err(|_| AudioError::HardwareError {
            details: "output thread panicked".to_string(),
        })?;
        log::info!("[OboeBackend] Output stream stopped");
        Ok(())
    }
}

fn open_output_stream(
    renderer: GraphRenderer,
    sample_rate: u32,
) -> Result<(AudioStreamAsync<Output, GraphCallback>, StreamFormat), AudioError> {
    let mut stream = AudioStreamBuilder::default()
        .set_performance_mode(PerformanceMode::LowLatency)
        .set_sharing_mode(SharingMode::Exclusive)
        .set_direction::<Output>()
        .set_sample_rate(sample_rate as i32)
        .set_channel_count::<oboe::Mono>()
        .set_format::<f32>()
        .set_callback(GraphCallback { renderer })
        .open_stream()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Output stream: {:?}", e),
        })?;

    stream.start().map_err(|e| AudioError::HardwareError {
        details: format!("Failed to start output stream: {:?}", e),
    })?;

    let format = StreamFormat {
        sample_rate: stream.get_sample_rate() as u32,
        channels: 1,
    };
    Ok((stream, format))
}
