//! CPAL-based audio backend for desktop platforms (Linux, macOS, Windows)
//!
//! `cpal::Stream` is not `Send` on every host, so the stream is built and
//! owned by a dedicated output thread. `start` waits for the thread to report
//! the negotiated format; `stop` signals it and joins.

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::GraphRenderer;
use crate::config::AudioConfig;
use crate::error::{log_audio_error, AudioError};

use super::{AudioBackend, StreamFormat};

struct OutputThread {
    shutdown: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

/// Desktop output backend driving the graph from a CPAL output stream
pub struct CpalBackend {
    thread: Mutex<Option<OutputThread>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            thread: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<OutputThread>>, AudioError> {
        self.thread.lock().map_err(|_| AudioError::LockPoisoned {
            component: "cpal_output_thread".to_string(),
        })
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
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
        let config = config.clone();

        let join = thread::Builder::new()
            .name("loopboard-output".to_string())
            .spawn(move || match open_output_stream(renderer, &config) {
                Ok((stream, format)) => {
                    let _ = ready_tx.send(Ok(format));
                    // Blocks until stop() sends or drops the sender
                    let _ = shutdown_rx.recv();
                    drop(stream);
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
                log_audio_error(&err, "cpal_start");
                err
            })?;

        log::info!(
            "[CpalBackend] Output stream running at {} Hz, {} channel(s)",
            format.sample_rate,
            format.channels
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
        log::info!("[CpalBackend] Output stream stopped");
        Ok(())
    }
}

fn open_output_stream(
    mut renderer: GraphRenderer,
    requested: &AudioConfig,
) -> Result<(cpal::Stream, StreamFormat), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default output device found".to_string(),
        })?;

    let config = device
        .default_output_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default output config: {:?}", e),
        })?;

    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(AudioError::StreamOpenFailed {
            reason: "Only F32 sample format is currently supported for output".to_string(),
        });
    }

    let stream_config: cpal::StreamConfig = config.into();
    let format = StreamFormat {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    };
    if format.sample_rate != requested.sample_rate {
        log::warn!(
            "[CpalBackend] Device runs at {} Hz (requested {} Hz)",
            format.sample_rate,
            requested.sample_rate
        );
    }

    let channels = format.channels as usize;
    let err_fn = |err| log::error!("[CpalBackend] Output stream error: {}", err);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                renderer.render(data, channels);
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

    stream.play().map_err(|e| AudioError::HardwareError {
        details: format!("Output start failed: {}", e),
    })?;

    Ok((stream, format))
}
