// Host-facing API
//
// The app embeds exactly one engine per process. This module owns that
// instance and exposes its change notifications as streams for UI bindings.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::Stream;
use once_cell::sync::Lazy;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::config::AppConfig;
use crate::engine::EngineHandle;
use crate::error::{AudioError, TransportError};
use crate::loops::LoopStoreEvent;
use crate::scheduler::StepTick;

// Re-export error code constants for host exposure
pub use crate::error::{AssetErrorCodes, AudioErrorCodes, TransportErrorCodes};

/// Process-wide engine slot. `None` until [`init_engine`] or [`install_engine`].
static ENGINE: Lazy<Mutex<Option<Arc<EngineHandle>>>> = Lazy::new(|| Mutex::new(None));

fn slot() -> MutexGuard<'static, Option<Arc<EngineHandle>>> {
    ENGINE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Version of the engine library.
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Open the engine on the platform output device.
///
/// # Errors
/// - `AlreadyRunning` if an engine is installed (call [`shutdown_engine`] first)
/// - Any error from opening the output stream
pub fn init_engine(config: AppConfig) -> Result<Arc<EngineHandle>, AudioError> {
    if slot().is_some() {
        return Err(AudioError::AlreadyRunning);
    }
    install_engine(EngineHandle::with_platform_backend(config)?)
}

/// Install an already constructed engine as the process instance.
pub fn install_engine(engine: EngineHandle) -> Result<Arc<EngineHandle>, AudioError> {
    let mut slot = slot();
    if slot.is_some() {
        log::warn!("[Api] Engine already installed, rejecting second instance");
        return Err(AudioError::AlreadyRunning);
    }
    let engine = Arc::new(engine);
    *slot = Some(Arc::clone(&engine));
    log::info!("[Api] Engine installed");
    Ok(engine)
}

/// The installed engine, if any.
pub fn engine() -> Option<Arc<EngineHandle>> {
    slot().clone()
}

/// Close and release the installed engine.
///
/// Safe to call when no engine is installed.
pub fn shutdown_engine() -> Result<(), AudioError> {
    let Some(engine) = slot().take() else {
        return Ok(());
    };
    engine.close()
}

/// Loop board changes. Lagged events are dropped; the next track or
/// transport event carries the full state again.
pub fn loop_events_stream() -> Result<impl Stream<Item = LoopStoreEvent>, AudioError> {
    let engine = engine().ok_or(AudioError::NotRunning)?;
    let receiver = engine.subscribe().map_err(transport_to_audio)?;
    Ok(BroadcastStream::new(receiver).filter_map(|result| result.ok()))
}

/// Step ticks for the sequencer playhead.
pub fn step_ticks_stream() -> Result<impl Stream<Item = StepTick>, AudioError> {
    let engine = engine().ok_or(AudioError::NotRunning)?;
    let receiver = engine.subscribe_steps().map_err(transport_to_audio)?;
    Ok(BroadcastStream::new(receiver).filter_map(|result| result.ok()))
}

fn transport_to_audio(err: TransportError) -> AudioError {
    AudioError::LockPoisoned {
        component: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DriveMode, ManualBackend};

    fn manual_engine() -> EngineHandle {
        EngineHandle::with_drive(
            AppConfig::default(),
            Box::new(ManualBackend::new(8_000, 1)),
            DriveMode::Manual,
        )
        .unwrap()
    }

    // One test owns the global slot so parallel tests cannot race on it
    #[test]
    fn test_single_instance_lifecycle() {
        shutdown_engine().unwrap();
        assert!(loop_events_stream().is_err());

        let handle = install_engine(manual_engine()).unwrap();
        assert!(matches!(
            install_engine(manual_engine()),
            Err(AudioError::AlreadyRunning)
        ));

        let mut events = Box::pin(loop_events_stream().unwrap());
        handle.toggle_loop("track1", "kick1").unwrap();
        let first = futures::executor::block_on(events.next());
        assert!(matches!(first, Some(LoopStoreEvent::TrackChanged(_))));

        drop(events);
        drop(handle);
        shutdown_engine().unwrap();
        assert!(engine().is_none());
        shutdown_engine().unwrap();
    }

    #[test]
    fn test_version() {
        assert_eq!(get_version(), env!("CARGO_PKG_VERSION"));
    }
}
