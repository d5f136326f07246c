// Loop Board Engine - audio scheduling and quantization core
// Sample-accurate loop, arrangement and step playback on one hardware clock

// Module declarations
pub mod api;
pub mod arrangement;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod kit;
pub mod logging;
pub mod loops;
pub mod scheduler;
pub mod sequencer;
pub mod testing;

// Re-exports for convenience
pub use arrangement::{Arrangement, Clip};
pub use audio::{AssetSource, AudioBuffer, AudioClock, AudioOutput, BufferCache, LoadReport, PlaybackHandle};
pub use config::AppConfig;
pub use engine::{DriveMode, EngineHandle, ManualBackend};
pub use error::{AudioError, DecodeError, ErrorCode, LoadError, TransportError};
pub use logging::init_logging;
pub use loops::{LoopStoreEvent, QuantizedLoopStore, TrackState, Transport};
pub use scheduler::{seconds_per_step, LookaheadScheduler, ScheduledNote, StepClock, StepTick};
pub use sequencer::{StepGrid, StepSequencer};

/// JNI_OnLoad is called when the native library is loaded by Android
/// This function initializes the Android context required by oboe-rs
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(vm: jni::JavaVM, _reserved: *mut std::ffi::c_void) -> jni::sys::jint {
    init_logging();

    log::info!("[Jni] JNI_OnLoad called - initializing Android context");

    // SAFETY: Called once before any Oboe operation. The JavaVM pointer is
    // valid for the lifetime of the process; no Context object is available
    // at load time, so a null context is passed.
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer() as *mut std::ffi::c_void,
            std::ptr::null_mut(),
        );
    }

    log::info!("[Jni] Android context initialized");

    jni::sys::JNI_VERSION_1_6
}
