//! Engine module housing the output backends and the composition root.
//!
//! `backend` holds the platform streams and time sources; `core` wires every
//! service into one [`EngineHandle`].

pub mod backend;
pub mod core;

#[cfg(target_os = "android")]
pub use backend::OboeBackend;
#[cfg(not(target_os = "android"))]
pub use backend::CpalBackend;
pub use backend::{
    platform_backend, AudioBackend, ClockDomain, ManualBackend, StreamFormat, StubTimeSource,
    SystemTimeSource, TimeSource,
};
pub use core::{DriveMode, EngineHandle, PumpReport};
