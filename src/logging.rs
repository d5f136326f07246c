//! Logging setup
//!
//! Library code logs through the `log` facade and `tracing` macros; this
//! installs a `tracing` subscriber that receives both. Calling it again is
//! harmless.

use once_cell::sync::OnceCell;

static INIT: OnceCell<()> = OnceCell::new();

#[cfg(target_os = "android")]
fn install() {
    use tracing_subscriber::prelude::*;

    match tracing_android::layer("LoopEngine") {
        Ok(layer) => {
            let _ = tracing_subscriber::registry().with(layer).try_init();
        }
        Err(err) => eprintln!("[Logging] Android log layer unavailable: {}", err),
    }
}

#[cfg(not(target_os = "android"))]
fn install() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Install the process-wide subscriber once.
pub fn init_logging() {
    INIT.get_or_init(install);
}
