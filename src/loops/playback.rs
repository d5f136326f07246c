//! LoopPlaybackEngine - one looping source per track
//!
//! Owns the playback handles of the loop board. The store decides *when*
//! a loop changes; this engine only makes the audio match.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::store::LoopPlayer;
use crate::audio::{AudioOutput, BufferCache, LoadReport, PlaybackHandle};
use crate::error::log_audio_error;
use crate::kit::LoopKit;

struct ActiveLoop {
    loop_id: String,
    handle: PlaybackHandle,
}

pub struct LoopPlaybackEngine {
    output: Arc<dyn AudioOutput>,
    cache: Arc<BufferCache>,
    active: Mutex<HashMap<String, ActiveLoop>>,
}

impl LoopPlaybackEngine {
    pub fn new(output: Arc<dyn AudioOutput>, cache: Arc<BufferCache>) -> Self {
        Self {
            output,
            cache,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Decode every loop of `kit` in parallel.
    pub async fn preload_kit(&self, kit: &LoopKit, root: &Path) -> LoadReport {
        let report = self.cache.preload(kit.assets(root)).await;
        log::info!(
            "[LoopPlaybackEngine] Kit {} ready: {} loaded, {} failed",
            kit.id,
            report.loaded.len(),
            report.failed.len()
        );
        report
    }

    /// `(track_id, loop_id)` pairs currently sounding, sorted by track.
    pub fn active_tracks(&self) -> Vec<(String, String)> {
        let mut tracks: Vec<(String, String)> = self
            .lock()
            .iter()
            .map(|(track, active)| (track.clone(), active.loop_id.clone()))
            .collect();
        tracks.sort();
        tracks
    }

    pub fn is_playing(&self, track_id: &str) -> bool {
        self.lock().contains_key(track_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveLoop>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LoopPlayer for LoopPlaybackEngine {
    fn play_loop(&self, track_id: &str, loop_id: &str, start_time: f64) {
        // Stop first so audio follows the store even if the new buffer is missing
        self.stop_loop(track_id);

        let Some(buffer) = self.cache.get(loop_id) else {
            log::warn!("[LoopPlaybackEngine] No buffer found for {}", loop_id);
            return;
        };

        match self.output.schedule_playback(buffer, start_time, true) {
            Ok(handle) => {
                self.lock().insert(
                    track_id.to_string(),
                    ActiveLoop {
                        loop_id: loop_id.to_string(),
                        handle,
                    },
                );
            }
            Err(err) => log_audio_error(&err, "play_loop"),
        }
    }

    fn stop_loop(&self, track_id: &str) {
        let removed = self.lock().remove(track_id);
        if let Some(active) = removed {
            self.output.stop(active.handle);
        }
    }

    fn stop_all(&self) {
        let drained: Vec<ActiveLoop> = self.lock().drain().map(|(_, active)| active).collect();
        for active in drained {
            self.output.stop(active.handle);
        }
    }
}
