//! BufferCache - logical sound id to decoded buffer
//!
//! Every id decodes at most once per session (until unloaded). Loads of
//! different ids are independent: a malformed asset marks only its own id
//! unavailable and is reported back per id.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;

use super::buffer::AudioBuffer;
use crate::error::{log_load_error, LoadError};

/// Where the bytes of an asset come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl AssetSource {
    fn decode(&self, sound_id: &str) -> Result<AudioBuffer, LoadError> {
        let decoded = match self {
            AssetSource::Bytes(bytes) => AudioBuffer::decode_wav(bytes),
            AssetSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|e| LoadError::Read {
                    sound_id: sound_id.to_string(),
                    reason: format!("{}: {}", path.display(), e),
                })?;
                AudioBuffer::decode_wav(&bytes)
            }
        };
        decoded.map_err(|source| LoadError::Decode {
            sound_id: sound_id.to_string(),
            source,
        })
    }
}

/// Outcome of a batch preload, one entry per requested id.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<LoadError>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Session-wide cache of decoded buffers
#[derive(Default)]
pub struct BufferCache {
    buffers: RwLock<HashMap<String, Arc<AudioBuffer>>>,
    unavailable: RwLock<HashSet<String>>,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached buffer for `sound_id`, decoding `source` on first use.
    ///
    /// A failure marks the id unavailable until a later load succeeds.
    pub fn ensure_loaded(
        &self,
        sound_id: &str,
        source: &AssetSource,
    ) -> Result<Arc<AudioBuffer>, LoadError> {
        if let Some(buffer) = self.get(sound_id) {
            return Ok(buffer);
        }

        match source.decode(sound_id) {
            Ok(buffer) => {
                let buffer = Arc::clone(
                    self.write_buffers()
                        .entry(sound_id.to_string())
                        .or_insert_with(|| Arc::new(buffer)),
                );
                self.write_unavailable().remove(sound_id);
                log::debug!(
                    "[BufferCache] Loaded {} ({} frames, {} ch)",
                    sound_id,
                    buffer.frames(),
                    buffer.channels()
                );
                Ok(buffer)
            }
            Err(err) => {
                self.mark_unavailable(sound_id);
                log_load_error(&err, "ensure_loaded");
                Err(err)
            }
        }
    }

    /// Load many assets concurrently.
    ///
    /// Each decode runs on the blocking pool. Already-cached ids are reported
    /// as loaded without decoding again.
    pub async fn preload(self: &Arc<Self>, assets: Vec<(String, AssetSource)>) -> LoadReport {
        let mut report = LoadReport::default();
        let mut tasks = Vec::new();
        let mut task_ids = Vec::new();

        for (sound_id, source) in assets {
            if self.contains(&sound_id) {
                report.loaded.push(sound_id);
                continue;
            }
            let cache = Arc::clone(self);
            let id = sound_id.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                cache.ensure_loaded(&id, &source)
            }));
            task_ids.push(sound_id);
        }

        for (sound_id, result) in task_ids.into_iter().zip(join_all(tasks).await) {
            match result {
                Ok(Ok(_)) => report.loaded.push(sound_id),
                Ok(Err(err)) => report.failed.push(err),
                Err(join_err) => {
                    self.mark_unavailable(&sound_id);
                    let err = LoadError::TaskFailed {
                        sound_id,
                        reason: join_err.to_string(),
                    };
                    log_load_error(&err, "preload");
                    report.failed.push(err);
                }
            }
        }

        tracing::info!(
            "[BufferCache] Preload finished: {} loaded, {} failed",
            report.loaded.len(),
            report.failed.len()
        );
        report
    }

    pub fn get(&self, sound_id: &str) -> Option<Arc<AudioBuffer>> {
        self.read_buffers().get(sound_id).cloned()
    }

    /// Like [`get`](Self::get) but explains why nothing is playable.
    pub fn require(&self, sound_id: &str) -> Result<Arc<AudioBuffer>, LoadError> {
        self.get(sound_id).ok_or_else(|| LoadError::Unavailable {
            sound_id: sound_id.to_string(),
        })
    }

    pub fn contains(&self, sound_id: &str) -> bool {
        self.read_buffers().contains_key(sound_id)
    }

    pub fn is_unavailable(&self, sound_id: &str) -> bool {
        self.unavailable
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(sound_id)
    }

    /// Drop a buffer. Playbacks already started keep their own reference.
    pub fn unload(&self, sound_id: &str) -> bool {
        self.write_unavailable().remove(sound_id);
        self.write_buffers().remove(sound_id).is_some()
    }

    pub fn clear(&self) {
        self.write_buffers().clear();
        self.write_unavailable().clear();
    }

    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_buffers().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read_buffers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mark_unavailable(&self, sound_id: &str) {
        self.write_unavailable().insert(sound_id.to_string());
    }

    fn read_buffers(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<AudioBuffer>>> {
        self.buffers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_buffers(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<AudioBuffer>>> {
        self.buffers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_unavailable(&self) -> RwLockWriteGuard<'_, HashSet<String>> {
        self.unavailable
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::sine_wav_bytes;

    fn wav() -> AssetSource {
        AssetSource::Bytes(sine_wav_bytes(64, 1, 8_000))
    }

    #[test]
    fn test_ensure_loaded_is_idempotent() {
        let cache = BufferCache::new();
        let first = cache.ensure_loaded("kick1", &wav()).unwrap();
        // A second, different source must not replace the cached buffer
        let second = cache
            .ensure_loaded("kick1", &AssetSource::Bytes(b"garbage".to_vec()))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_decode_failure_marks_unavailable() {
        let cache = BufferCache::new();
        let err = cache
            .ensure_loaded("bad", &AssetSource::Bytes(b"not a wav".to_vec()))
            .unwrap_err();

        assert!(matches!(err, LoadError::Decode { .. }));
        assert_eq!(err.sound_id(), "bad");
        assert!(cache.is_unavailable("bad"));
        assert!(cache.get("bad").is_none());
        assert!(matches!(
            cache.require("bad"),
            Err(LoadError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_later_success_clears_unavailable() {
        let cache = BufferCache::new();
        let _ = cache.ensure_loaded("snare", &AssetSource::Bytes(Vec::new()));
        assert!(cache.is_unavailable("snare"));

        cache.ensure_loaded("snare", &wav()).unwrap();
        assert!(!cache.is_unavailable("snare"));
    }

    #[test]
    fn test_missing_path_is_read_error() {
        let cache = BufferCache::new();
        let err = cache
            .ensure_loaded("fx1", &AssetSource::Path("/nonexistent/fx1.wav".into()))
            .unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bass1.wav");
        std::fs::write(&path, sine_wav_bytes(32, 2, 8_000)).unwrap();

        let cache = BufferCache::new();
        let buffer = cache.ensure_loaded("bass1", &AssetSource::Path(path)).unwrap();
        assert_eq!(buffer.channels(), 2);
    }

    #[tokio::test]
    async fn test_preload_isolates_failures() {
        let cache = Arc::new(BufferCache::new());
        let report = cache
            .preload(vec![
                ("kick1".to_string(), wav()),
                ("broken".to_string(), AssetSource::Bytes(b"xx".to_vec())),
                ("clap1".to_string(), wav()),
            ])
            .await;

        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].sound_id(), "broken");
        assert!(!report.is_complete());
        assert_eq!(cache.loaded_ids(), vec!["clap1", "kick1"]);
    }

    #[test]
    fn test_unload_and_clear() {
        let cache = BufferCache::new();
        cache.ensure_loaded("a", &wav()).unwrap();
        cache.ensure_loaded("b", &wav()).unwrap();

        assert!(cache.unload("a"));
        assert!(!cache.unload("a"));
        assert_eq!(cache.loaded_ids(), vec!["b"]);

        cache.clear();
        assert!(cache.is_empty());
    }
}
