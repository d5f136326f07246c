//! Arrangement clips and their conversion to scheduled notes

use serde::{Deserialize, Serialize};

use crate::audio::BufferCache;
use crate::loops::bar_duration;
use crate::scheduler::ScheduledNote;

/// One pattern placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    pub track_id: String,
    /// Sound id of the loop to play
    pub pattern_id: String,
    pub start_bar: u32,
    #[serde(alias = "duration")]
    pub duration_bars: u32,
    #[serde(rename = "isMuted", default)]
    pub muted: bool,
}

impl Clip {
    pub fn new(id: &str, track_id: &str, pattern_id: &str, start_bar: u32, duration_bars: u32) -> Self {
        Self {
            id: id.to_string(),
            track_id: track_id.to_string(),
            pattern_id: pattern_id.to_string(),
            start_bar,
            duration_bars,
            muted: false,
        }
    }

    pub fn muted(mut self) -> Self {
        self.muted = true;
        self
    }

    pub fn end_bar(&self) -> u32 {
        self.start_bar + self.duration_bars
    }
}

/// Ordered clip list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arrangement {
    clips: Vec<Clip>,
}

impl Arrangement {
    pub fn new(clips: Vec<Clip>) -> Self {
        Self { clips }
    }

    /// The starter arrangement shown on first launch.
    pub fn demo() -> Self {
        Self::new(vec![
            Clip::new("1", "track1", "kick1", 0, 4),
            Clip::new("2", "track2", "clap1", 0, 4),
            Clip::new("3", "track3", "tops2", 4, 4),
            Clip::new("4", "track1", "kick2", 4, 4).muted(),
            Clip::new("5", "track5", "chords1", 2, 8),
        ])
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn add_clip(&mut self, clip: Clip) {
        self.clips.push(clip);
    }

    /// Returns false if no clip had that id.
    pub fn remove_clip(&mut self, id: &str) -> bool {
        let before = self.clips.len();
        self.clips.retain(|c| c.id != id);
        self.clips.len() != before
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    /// Bars until the last clip ends.
    pub fn length_bars(&self) -> u32 {
        self.clips.iter().map(Clip::end_bar).max().unwrap_or(0)
    }

    /// Notes for the lookahead scheduler at `bpm`, ordered by time.
    ///
    /// Muted clips and clips whose sound failed to load are left out. Clips
    /// that are simply not loaded yet keep a `None` buffer and are skipped
    /// at play time.
    pub fn notes(&self, bpm: f64, cache: &BufferCache) -> Vec<ScheduledNote> {
        let bar = bar_duration(bpm);
        let mut notes: Vec<ScheduledNote> = self
            .clips
            .iter()
            .filter(|c| !c.muted && !cache.is_unavailable(&c.pattern_id))
            .map(|c| {
                ScheduledNote::new(
                    c.start_bar as f64 * bar,
                    c.pattern_id.clone(),
                    cache.get(&c.pattern_id),
                )
            })
            .collect();
        notes.sort_by(|a, b| a.fire_time.total_cmp(&b.fire_time));
        notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AssetSource;
    use crate::testing::fixtures::sine_wav_bytes;

    #[test]
    fn test_demo_arrangement() {
        let arrangement = Arrangement::demo();
        assert_eq!(arrangement.clips().len(), 5);
        assert_eq!(arrangement.length_bars(), 10);
    }

    #[test]
    fn test_notes_filter_and_order() {
        let cache = BufferCache::new();
        cache
            .ensure_loaded("kick1", &AssetSource::Bytes(sine_wav_bytes(8, 1, 8_000)))
            .unwrap();
        let _ = cache.ensure_loaded("clap1", &AssetSource::Bytes(b"broken".to_vec()));

        let notes = Arrangement::demo().notes(120.0, &cache);
        let ids: Vec<&str> = notes.iter().map(|n| n.sound_id.as_str()).collect();
        // clap1 failed to decode, kick2 is muted
        assert_eq!(ids, vec!["kick1", "chords1", "tops2"]);

        assert_eq!(notes[0].fire_time, 0.0);
        assert_eq!(notes[1].fire_time, 4.0);
        assert_eq!(notes[2].fire_time, 8.0);
        assert!(notes[0].buffer.is_some());
        assert!(notes[1].buffer.is_none(), "unloaded clips keep a None buffer");
    }

    #[test]
    fn test_add_and_remove_clip() {
        let mut arrangement = Arrangement::default();
        arrangement.add_clip(Clip::new("a", "track4", "bass1", 1, 2));
        assert_eq!(arrangement.length_bars(), 3);
        assert!(arrangement.remove_clip("a"));
        assert!(!arrangement.remove_clip("a"));
        assert_eq!(arrangement.length_bars(), 0);
    }

    #[test]
    fn test_parses_app_clip_json() {
        let json = r#"[
            {"id": "1", "trackId": "track1", "patternId": "kick1", "startBar": 0, "duration": 4},
            {"id": "4", "trackId": "track1", "patternId": "kick2", "startBar": 4, "duration": 4, "isMuted": true}
        ]"#;
        let arrangement = Arrangement::from_json(json).unwrap();
        assert_eq!(arrangement.clips()[0].duration_bars, 4);
        assert!(!arrangement.clips()[0].muted);
        assert!(arrangement.clips()[1].muted);
    }
}
