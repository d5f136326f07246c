//! Built-in sound kits and the default loop kit
//!
//! One-shot kits feed the step sequencer; the loop kit maps each loop-board
//! track to three loop variations (`kick1`..`kick3` and so on).

use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::audio::AssetSource;

/// One-shot instrument inside a kit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    pub name: String,
    /// Asset path relative to the sounds root
    pub asset: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundKit {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub instruments: Vec<Instrument>,
}

impl SoundKit {
    pub fn instrument(&self, id: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.id == id)
    }

    pub fn instrument_ids(&self) -> Vec<&str> {
        self.instruments.iter().map(|i| i.id.as_str()).collect()
    }

    /// Asset sources for every instrument, keyed by instrument id.
    pub fn assets(&self, root: &Path) -> Vec<(String, AssetSource)> {
        self.instruments
            .iter()
            .map(|i| (i.id.clone(), AssetSource::Path(root.join(&i.asset))))
            .collect()
    }
}

fn instrument(id: &str, name: &str, asset: &str) -> Instrument {
    Instrument {
        id: id.to_string(),
        name: name.to_string(),
        asset: asset.to_string(),
    }
}

static BUILTIN_KITS: Lazy<Vec<SoundKit>> = Lazy::new(|| {
    vec![
        SoundKit {
            id: "classic-909".to_string(),
            name: "Classic 909".to_string(),
            description: Some("Standard electronic drum kit".to_string()),
            instruments: vec![
                instrument("909-kick", "Kick", "kick.wav"),
                instrument("909-snare", "Snare", "snare.wav"),
                instrument("909-hihat", "HiHat", "hihat.wav"),
                instrument("909-clap", "Clap", "clap.wav"),
            ],
        },
        SoundKit {
            id: "lofi".to_string(),
            name: "Lofi Vibes".to_string(),
            description: Some("Mellow lofi drum sounds".to_string()),
            instruments: vec![
                instrument("lofi-kick", "Kick", "kick.wav"),
                instrument("lofi-snare", "Snare", "snare.wav"),
                instrument("lofi-hihat", "HiHat", "hihat.wav"),
            ],
        },
    ]
});

pub fn builtin_kits() -> &'static [SoundKit] {
    &BUILTIN_KITS
}

pub fn kit_by_id(id: &str) -> Option<&'static SoundKit> {
    BUILTIN_KITS.iter().find(|k| k.id == id)
}

pub fn default_kit() -> &'static SoundKit {
    &BUILTIN_KITS[0]
}

/// Loop categories, one per loop-board track, in track order.
pub const LOOP_TYPES: [&str; 8] = [
    "kick", "clap", "tops", "bass", "chords", "vocal", "adds", "fx",
];

/// Default `(track_id, display_name)` layout of the loop board.
pub fn default_tracks() -> Vec<(String, String)> {
    LOOP_TYPES
        .iter()
        .enumerate()
        .map(|(i, kind)| (format!("track{}", i + 1), kind.to_uppercase()))
        .collect()
}

/// A set of loop variations laid out as `kits/<id>/<type>/Row_<n>.wav`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopKit {
    pub id: String,
    pub loop_types: Vec<String>,
    pub variations: usize,
}

impl Default for LoopKit {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            loop_types: LOOP_TYPES.iter().map(|t| t.to_string()).collect(),
            variations: 3,
        }
    }
}

impl LoopKit {
    /// Logical id of variation `n` (1-based) of `loop_type`.
    pub fn loop_id(loop_type: &str, n: usize) -> String {
        format!("{}{}", loop_type, n)
    }

    pub fn asset_path(&self, loop_type: &str, n: usize) -> String {
        format!("kits/{}/{}/Row_{}.wav", self.id, loop_type, n)
    }

    pub fn loop_ids(&self) -> Vec<String> {
        self.loop_types
            .iter()
            .flat_map(|t| (1..=self.variations).map(move |n| Self::loop_id(t, n)))
            .collect()
    }

    pub fn assets(&self, root: &Path) -> Vec<(String, AssetSource)> {
        self.loop_types
            .iter()
            .flat_map(|t| {
                (1..=self.variations).map(move |n| {
                    (
                        Self::loop_id(t, n),
                        AssetSource::Path(root.join(self.asset_path(t, n))),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kits() {
        assert_eq!(builtin_kits().len(), 2);
        assert_eq!(default_kit().id, "classic-909");
        assert_eq!(kit_by_id("lofi").unwrap().instruments.len(), 3);
        assert!(kit_by_id("missing").is_none());
        assert!(default_kit().instrument("909-clap").is_some());
    }

    #[test]
    fn test_default_tracks_layout() {
        let tracks = default_tracks();
        assert_eq!(tracks.len(), 8);
        assert_eq!(tracks[0], ("track1".to_string(), "KICK".to_string()));
        assert_eq!(tracks[7], ("track8".to_string(), "FX".to_string()));
    }

    #[test]
    fn test_loop_kit_assets() {
        let kit = LoopKit::default();
        let ids = kit.loop_ids();
        assert_eq!(ids.len(), 24);
        assert_eq!(&ids[..3], &["kick1", "kick2", "kick3"]);

        let assets = kit.assets(Path::new("/sounds"));
        assert_eq!(assets[4].0, "clap2");
        assert_eq!(
            assets[4].1,
            AssetSource::Path("/sounds/kits/default/clap/Row_2.wav".into())
        );
    }

    #[test]
    fn test_kit_serializes_without_empty_description() {
        let mut kit = default_kit().clone();
        kit.description = None;
        let json = serde_json::to_string(&kit).unwrap();
        assert!(!json.contains("description"));
    }
}
