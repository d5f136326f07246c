//! QuantizedLoopStore - per-track loop state with bar-quantized commits
//!
//! While the transport is running every change a user makes is queued and
//! applied on the next bar crossing. The new loop is scheduled at the
//! boundary time itself, so even when the poll notices the crossing late the
//! loop plays in phase with the bar. The very first press has nothing to
//! quantize against and starts immediately.
//!
//! # State per track
//! ```text
//! Idle ──toggle(L) [stopped]──────────────> Active(L)
//! Active(L) ──toggle(L) [playing]─────────> Active(L), queued Stop
//! Active(L) ──toggle(M) [playing]─────────> Active(L), queued Loop(M)
//! queued ──bar crossing (commit)──────────> applied, queue cleared
//! any ──set_playing(false)────────────────> Idle (all tracks, immediately)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::bar::BarBoundaryDetector;
use crate::config::{SchedulerConfig, TransportConfig};
use crate::engine::backend::TimeSource;
use crate::error::{validate_bpm, TransportError};
use crate::kit::default_tracks;
use crate::scheduler::Pollable;

/// Starts and stops per-track loop sources on behalf of the store.
pub trait LoopPlayer: Send + Sync {
    /// Replace whatever `track_id` is playing with `loop_id`, looping from
    /// `start_time` on the output clock.
    fn play_loop(&self, track_id: &str, loop_id: &str, start_time: f64);
    /// Stop the source owned by `track_id`, if any.
    fn stop_loop(&self, track_id: &str);
    fn stop_all(&self);
}

/// Change waiting for the next bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueuedChange {
    Loop(String),
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    pub id: String,
    pub name: String,
    pub active_loop: Option<String>,
    pub queued: Option<QueuedChange>,
}

impl TrackState {
    fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            active_loop: None,
            queued: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.active_loop.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    pub is_playing: bool,
    pub bpm: f64,
}

/// Change notifications for UI bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopStoreEvent {
    TrackChanged(TrackState),
    TransportChanged(Transport),
    /// Queued changes applied on a bar crossing, in track order
    Committed { bar: i64, track_ids: Vec<String> },
}

pub struct QuantizedLoopStore {
    tracks: Vec<TrackState>,
    transport: Transport,
    detector: BarBoundaryDetector,
    player: Arc<dyn LoopPlayer>,
    clock: Arc<dyn TimeSource>,
    events: broadcast::Sender<LoopStoreEvent>,
    poll_interval: Duration,
}

impl QuantizedLoopStore {
    pub fn new(
        player: Arc<dyn LoopPlayer>,
        clock: Arc<dyn TimeSource>,
        bpm: f64,
        tracks: Vec<(String, String)>,
    ) -> Result<Self, TransportError> {
        let bpm = validate_bpm(bpm)?;
        let (events, _) = broadcast::channel(100);
        Ok(Self {
            tracks: tracks
                .into_iter()
                .map(|(id, name)| TrackState::new(id, name))
                .collect(),
            transport: Transport {
                is_playing: false,
                bpm,
            },
            detector: BarBoundaryDetector::new(bpm)?,
            player,
            clock,
            events,
            poll_interval: SchedulerConfig::default().poll_interval(),
        })
    }

    /// Store with the eight default loop-board tracks.
    pub fn with_default_tracks(
        player: Arc<dyn LoopPlayer>,
        clock: Arc<dyn TimeSource>,
        transport: &TransportConfig,
    ) -> Result<Self, TransportError> {
        Self::new(player, clock, transport.default_bpm, default_tracks())
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// User pressed the pad for `loop_id` on `track_id`.
    pub fn toggle_loop(&mut self, track_id: &str, loop_id: &str) -> Result<(), TransportError> {
        let index = self.track_index(track_id)?;

        if !self.transport.is_playing {
            let now = self.clock.now();
            let track = &mut self.tracks[index];
            if track.active_loop.is_some() {
                self.player.stop_loop(track_id);
            }
            self.player.play_loop(track_id, loop_id, now);
            track.active_loop = Some(loop_id.to_string());
            track.queued = None;
            log::info!("[LoopStore] {} started {} immediately", track_id, loop_id);

            self.notify_track(index);
            self.start_transport();
            return Ok(());
        }

        let track = &mut self.tracks[index];
        track.queued = if track.active_loop.as_deref() == Some(loop_id) {
            Some(QueuedChange::Stop)
        } else {
            Some(QueuedChange::Loop(loop_id.to_string()))
        };
        log::debug!("[LoopStore] {} queued {:?}", track_id, track.queued);
        self.notify_track(index);
        Ok(())
    }

    /// Apply the queued change of one track. Returns false when nothing was queued.
    pub fn commit(&mut self, track_id: &str) -> Result<bool, TransportError> {
        let index = self.track_index(track_id)?;
        let now = self.clock.now();
        Ok(self.commit_index(index, now))
    }

    /// Commit every track with a queued change, in track order.
    pub fn commit_queued(&mut self) -> Vec<String> {
        let now = self.clock.now();
        self.commit_queued_at(now)
    }

    fn commit_queued_at(&mut self, start_time: f64) -> Vec<String> {
        let mut committed = Vec::new();
        for index in 0..self.tracks.len() {
            if self.commit_index(index, start_time) {
                committed.push(self.tracks[index].id.clone());
            }
        }
        committed
    }

    /// Check the clock for a bar crossing and commit when one happened.
    ///
    /// Returns the new bar index on a crossing.
    pub fn poll(&mut self) -> Option<i64> {
        if !self.transport.is_playing {
            return None;
        }
        let now = self.clock.now();
        let bar = self.detector.poll(now)?;
        let boundary = self.detector.boundary_time(bar).unwrap_or(now);
        let track_ids = self.commit_queued_at(boundary);
        if !track_ids.is_empty() {
            log::info!("[LoopStore] Bar {}: committed {:?}", bar, track_ids);
            let _ = self
                .events
                .send(LoopStoreEvent::Committed { bar, track_ids });
        }
        Some(bar)
    }

    /// Start or hard-stop the transport.
    ///
    /// Stopping is immediate: every source stops and all track state clears.
    pub fn set_playing(&mut self, playing: bool) {
        if playing {
            if !self.transport.is_playing {
                self.start_transport();
            }
            return;
        }

        self.player.stop_all();
        for track in &mut self.tracks {
            track.active_loop = None;
            track.queued = None;
        }
        self.detector.disarm();
        let was_playing = std::mem::replace(&mut self.transport.is_playing, false);
        if was_playing {
            log::info!("[LoopStore] Transport stopped");
        }
        for index in 0..self.tracks.len() {
            self.notify_track(index);
        }
        self.notify_transport();
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), TransportError> {
        self.detector.set_bpm(bpm, self.clock.now())?;
        self.transport.bpm = self.detector.bpm();
        self.notify_transport();
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopStoreEvent> {
        self.events.subscribe()
    }

    pub fn tracks(&self) -> &[TrackState] {
        &self.tracks
    }

    pub fn track(&self, track_id: &str) -> Option<&TrackState> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing
    }

    /// Fractional bars since the transport started.
    pub fn bar_position(&self) -> Option<f64> {
        self.detector.bar_position(self.clock.now())
    }

    pub fn next_bar_time(&self) -> Option<f64> {
        self.detector.next_boundary()
    }

    fn commit_index(&mut self, index: usize, start_time: f64) -> bool {
        let Some(change) = self.tracks[index].queued.take() else {
            return false;
        };

        let track_id = self.tracks[index].id.clone();
        let had_active = self.tracks[index].active_loop.is_some();
        match change {
            QueuedChange::Stop => {
                if had_active {
                    self.player.stop_loop(&track_id);
                }
                self.tracks[index].active_loop = None;
            }
            QueuedChange::Loop(loop_id) => {
                if had_active {
                    self.player.stop_loop(&track_id);
                }
                self.player.play_loop(&track_id, &loop_id, start_time);
                self.tracks[index].active_loop = Some(loop_id);
            }
        }
        self.notify_track(index);
        true
    }

    fn start_transport(&mut self) {
        self.transport.is_playing = true;
        self.detector.arm(self.clock.now());
        log::info!("[LoopStore] Transport started at {} BPM", self.transport.bpm);
        self.notify_transport();
    }

    fn track_index(&self, track_id: &str) -> Result<usize, TransportError> {
        self.tracks
            .iter()
            .position(|t| t.id == track_id)
            .ok_or_else(|| TransportError::UnknownTrack {
                track_id: track_id.to_string(),
            })
    }

    fn notify_track(&self, index: usize) {
        let _ = self
            .events
            .send(LoopStoreEvent::TrackChanged(self.tracks[index].clone()));
    }

    fn notify_transport(&self) {
        let _ = self
            .events
            .send(LoopStoreEvent::TransportChanged(self.transport));
    }
}

impl Pollable for QuantizedLoopStore {
    fn poll(&mut self) {
        QuantizedLoopStore::poll(self);
    }

    fn is_running(&self) -> bool {
        self.transport.is_playing
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::StubTimeSource;
    use crate::testing::{PlayerEvent, RecordingPlayer};

    struct Fixture {
        store: QuantizedLoopStore,
        player: Arc<RecordingPlayer>,
        time: Arc<StubTimeSource>,
    }

    fn fixture() -> Fixture {
        let player = Arc::new(RecordingPlayer::new());
        let time = Arc::new(StubTimeSource::audio(0.0));
        let store = QuantizedLoopStore::with_default_tracks(
            Arc::clone(&player) as Arc<dyn LoopPlayer>,
            Arc::clone(&time) as Arc<dyn TimeSource>,
            &TransportConfig { default_bpm: 120.0 },
        )
        .unwrap();
        Fixture {
            store,
            player,
            time,
        }
    }

    #[test]
    fn test_first_press_starts_immediately() {
        let mut f = fixture();
        f.store.toggle_loop("track1", "kick1").unwrap();

        let track = f.store.track("track1").unwrap();
        assert_eq!(track.active_loop.as_deref(), Some("kick1"));
        assert_eq!(track.queued, None);
        assert!(f.store.is_playing());
        assert_eq!(
            f.player.events(),
            vec![PlayerEvent::Play {
                track_id: "track1".to_string(),
                loop_id: "kick1".to_string()
            }]
        );
    }

    #[test]
    fn test_same_loop_queues_stop() {
        let mut f = fixture();
        f.store.toggle_loop("track1", "kick1").unwrap();
        f.store.toggle_loop("track1", "kick1").unwrap();
        assert_eq!(
            f.store.track("track1").unwrap().queued,
            Some(QueuedChange::Stop)
        );

        assert!(f.store.commit("track1").unwrap());
        let track = f.store.track("track1").unwrap();
        assert_eq!(track.active_loop, None);
        assert_eq!(track.queued, None);
        assert_eq!(
            f.player.events().last(),
            Some(&PlayerEvent::Stop {
                track_id: "track1".to_string()
            })
        );
    }

    #[test]
    fn test_switch_stops_then_starts() {
        let mut f = fixture();
        f.store.toggle_loop("track1", "kick1").unwrap();
        f.store.toggle_loop("track1", "kick2").unwrap();
        f.player.clear();

        f.store.commit("track1").unwrap();
        let track = f.store.track("track1").unwrap();
        assert_eq!(track.active_loop.as_deref(), Some("kick2"));
        assert_eq!(track.queued, None);
        assert_eq!(
            f.player.events(),
            vec![
                PlayerEvent::Stop {
                    track_id: "track1".to_string()
                },
                PlayerEvent::Play {
                    track_id: "track1".to_string(),
                    loop_id: "kick2".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_commit_without_queue_is_noop() {
        let mut f = fixture();
        assert!(!f.store.commit("track2").unwrap());
        assert!(f.player.events().is_empty());
    }

    #[test]
    fn test_unknown_track() {
        let mut f = fixture();
        assert_eq!(
            f.store.toggle_loop("track99", "kick1"),
            Err(TransportError::UnknownTrack {
                track_id: "track99".to_string()
            })
        );
        assert!(f.store.commit("nope").is_err());
    }

    #[test]
    fn test_queued_changes_wait_for_bar() {
        let mut f = fixture();
        f.store.toggle_loop("track1", "kick1").unwrap();
        f.store.toggle_loop("track2", "clap1").unwrap();

        f.time.set(1.9);
        assert_eq!(f.store.poll(), None);
        assert_eq!(f.store.track("track2").unwrap().active_loop, None);

        f.time.set(2.01);
        assert_eq!(f.store.poll(), Some(1));
        assert_eq!(
            f.store.track("track2").unwrap().active_loop.as_deref(),
            Some("clap1")
        );

        // Same bar again: nothing happens
        f.store.toggle_loop("track3", "tops1").unwrap();
        f.time.set(2.5);
        assert_eq!(f.store.poll(), None);
        assert_eq!(f.store.track("track3").unwrap().active_loop, None);
    }

    #[test]
    fn test_late_poll_starts_loop_on_the_boundary() {
        let mut f = fixture();
        f.time.set(0.5);
        f.store.toggle_loop("track1", "kick1").unwrap();
        f.store.toggle_loop("track2", "clap1").unwrap();

        // Crossing at 2.5 is noticed one poll late
        f.time.set(2.52);
        assert_eq!(f.store.poll(), Some(1));
        assert_eq!(f.player.start_times(), vec![0.5, 2.5]);
    }

    #[test]
    fn test_commits_apply_in_track_order() {
        let mut f = fixture();
        f.store.toggle_loop("track1", "kick1").unwrap();
        f.store.toggle_loop("track3", "tops1").unwrap();
        f.store.toggle_loop("track2", "clap1").unwrap();
        let mut events = f.store.subscribe();
        f.player.clear();

        f.time.set(2.0);
        f.store.poll();

        let started: Vec<String> = f
            .player
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PlayerEvent::Play { track_id, .. } => Some(track_id),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec!["track2", "track3"]);

        let mut committed = None;
        while let Ok(event) = events.try_recv() {
            if let LoopStoreEvent::Committed { bar, track_ids } = event {
                committed = Some((bar, track_ids));
            }
        }
        assert_eq!(
            committed,
            Some((1, vec!["track2".to_string(), "track3".to_string()]))
        );
    }

    #[test]
    fn test_set_playing_false_is_hard_reset() {
        let mut f = fixture();
        f.store.toggle_loop("track1", "kick1").unwrap();
        f.store.toggle_loop("track2", "clap1").unwrap();
        f.store.toggle_loop("track3", "tops1").unwrap();
        f.time.set(2.0);
        f.store.poll();
        f.store.toggle_loop("track4", "bass1").unwrap();

        f.time.set(2.7);
        f.store.set_playing(false);

        assert!(!f.store.is_playing());
        assert!(f
            .store
            .tracks()
            .iter()
            .all(|t| t.active_loop.is_none() && t.queued.is_none()));
        assert_eq!(f.player.events().last(), Some(&PlayerEvent::StopAll));
        assert_eq!(f.store.bar_position(), None);
    }

    #[test]
    fn test_set_bpm_validates_and_notifies() {
        let mut f = fixture();
        let mut events = f.store.subscribe();

        assert!(f.store.set_bpm(0.0).is_err());
        f.store.set_bpm(90.0).unwrap();
        assert_eq!(f.store.transport().bpm, 90.0);
        assert_eq!(
            events.try_recv().unwrap(),
            LoopStoreEvent::TransportChanged(Transport {
                is_playing: false,
                bpm: 90.0
            })
        );
    }

    #[test]
    fn test_stopped_store_does_not_poll() {
        let mut f = fixture();
        f.time.set(100.0);
        assert_eq!(f.store.poll(), None);
        assert!(!Pollable::is_running(&f.store));
    }
}
