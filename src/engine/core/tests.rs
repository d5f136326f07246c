use super::*;
use crate::arrangement::Clip;
use crate::engine::backend::ManualBackend;
use crate::loops::QueuedChange;
use crate::testing::fixtures::sine_sources;

const RATE: u32 = 8_000;

impl EngineHandle {
    /// Pumped engine on a manual backend at 120 BPM (one bar = 2 s).
    pub fn new_test() -> (Self, ManualBackend) {
        Self::new_test_with_drive(DriveMode::Manual)
    }

    pub fn new_test_with_drive(drive: DriveMode) -> (Self, ManualBackend) {
        let backend = ManualBackend::new(RATE, 1);
        let mut config = AppConfig::default();
        config.transport.default_bpm = 120.0;
        let engine = Self::with_drive(config, Box::new(backend.clone()), drive)
            .expect("manual backend always opens");
        let report = engine.preload(sine_sources(
            &["kick1", "kick2", "clap1", "tops1", "909-kick"],
            800,
            RATE,
        ));
        assert!(report.is_complete());
        (engine, backend)
    }
}

#[test]
fn test_first_toggle_starts_immediately() {
    let (engine, backend) = EngineHandle::new_test();
    engine.toggle_loop("track1", "kick1").unwrap();

    assert!(engine.transport().unwrap().is_playing);
    backend.advance(64);
    assert_eq!(engine.clock().active_voices(), 1);
    assert_eq!(
        engine.active_loops(),
        vec![("track1".to_string(), "kick1".to_string())]
    );
}

#[test]
fn test_switch_commits_on_bar_boundary() {
    let (engine, backend) = EngineHandle::new_test();
    engine.toggle_loop("track1", "kick1").unwrap();
    engine.toggle_loop("track1", "kick2").unwrap();

    backend.advance_seconds(1.9);
    assert_eq!(engine.pump().unwrap().bar, None);
    let track = engine.track("track1").unwrap().unwrap();
    assert_eq!(track.active_loop.as_deref(), Some("kick1"));
    assert_eq!(track.queued, Some(QueuedChange::Loop("kick2".to_string())));

    backend.advance_seconds(0.2);
    assert_eq!(engine.pump().unwrap().bar, Some(1));
    let track = engine.track("track1").unwrap().unwrap();
    assert_eq!(track.active_loop.as_deref(), Some("kick2"));
    assert_eq!(track.queued, None);

    backend.advance(64);
    assert_eq!(engine.clock().active_voices(), 1, "old loop stopped");
}

#[test]
fn test_set_playing_false_clears_every_track() {
    let (engine, backend) = EngineHandle::new_test();
    engine.toggle_loop("track1", "kick1").unwrap();
    engine.toggle_loop("track2", "clap1").unwrap();
    engine.toggle_loop("track3", "tops1").unwrap();
    backend.advance_seconds(2.1);
    engine.pump().unwrap();
    assert_eq!(engine.active_loops().len(), 3);

    // Mid-bar stop is immediate
    backend.advance_seconds(0.7);
    engine.set_playing(false).unwrap();

    assert!(!engine.transport().unwrap().is_playing);
    assert!(engine.tracks().unwrap().iter().all(|t| t.is_idle() && t.queued.is_none()));
    assert!(engine.active_loops().is_empty());
    backend.advance(64);
    assert_eq!(engine.clock().active_voices(), 0);
}

#[test]
fn test_arrangement_plays_through_pump() {
    let (engine, backend) = EngineHandle::new_test();
    engine
        .set_arrangement(Arrangement::new(vec![
            Clip::new("a", "track1", "kick1", 0, 1),
            Clip::new("b", "track2", "clap1", 1, 1),
        ]))
        .unwrap();

    assert_eq!(engine.play_arrangement().unwrap(), 1);
    assert!(engine.is_arrangement_playing().unwrap());

    backend.advance_seconds(1.0);
    assert_eq!(engine.pump().unwrap().notes, 0);
    backend.advance_seconds(0.95);
    assert_eq!(engine.pump().unwrap().notes, 1, "bar 1 enters the window");
    assert_eq!(engine.pump().unwrap().notes, 0, "never scheduled twice");

    engine.stop_arrangement().unwrap();
    assert!(!engine.is_arrangement_playing().unwrap());
}

#[test]
fn test_step_sequencer_uses_audio_clock() {
    let (engine, backend) = EngineHandle::new_test();
    assert_eq!(engine.toggle_step("909-kick", 0).unwrap(), Some(true));
    engine.start_steps().unwrap();

    let report = engine.pump().unwrap();
    assert_eq!(report.steps, vec![StepTick { index: 0, time: 0.0 }]);

    backend.advance_seconds(0.05);
    let report = engine.pump().unwrap();
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].index, 1);
    assert!((report.steps[0].time - 0.125).abs() < 1e-9);

    engine.stop_steps().unwrap();
    assert!(engine.pump().unwrap().steps.is_empty());
}

#[test]
fn test_set_bpm_updates_transport() {
    let (engine, _backend) = EngineHandle::new_test();
    assert!(matches!(
        engine.set_bpm(0.0),
        Err(TransportError::BpmInvalid { .. })
    ));
    engine.set_bpm(100.0).unwrap();
    assert_eq!(engine.transport().unwrap().bpm, 100.0);
}

#[test]
fn test_unknown_track_is_rejected() {
    let (engine, _backend) = EngineHandle::new_test();
    assert!(matches!(
        engine.toggle_loop("track9", "kick1"),
        Err(TransportError::UnknownTrack { .. })
    ));
    assert!(!engine.transport().unwrap().is_playing);
}

#[test]
fn test_subscribe_reports_commits() {
    let (engine, backend) = EngineHandle::new_test();
    let mut rx = engine.subscribe().unwrap();
    engine.toggle_loop("track1", "kick1").unwrap();
    engine.toggle_loop("track1", "kick1").unwrap();
    backend.advance_seconds(2.05);
    engine.pump().unwrap();

    let mut committed = None;
    while let Ok(event) = rx.try_recv() {
        if let LoopStoreEvent::Committed { bar, track_ids } = event {
            committed = Some((bar, track_ids));
        }
    }
    assert_eq!(committed, Some((1, vec!["track1".to_string()])));
}

#[test]
fn test_close_is_idempotent() {
    let (engine, backend) = EngineHandle::new_test();
    engine.toggle_loop("track1", "kick1").unwrap();

    engine.close().unwrap();
    engine.close().unwrap();
    assert!(engine.clock().is_closed());
    assert!(!backend.is_running());
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = AppConfig::default();
    config.audio.sample_rate = 0;
    let result = EngineHandle::with_drive(
        config,
        Box::new(ManualBackend::new(RATE, 1)),
        DriveMode::Manual,
    );
    assert!(matches!(result, Err(AudioError::InvalidConfig { .. })));
}

#[test]
fn test_timers_commit_without_pump() {
    let (engine, backend) = EngineHandle::new_test_with_drive(DriveMode::Timers);
    engine.toggle_loop("track1", "kick1").unwrap();
    engine.toggle_loop("track1", "kick2").unwrap();

    backend.advance_seconds(2.1);
    std::thread::sleep(std::time::Duration::from_millis(250));

    let track = engine.track("track1").unwrap().unwrap();
    assert_eq!(track.active_loop.as_deref(), Some("kick2"));
    engine.close().unwrap();
}
