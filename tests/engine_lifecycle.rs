use loopboard_engine::engine::{DriveMode, EngineHandle, ManualBackend};
use loopboard_engine::loops::QueuedChange;
use loopboard_engine::testing::fixtures::{dc_wav_bytes, sine_sources};
use loopboard_engine::{AppConfig, Arrangement, AssetSource, Clip, StepGrid};

const RATE: u32 = 8_000;

fn engine(bpm: f64) -> (EngineHandle, ManualBackend) {
    let backend = ManualBackend::new(RATE, 1);
    let mut config = AppConfig::default();
    config.transport.default_bpm = bpm;
    let engine = EngineHandle::with_drive(config, Box::new(backend.clone()), DriveMode::Manual)
        .expect("manual engine");
    (engine, backend)
}

#[test]
fn loop_board_session() {
    let (engine, backend) = engine(120.0);
    let report = engine.preload(sine_sources(&["kick1", "kick2", "bass1"], 400, RATE));
    assert!(report.is_complete());

    // First press plays right away
    engine.toggle_loop("track1", "kick1").unwrap();
    let track = engine.track("track1").unwrap().unwrap();
    assert_eq!(track.active_loop.as_deref(), Some("kick1"));
    assert_eq!(track.queued, None);
    assert!(engine.transport().unwrap().is_playing);

    // Later presses wait for the bar
    engine.toggle_loop("track1", "kick2").unwrap();
    engine.toggle_loop("track4", "bass1").unwrap();
    backend.advance_seconds(0.5);
    engine.pump().unwrap();
    assert_eq!(
        engine.track("track1").unwrap().unwrap().queued,
        Some(QueuedChange::Loop("kick2".to_string()))
    );

    backend.advance_seconds(1.6);
    assert_eq!(engine.pump().unwrap().bar, Some(1));
    assert_eq!(
        engine.active_loops(),
        vec![
            ("track1".to_string(), "kick2".to_string()),
            ("track4".to_string(), "bass1".to_string()),
        ]
    );

    // Same pad again queues a stop
    engine.toggle_loop("track4", "bass1").unwrap();
    backend.advance_seconds(2.0);
    assert_eq!(engine.pump().unwrap().bar, Some(2));
    assert!(engine.track("track4").unwrap().unwrap().is_idle());

    engine.set_playing(false).unwrap();
    assert!(engine.active_loops().is_empty());
    engine.close().unwrap();
}

#[test]
fn broken_asset_does_not_block_siblings() {
    let (engine, _backend) = engine(120.0);
    let report = engine.preload(vec![
        ("kick1".to_string(), AssetSource::Bytes(dc_wav_bytes(64, 1000, RATE))),
        ("clap1".to_string(), AssetSource::Bytes(b"not a wav".to_vec())),
    ]);

    assert_eq!(report.loaded, vec!["kick1".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert!(engine.cache().is_unavailable("clap1"));

    // Unavailable clips are filtered out of the arrangement
    engine.set_arrangement(Arrangement::demo()).unwrap();
    assert_eq!(engine.play_arrangement().unwrap(), 1);
}

#[test]
fn arrangement_renders_clip_on_its_bar() {
    let (engine, backend) = engine(120.0);
    engine.preload(vec![(
        "chords1".to_string(),
        AssetSource::Bytes(dc_wav_bytes(100, i16::MAX / 2, RATE)),
    )]);
    engine
        .add_clip(Clip::new("c", "track5", "chords1", 1, 1))
        .unwrap();
    assert_eq!(engine.play_arrangement().unwrap(), 0);

    // Pump every 25 ms of audio and collect what the graph rendered
    let mut rendered = Vec::new();
    for _ in 0..100 {
        engine.pump().unwrap();
        rendered.extend(backend.advance(200));
    }

    let first = rendered.iter().position(|&s| s != 0.0).expect("clip sounded");
    assert_eq!(first, 2 * RATE as usize, "starts exactly on bar 1");
    assert!(rendered[first + 100..].iter().all(|&s| s == 0.0));
}

#[test]
fn step_grid_plays_on_audio_clock() {
    let (engine, backend) = engine(120.0);
    engine.preload(vec![(
        "909-kick".to_string(),
        AssetSource::Bytes(dc_wav_bytes(10, i16::MAX / 2, RATE)),
    )]);
    let mut grid = StepGrid::new(4);
    grid.set("909-kick", 2, true);
    engine.set_step_grid(grid).unwrap();
    engine.start_steps().unwrap();

    let mut rendered = Vec::new();
    for _ in 0..20 {
        engine.pump().unwrap();
        rendered.extend(backend.advance(200));
    }

    // Step 2 of 0.125 s steps starts at frame 2000
    let first = rendered.iter().position(|&s| s != 0.0).expect("step sounded");
    assert_eq!(first, 2_000);

    engine.reset_steps().unwrap();
    assert_eq!(engine.current_step().unwrap(), 0);
}

#[test]
fn stopping_steps_silences_scheduled_hits() {
    let (engine, backend) = engine(120.0);
    engine.preload(vec![(
        "909-kick".to_string(),
        AssetSource::Bytes(dc_wav_bytes(100, i16::MAX / 2, RATE)),
    )]);
    let mut grid = StepGrid::new(16);
    grid.set("909-kick", 1, true);
    engine.set_step_grid(grid).unwrap();
    engine.start_steps().unwrap();

    backend.advance_seconds(0.05);
    let report = engine.pump().unwrap();
    assert!(report.steps.iter().any(|tick| tick.index == 1 && tick.time == 0.125));

    engine.stop_steps().unwrap();
    let rendered = backend.advance(2_000);
    assert!(rendered.iter().all(|&s| s == 0.0), "hit at 0.125s must not sound");
}
