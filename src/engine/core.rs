// EngineHandle - composition root for the loop board engine
//
// Owns one instance of every service and wires them to the single audio
// clock. Store mutations are serialized through one Mutex; schedulers run
// either on tokio interval tasks or are pumped by the host.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::{Builder, Runtime};
use tokio::sync::broadcast;

use crate::arrangement::{Arrangement, Clip};
use crate::audio::{AssetSource, AudioClock, AudioOutput, BufferCache, LoadReport, PlaybackHandle};
use crate::config::AppConfig;
use crate::engine::backend::{platform_backend, AudioBackend, TimeSource};
use crate::error::{log_transport_error, AudioError, TransportError};
use crate::kit::{LoopKit, SoundKit};
use crate::loops::{
    LoopPlaybackEngine, LoopPlayer, LoopStoreEvent, QuantizedLoopStore, TrackState, Transport,
};
use crate::scheduler::{spawn_poller, LookaheadScheduler, PollerHandle, StepClock, StepTick};
use crate::sequencer::{StepGrid, StepSequencer};

/// How scheduler polls are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    /// Interval tasks on the engine runtime
    Timers,
    /// The host calls [`EngineHandle::pump`], for example once per frame
    Manual,
}

/// What one [`EngineHandle::pump`] call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpReport {
    /// Bar index if a bar boundary was crossed
    pub bar: Option<i64>,
    /// Arrangement notes consumed by the lookahead scheduler
    pub notes: usize,
    /// Steps emitted by the step sequencer
    pub steps: Vec<StepTick>,
}

#[derive(Default)]
struct Pollers {
    store: Option<PollerHandle>,
    scheduler: Option<PollerHandle>,
    sequencer: Option<PollerHandle>,
}

impl Pollers {
    fn abort_all(&mut self) {
        for slot in [&mut self.store, &mut self.scheduler, &mut self.sequencer] {
            if let Some(poller) = slot.take() {
                poller.abort();
            }
        }
    }
}

#[derive(Clone, Copy)]
enum PollTarget {
    Store,
    Scheduler,
    Sequencer,
}

/// Main engine handle
pub struct EngineHandle {
    config: AppConfig,
    drive: DriveMode,
    runtime: Runtime,
    clock: Arc<AudioClock>,
    cache: Arc<BufferCache>,
    loops: Arc<LoopPlaybackEngine>,
    store: Arc<Mutex<QuantizedLoopStore>>,
    arrangement: Mutex<Arrangement>,
    scheduler: Arc<Mutex<LookaheadScheduler>>,
    sequencer: Arc<Mutex<StepSequencer>>,
    pollers: Mutex<Pollers>,
    closed: AtomicBool,
}

impl EngineHandle {
    /// Open the audio graph on `backend` and build every service on top of it.
    ///
    /// Schedulers are driven by interval timers.
    pub fn new(config: AppConfig, backend: Box<dyn AudioBackend>) -> Result<Self, AudioError> {
        Self::with_drive(config, backend, DriveMode::Timers)
    }

    /// Engine on the platform output device.
    pub fn with_platform_backend(config: AppConfig) -> Result<Self, AudioError> {
        Self::new(config, platform_backend())
    }

    pub fn with_drive(
        config: AppConfig,
        backend: Box<dyn AudioBackend>,
        drive: DriveMode,
    ) -> Result<Self, AudioError> {
        let config = config.validated()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("loopboard-engine")
            .enable_time()
            .build()?;

        let clock = Arc::new(AudioClock::open(&config.audio, backend)?);
        let output: Arc<dyn AudioOutput> = clock.clone();
        let time: Arc<dyn TimeSource> = clock.clone();

        let cache = Arc::new(BufferCache::new());
        let loops = Arc::new(LoopPlaybackEngine::new(
            Arc::clone(&output),
            Arc::clone(&cache),
        ));

        let store = QuantizedLoopStore::with_default_tracks(
            Arc::clone(&loops) as Arc<dyn LoopPlayer>,
            Arc::clone(&time),
            &config.transport,
        )
        .map_err(config_error)?
        .with_poll_interval(config.scheduler.poll_interval());

        let scheduler = LookaheadScheduler::new(Arc::clone(&output), &config.scheduler);

        let step_clock = StepClock::new(time, config.transport.default_bpm, &config.step_clock)
            .map_err(config_error)?;
        let sequencer = StepSequencer::new(
            step_clock,
            StepGrid::new(config.step_clock.step_count),
            output,
            Arc::clone(&cache),
        );

        log::info!(
            "[EngineHandle] Ready at {} BPM, drive={:?}",
            config.transport.default_bpm,
            drive
        );

        Ok(Self {
            config,
            drive,
            runtime,
            clock,
            cache,
            loops,
            store: Arc::new(Mutex::new(store)),
            arrangement: Mutex::new(Arrangement::default()),
            scheduler: Arc::new(Mutex::new(scheduler)),
            sequencer: Arc::new(Mutex::new(sequencer)),
            pollers: Mutex::new(Pollers::default()),
            closed: AtomicBool::new(false),
        })
    }

    // ========================================================================
    // ASSETS
    // ========================================================================

    /// Decode assets in parallel. Blocks until every asset settled.
    ///
    /// Must not be called from inside an async context.
    pub fn preload(&self, assets: Vec<(String, AssetSource)>) -> LoadReport {
        self.runtime.block_on(self.cache.preload(assets))
    }

    pub fn preload_loop_kit(&self, kit: &LoopKit, root: &Path) -> LoadReport {
        self.runtime.block_on(self.loops.preload_kit(kit, root))
    }

    pub fn preload_sound_kit(&self, kit: &SoundKit, root: &Path) -> LoadReport {
        self.preload(kit.assets(root))
    }

    // ========================================================================
    // LOOP BOARD
    // ========================================================================

    /// Start, queue or stop a loop on one track.
    pub fn toggle_loop(&self, track_id: &str, loop_id: &str) -> Result<(), TransportError> {
        {
            let mut store = self.lock_store()?;
            store.toggle_loop(track_id, loop_id).map_err(|err| {
                log_transport_error(&err, "toggle_loop");
                err
            })?;
        }
        self.ensure_poller(PollTarget::Store);
        Ok(())
    }

    /// Start or hard-stop the transport.
    ///
    /// Stopping also stops arrangement playback and the step sequencer.
    pub fn set_playing(&self, playing: bool) -> Result<(), TransportError> {
        self.lock_store()?.set_playing(playing);
        if playing {
            self.ensure_poller(PollTarget::Store);
            return Ok(());
        }

        self.stop_arrangement()?;
        self.stop_steps()?;
        self.lock_pollers().abort_all();
        Ok(())
    }

    /// Change the tempo of the loop board and the step sequencer.
    ///
    /// A running arrangement keeps the tempo it was started with.
    pub fn set_bpm(&self, bpm: f64) -> Result<(), TransportError> {
        self.lock_store()?.set_bpm(bpm)?;
        lock(&self.sequencer, "step_sequencer")?.set_bpm(bpm)
    }

    pub fn tracks(&self) -> Result<Vec<TrackState>, TransportError> {
        Ok(self.lock_store()?.tracks().to_vec())
    }

    pub fn track(&self, track_id: &str) -> Result<Option<TrackState>, TransportError> {
        Ok(self.lock_store()?.track(track_id).cloned())
    }

    pub fn transport(&self) -> Result<Transport, TransportError> {
        Ok(self.lock_store()?.transport())
    }

    /// Fractional bars since the transport started.
    pub fn bar_position(&self) -> Result<Option<f64>, TransportError> {
        Ok(self.lock_store()?.bar_position())
    }

    /// Loop store changes: track updates, transport updates and commits.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<LoopStoreEvent>, TransportError> {
        Ok(self.lock_store()?.subscribe())
    }

    /// `(track_id, loop_id)` pairs currently sounding.
    pub fn active_loops(&self) -> Vec<(String, String)> {
        self.loops.active_tracks()
    }

    // ========================================================================
    // ARRANGEMENT
    // ========================================================================

    pub fn arrangement(&self) -> Result<Arrangement, TransportError> {
        Ok(lock(&self.arrangement, "arrangement")?.clone())
    }

    pub fn set_arrangement(&self, arrangement: Arrangement) -> Result<(), TransportError> {
        *lock(&self.arrangement, "arrangement")? = arrangement;
        Ok(())
    }

    pub fn add_clip(&self, clip: Clip) -> Result<(), TransportError> {
        lock(&self.arrangement, "arrangement")?.add_clip(clip);
        Ok(())
    }

    pub fn remove_clip(&self, clip_id: &str) -> Result<bool, TransportError> {
        Ok(lock(&self.arrangement, "arrangement")?.remove_clip(clip_id))
    }

    /// Schedule the arrangement from the current audio time at the store tempo.
    ///
    /// Returns the number of notes handed off by the first poll.
    pub fn play_arrangement(&self) -> Result<usize, TransportError> {
        let bpm = self.lock_store()?.transport().bpm;
        let notes = lock(&self.arrangement, "arrangement")?.notes(bpm, &self.cache);
        let fired = {
            let mut scheduler = lock(&self.scheduler, "lookahead_scheduler")?;
            scheduler.set_notes(notes);
            scheduler.start()
        };
        self.ensure_poller(PollTarget::Scheduler);
        Ok(fired)
    }

    pub fn stop_arrangement(&self) -> Result<(), TransportError> {
        lock(&self.scheduler, "lookahead_scheduler")?.stop();
        if let Some(poller) = self.lock_pollers().scheduler.take() {
            poller.abort();
        }
        Ok(())
    }

    pub fn is_arrangement_playing(&self) -> Result<bool, TransportError> {
        Ok(lock(&self.scheduler, "lookahead_scheduler")?.is_running())
    }

    // ========================================================================
    // STEP SEQUENCER
    // ========================================================================

    pub fn start_steps(&self) -> Result<(), TransportError> {
        lock(&self.sequencer, "step_sequencer")?.start();
        self.ensure_poller(PollTarget::Sequencer);
        Ok(())
    }

    pub fn stop_steps(&self) -> Result<(), TransportError> {
        lock(&self.sequencer, "step_sequencer")?.stop();
        if let Some(poller) = self.lock_pollers().sequencer.take() {
            poller.abort();
        }
        Ok(())
    }

    pub fn reset_steps(&self) -> Result<(), TransportError> {
        lock(&self.sequencer, "step_sequencer")?.reset();
        Ok(())
    }

    /// Flip one grid step. `None` when `step` is out of range.
    pub fn toggle_step(&self, instrument_id: &str, step: usize) -> Result<Option<bool>, TransportError> {
        Ok(lock(&self.sequencer, "step_sequencer")?.toggle_step(instrument_id, step))
    }

    pub fn set_step_grid(&self, grid: StepGrid) -> Result<(), TransportError> {
        lock(&self.sequencer, "step_sequencer")?.set_grid(grid);
        Ok(())
    }

    pub fn step_grid(&self) -> Result<StepGrid, TransportError> {
        Ok(lock(&self.sequencer, "step_sequencer")?.grid().clone())
    }

    pub fn current_step(&self) -> Result<usize, TransportError> {
        Ok(lock(&self.sequencer, "step_sequencer")?.current_step())
    }

    /// Play one instrument right away.
    pub fn preview(&self, instrument_id: &str) -> Result<Option<PlaybackHandle>, TransportError> {
        Ok(lock(&self.sequencer, "step_sequencer")?.preview(instrument_id))
    }

    pub fn subscribe_steps(&self) -> Result<broadcast::Receiver<StepTick>, TransportError> {
        Ok(lock(&self.sequencer, "step_sequencer")?.subscribe())
    }

    // ========================================================================
    // DRIVING
    // ========================================================================

    /// Poll every running scheduler once, in store, arrangement, steps order.
    pub fn pump(&self) -> Result<PumpReport, TransportError> {
        let bar = self.lock_store()?.poll();
        let notes = lock(&self.scheduler, "lookahead_scheduler")?.tick();
        let steps = {
            let mut sequencer = lock(&self.sequencer, "step_sequencer")?;
            if sequencer.is_running() {
                sequencer.tick()
            } else {
                Vec::new()
            }
        };
        Ok(PumpReport { bar, notes, steps })
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.drive
    }

    // Spawns the timer for `target` unless one is alive. Must be called
    // without holding the target's lock.
    fn ensure_poller(&self, target: PollTarget) {
        if self.drive != DriveMode::Timers || self.closed.load(Ordering::Acquire) {
            return;
        }
        let handle = self.runtime.handle();
        let mut pollers = self.lock_pollers();
        match target {
            PollTarget::Store => respawn(&mut pollers.store, || {
                spawn_poller(handle, Arc::clone(&self.store), "loop_store")
            }),
            PollTarget::Scheduler => respawn(&mut pollers.scheduler, || {
                spawn_poller(handle, Arc::clone(&self.scheduler), "lookahead_scheduler")
            }),
            PollTarget::Sequencer => respawn(&mut pollers.sequencer, || {
                spawn_poller(handle, Arc::clone(&self.sequencer), "step_sequencer")
            }),
        }
    }

    // ========================================================================
    // CLOCK & LIFECYCLE
    // ========================================================================

    /// Hardware output time in seconds.
    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    pub fn clock(&self) -> &Arc<AudioClock> {
        &self.clock
    }

    pub fn cache(&self) -> &Arc<BufferCache> {
        &self.cache
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Cancel timers, silence everything and close the output graph.
    ///
    /// Safe to call more than once.
    pub fn close(&self) -> Result<(), AudioError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.lock_pollers().abort_all();

        if let Err(err) = self.set_playing(false) {
            log_transport_error(&err, "engine_close");
        }
        self.clock.close()
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, QuantizedLoopStore>, TransportError> {
        lock(&self.store, "loop_store")
    }

    fn lock_pollers(&self) -> MutexGuard<'_, Pollers> {
        self.pollers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, component: &str) -> Result<MutexGuard<'a, T>, TransportError> {
    mutex.lock().map_err(|_| TransportError::LockPoisoned {
        component: component.to_string(),
    })
}

fn respawn(slot: &mut Option<PollerHandle>, spawn: impl FnOnce() -> PollerHandle) {
    if slot.as_ref().map_or(true, PollerHandle::is_finished) {
        *slot = Some(spawn());
    }
}

fn config_error(err: TransportError) -> AudioError {
    AudioError::InvalidConfig {
        field: "transport.default_bpm".to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests;
