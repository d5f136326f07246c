//! Configuration management for engine timing and audio parameters
//!
//! This module provides runtime configuration loading from JSON files,
//! so scheduler windows and stream settings can be tuned without
//! recompilation. Missing or malformed files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{validate_bpm, AudioError, MAX_BPM, MIN_BPM};

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub step_clock: StepClockConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Output graph configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Requested output sample rate in Hz (backends may negotiate another)
    pub sample_rate: u32,
    /// Requested output channel count
    pub channels: u16,
    /// Capacity of the control -> audio thread command ring buffer
    pub command_queue_capacity: usize,
    /// Maximum simultaneously sounding voices in the renderer
    pub max_voices: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            command_queue_capacity: 256,
            max_voices: 64,
        }
    }
}

/// Lookahead scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Window ahead of "now" within which notes are handed to the graph
    pub lookahead_secs: f64,
    /// Poll period of the scheduler timer
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 0.1,
            poll_interval_ms: 25,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Step clock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepClockConfig {
    /// Poll period of the step clock timer
    pub poll_interval_ms: u64,
    /// How far ahead of "now" steps are emitted
    pub schedule_ahead_secs: f64,
    /// Lag beyond which the clock resyncs instead of catching up
    pub stall_threshold_secs: f64,
    /// Number of steps in the grid (16 = one bar of 1/16 notes)
    pub step_count: usize,
}

impl Default for StepClockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 25,
            schedule_ahead_secs: 0.1,
            stall_threshold_secs: 0.2,
            step_count: 16,
        }
    }
}

impl StepClockConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Global transport defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub default_bpm: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { default_bpm: 86.0 }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file doesn't exist or the
    /// JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the bundled assets directory
    pub fn load() -> Self {
        Self::load_from_file("assets/engine_config.json")
    }

    /// Check sizes and timing relationships.
    ///
    /// A lookahead shorter than four poll intervals is raised to that bound
    /// (a late poll would otherwise let notes slip past the window); zero
    /// sizes are rejected.
    pub fn validated(mut self) -> Result<Self, AudioError> {
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be greater than 0"));
        }
        if self.audio.channels == 0 {
            return Err(invalid("audio.channels", "must be greater than 0"));
        }
        if self.audio.command_queue_capacity == 0 {
            return Err(invalid(
                "audio.command_queue_capacity",
                "must be greater than 0",
            ));
        }
        if self.audio.max_voices == 0 {
            return Err(invalid("audio.max_voices", "must be greater than 0"));
        }
        if self.scheduler.poll_interval_ms == 0 {
            return Err(invalid("scheduler.poll_interval_ms", "must be greater than 0"));
        }
        if self.step_clock.poll_interval_ms == 0 {
            return Err(invalid(
                "step_clock.poll_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.step_clock.step_count == 0 {
            return Err(invalid("step_clock.step_count", "must be greater than 0"));
        }
        if validate_bpm(self.transport.default_bpm).is_err() {
            return Err(invalid(
                "transport.default_bpm",
                &format!("must be between {} and {}", MIN_BPM, MAX_BPM),
            ));
        }
        for (field, value) in [
            ("scheduler.lookahead_secs", self.scheduler.lookahead_secs),
            ("step_clock.schedule_ahead_secs", self.step_clock.schedule_ahead_secs),
            ("step_clock.stall_threshold_secs", self.step_clock.stall_threshold_secs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, "must be a finite positive number of seconds"));
            }
        }

        let min_lookahead = 4.0 * self.scheduler.poll_interval().as_secs_f64();
        if self.scheduler.lookahead_secs < min_lookahead {
            log::warn!(
                "[Config] lookahead {}s shorter than 4x poll interval, raising to {}s",
                self.scheduler.lookahead_secs,
                min_lookahead
            );
            self.scheduler.lookahead_secs = min_lookahead;
        }

        Ok(self)
    }
}

fn invalid(field: &str, reason: &str) -> AudioError {
    AudioError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
