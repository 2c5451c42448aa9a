//! Defines all configuration structures for a Strikeclock session.
//!
//! A session is configured once, up front, by a single `SessionConfig`. It is
//! typically loaded from a TOML file layered with `STRIKECLOCK__*` environment
//! overrides. Every value passes through the same sanitizing rules, so
//! malformed or missing fields fall back to safe defaults instead of failing
//! the session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 220;

pub const DEFAULT_ROUNDS: u32 = 3;
pub const DEFAULT_ROUND_SECS: u32 = 180;
pub const DEFAULT_REST_SECS: u32 = 60;
pub const DEFAULT_COUNTDOWN_SECS: u32 = 10;
pub const DEFAULT_CALLOUT_MIN_SECS: u32 = 3;
pub const DEFAULT_CALLOUT_MAX_SECS: u32 = 8;

const MAX_ROUNDS: u32 = 99;
const MAX_ROUND_SECS: u32 = 1800;
const MAX_REST_SECS: u32 = 600;
const MAX_COUNTDOWN_SECS: u32 = 30;
const MAX_COUNT_IN_BEATS: u32 = 16;
const MAX_CALLOUT_SECS: u32 = 60;

/// Ids of user-added callouts start here, clear of the built-in catalogue.
const FIRST_CUSTOM_CALLOUT_ID: u64 = 1000;

/// Errors raised while reading a configuration source.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read session configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// The available metronome click sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundId {
    Click,
    Woodblock,
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundId::Click => f.write_str("click"),
            SoundId::Woodblock => f.write_str("woodblock"),
        }
    }
}

/// A single spoken training cue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callout {
    pub id: String,
    pub label: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Callout {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            enabled: true,
        }
    }

    /// Flips the `enabled` flag.
    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }
}

/// Metronome settings for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetronomeConfig {
    pub enabled: bool,
    /// Beats per minute, 40-220 inclusive.
    pub bpm: u32,
    pub sound_id: SoundId,
    /// 0.0-1.0.
    pub volume: f32,
    pub count_in_enabled: bool,
    pub count_in_beats: u32,
    /// Keep clicking through rest periods instead of pausing.
    pub play_during_rest: bool,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bpm: 120,
            sound_id: SoundId::Click,
            volume: 0.6,
            count_in_enabled: true,
            count_in_beats: 4,
            play_during_rest: false,
        }
    }
}

impl MetronomeConfig {
    /// Whether starting with a count-in will actually pre-roll any beats.
    pub fn has_count_in(&self) -> bool {
        self.enabled && self.count_in_enabled && self.count_in_beats > 0
    }
}

/// The immutable configuration of a single training session.
///
/// Deserialization accepts loosely-typed input and sanitizes it, see
/// [`SessionConfig::sanitized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSessionConfig")]
pub struct SessionConfig {
    pub rounds: u32,
    pub round_duration_secs: u32,
    pub rest_duration_secs: u32,
    pub countdown_duration_secs: u32,
    pub callout_interval_min: u32,
    pub callout_interval_max: u32,
    pub callouts: Vec<Callout>,
    pub metronome: MetronomeConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            round_duration_secs: DEFAULT_ROUND_SECS,
            rest_duration_secs: DEFAULT_REST_SECS,
            countdown_duration_secs: DEFAULT_COUNTDOWN_SECS,
            callout_interval_min: DEFAULT_CALLOUT_MIN_SECS,
            callout_interval_max: DEFAULT_CALLOUT_MAX_SECS,
            callouts: default_callouts(),
            metronome: MetronomeConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Applies the fallback and clamping rules to every field.
    ///
    /// Zero counts and durations fall back to defaults (rest and countdown
    /// may legitimately be zero), values above their limits are clamped, an
    /// inverted callout interval is swapped, and metronome tempo and volume
    /// are clamped to their ranges.
    pub fn sanitized(self) -> Self {
        RawSessionConfig::from(self).into()
    }

    /// The enabled subset of the catalogue, in catalogue order.
    pub fn enabled_callouts(&self) -> Vec<Callout> {
        self.callouts.iter().filter(|c| c.enabled).cloned().collect()
    }

    /// Flips the callout with the given id. Returns `false` if no such callout exists.
    pub fn toggle_callout(&mut self, id: &str) -> bool {
        match self.callouts.iter_mut().find(|c| c.id == id) {
            Some(callout) => {
                callout.toggle();
                true
            }
            None => false,
        }
    }

    /// Appends an enabled, user-defined callout.
    ///
    /// Returns the new id, or `None` if `label` is blank.
    pub fn add_custom_callout(&mut self, label: &str) -> Option<String> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }
        let next = self
            .callouts
            .iter()
            .filter_map(|c| c.id.parse::<u64>().ok())
            .filter(|id| *id >= FIRST_CUSTOM_CALLOUT_ID)
            .max()
            .map_or(FIRST_CUSTOM_CALLOUT_ID, |id| id + 1);
        let id = next.to_string();
        self.callouts.push(Callout::new(id.clone(), label));
        Some(id)
    }

    /// Loads a configuration from an optional TOML file plus `STRIKECLOCK__*`
    /// environment overrides (e.g. `STRIKECLOCK__METRONOME__BPM=150`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("STRIKECLOCK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Like [`SessionConfig::load`], but logs a failure and returns defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("{}. Falling back to the default session.", e);
            Self::default()
        })
    }

    /// Parses a TOML document, sanitizing every field.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let parsed = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(parsed.try_deserialize()?)
    }
}

/// The built-in callout catalogue, all enabled.
pub fn default_callouts() -> Vec<Callout> {
    const LABELS: [&str; 17] = [
        // Single techniques, standard numbered boxing system.
        "Jab",
        "Cross",
        "Lead Hook",
        "Rear Hook",
        "Lead Uppercut",
        "Rear Uppercut",
        "Body",
        "Slip",
        "Roll",
        // Combinations.
        "1-2",
        "1-1-2",
        "1-2-3",
        "1-2-3-2",
        "1-2-5-2",
        "3-2",
        "2-3-2",
        "1-6-3-2",
    ];
    LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| Callout::new((i + 1).to_string(), *label))
        .collect()
}

// --- Boundary representation and sanitizing rules ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSessionConfig {
    rounds: Option<i64>,
    round_duration_secs: Option<i64>,
    rest_duration_secs: Option<i64>,
    countdown_duration_secs: Option<i64>,
    callout_interval_min: Option<i64>,
    callout_interval_max: Option<i64>,
    callouts: Option<Vec<Callout>>,
    metronome: Option<RawMetronomeConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetronomeConfig {
    enabled: Option<bool>,
    bpm: Option<f64>,
    sound_id: Option<SoundId>,
    volume: Option<f64>,
    count_in_enabled: Option<bool>,
    count_in_beats: Option<i64>,
    play_during_rest: Option<bool>,
}

impl From<RawSessionConfig> for SessionConfig {
    fn from(raw: RawSessionConfig) -> Self {
        let mut min = positive(raw.callout_interval_min, DEFAULT_CALLOUT_MIN_SECS, MAX_CALLOUT_SECS);
        let mut max = positive(raw.callout_interval_max, DEFAULT_CALLOUT_MAX_SECS, MAX_CALLOUT_SECS);
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }
        Self {
            rounds: positive(raw.rounds, DEFAULT_ROUNDS, MAX_ROUNDS),
            round_duration_secs: positive(raw.round_duration_secs, DEFAULT_ROUND_SECS, MAX_ROUND_SECS),
            rest_duration_secs: non_negative(raw.rest_duration_secs, DEFAULT_REST_SECS, MAX_REST_SECS),
            countdown_duration_secs: non_negative(
                raw.countdown_duration_secs,
                DEFAULT_COUNTDOWN_SECS,
                MAX_COUNTDOWN_SECS,
            ),
            callout_interval_min: min,
            callout_interval_max: max,
            callouts: raw.callouts.unwrap_or_else(default_callouts),
            metronome: raw.metronome.unwrap_or_default().into(),
        }
    }
}

impl From<RawMetronomeConfig> for MetronomeConfig {
    fn from(raw: RawMetronomeConfig) -> Self {
        let defaults = MetronomeConfig::default();
        Self {
            enabled: raw.enabled.unwrap_or(defaults.enabled),
            bpm: raw.bpm.map_or(defaults.bpm, clamp_bpm_f64),
            sound_id: raw.sound_id.unwrap_or(defaults.sound_id),
            volume: raw
                .volume
                .filter(|v| v.is_finite())
                .map_or(defaults.volume, |v| v.clamp(0.0, 1.0) as f32),
            count_in_enabled: raw.count_in_enabled.unwrap_or(defaults.count_in_enabled),
            count_in_beats: non_negative(raw.count_in_beats, defaults.count_in_beats, MAX_COUNT_IN_BEATS),
            play_during_rest: raw.play_during_rest.unwrap_or(defaults.play_during_rest),
        }
    }
}

impl From<SessionConfig> for RawSessionConfig {
    fn from(config: SessionConfig) -> Self {
        let m = config.metronome;
        Self {
            rounds: Some(config.rounds.into()),
            round_duration_secs: Some(config.round_duration_secs.into()),
            rest_duration_secs: Some(config.rest_duration_secs.into()),
            countdown_duration_secs: Some(config.countdown_duration_secs.into()),
            callout_interval_min: Some(config.callout_interval_min.into()),
            callout_interval_max: Some(config.callout_interval_max.into()),
            callouts: Some(config.callouts),
            metronome: Some(RawMetronomeConfig {
                enabled: Some(m.enabled),
                bpm: Some(m.bpm.into()),
                sound_id: Some(m.sound_id),
                volume: Some(m.volume.into()),
                count_in_enabled: Some(m.count_in_enabled),
                count_in_beats: Some(m.count_in_beats.into()),
                play_during_rest: Some(m.play_during_rest),
            }),
        }
    }
}

/// Clamps a tempo to the supported range.
pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

fn clamp_bpm_f64(bpm: f64) -> u32 {
    if bpm.is_nan() {
        return MetronomeConfig::default().bpm;
    }
    bpm.round().clamp(f64::from(MIN_BPM), f64::from(MAX_BPM)) as u32
}

fn positive(value: Option<i64>, default: u32, max: u32) -> u32 {
    match value {
        Some(v) if v > 0 => v.min(i64::from(max)) as u32,
        _ => default,
    }
}

fn non_negative(value: Option<i64>, default: u32, max: u32) -> u32 {
    match value {
        Some(v) if v >= 0 => v.min(i64::from(max)) as u32,
        _ => default,
    }
}

fn default_enabled() -> bool {
    true
}
