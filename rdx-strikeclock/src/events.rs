//! Defines all public event types broadcast by the Strikeclock engine.
//!
//! Presentation layers subscribe to these strongly-typed streams instead of
//! polling. Snapshots of the current state are available separately through
//! the engine handle.

use crate::common::RunnerPhase;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Which of the two preloaded sound instances carried a beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundSlot {
    A,
    B,
}

impl SoundSlot {
    pub fn other(self) -> Self {
        match self {
            SoundSlot::A => SoundSlot::B,
            SoundSlot::B => SoundSlot::A,
        }
    }
}

/// Events describing the lifecycle of a training session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Fired once when the session leaves its initial state.
    Started { phase: RunnerPhase, timestamp: DateTime<Utc> },
    /// Fired on every phase boundary.
    PhaseChanged {
        from: RunnerPhase,
        to: RunnerPhase,
        round: u32,
        seconds_left: u32,
    },
    /// Fired for each elapsed second that did not end the phase.
    Tick { phase: RunnerPhase, seconds_left: u32 },
    /// Fired whenever a cue is handed to the speaker.
    Spoke { text: String },
    /// Fired when the callout scheduler selects a callout.
    Callout { id: String, label: String, round: u32 },
    /// Fired when the metronome pre-roll has finished and the round clock runs.
    CountInFinished { round: u32 },
    Paused,
    Resumed,
    /// Fired once when the session reaches `Finished`.
    Finished {
        rounds_completed: u32,
        /// `false` when the session was stopped early.
        completed: bool,
        started_at: Option<DateTime<Utc>>,
        finished_at: DateTime<Utc>,
    },
}

/// Events emitted by the metronome controller.
#[derive(Debug, Clone, PartialEq)]
pub enum MetronomeEvent {
    Started { bpm: u32, count_in_beats: u32 },
    /// A beat was processed. `at` is when the controller handled it.
    Beat {
        beat_count: u64,
        slot: SoundSlot,
        at: Instant,
        count_in_remaining: u32,
    },
    CountInFinished,
    Paused { remainder: Duration },
    Resumed,
    Stopped,
    Ducked { duration: Duration },
    BpmChanged { bpm: u32 },
    VolumeChanged { volume: f32 },
}
