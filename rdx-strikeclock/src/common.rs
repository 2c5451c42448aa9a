//! Contains common, primitive types shared across the Strikeclock engine.
//!
//! This module defines the phase enums that describe where a session is, the
//! key type used to track pending one-shot timers, and a small helper for
//! taking the controller locks.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

new_key_type! {
    /// Uniquely identifies a pending one-shot timer (a deferred beat or a
    /// duck expiry) owned by the metronome controller.
    ///
    /// Keys are never reused, so a timer that fires after being cancelled
    /// cannot be confused with a newer one.
    pub struct TimerId;
}

/// The coarse state of a training session.
///
/// Exactly one phase is active at any instant. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerPhase {
    Countdown,
    Work,
    Rest,
    Finished,
}

impl RunnerPhase {
    pub fn label(&self) -> &'static str {
        match self {
            RunnerPhase::Countdown => "COUNTDOWN",
            RunnerPhase::Work => "WORK",
            RunnerPhase::Rest => "REST",
            RunnerPhase::Finished => "DONE",
        }
    }
}

impl fmt::Display for RunnerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tracks the metronome pre-roll independently of the `RunnerPhase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountInPhase {
    Idle,
    Counting,
    Done,
}

/// Locks a controller mutex, recovering the guard if a previous holder panicked.
///
/// The guarded values are plain counters and flags, so a poisoned lock still
/// holds usable state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
