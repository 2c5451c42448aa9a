//! The look-ahead beat scheduler.
//!
//! The scheduler is polled every [`POLL_INTERVAL`], which is much finer than
//! the shortest supported beat spacing (about 273 ms at 220 BPM). Each poll
//! hands out every beat due inside the [`LOOKAHEAD`] window, either to fire
//! right away or to fire at an exact instant. The next beat time always
//! advances from the previously scheduled time and never from "now", so
//! polling jitter never accumulates into drift.

use crate::time::beat_interval;
use std::time::Duration;
use tokio::time::Instant;

pub const POLL_INTERVAL: Duration = Duration::from_millis(25);
pub const LOOKAHEAD: Duration = Duration::from_millis(100);

/// How a beat handed out by [`BeatScheduler::poll_once`] should be fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatFire {
    /// The beat is already due.
    Now,
    /// The beat is due at this instant, inside the look-ahead window.
    At(Instant),
}

/// Tracks when the next beat is due and whether polling should continue.
///
/// Each `start_at` opens a new generation. A poll loop compares its own
/// generation with the scheduler's before every cycle and exits once they
/// differ, so a restarted scheduler never has two live loops.
#[derive(Debug)]
pub struct BeatScheduler {
    next_beat_at: Instant,
    running: bool,
    generation: u64,
}

impl BeatScheduler {
    pub fn new() -> Self {
        Self {
            next_beat_at: Instant::now(),
            running: false,
            generation: 0,
        }
    }

    /// Starts scheduling with the first beat due at `at`. Returns the generation
    /// the driving poll loop must carry.
    pub fn start_at(&mut self, at: Instant) -> u64 {
        self.generation += 1;
        self.next_beat_at = at;
        self.running = true;
        self.generation
    }

    /// Stops scheduling. Any poll loop still alive exits on its next cycle.
    pub fn halt(&mut self) {
        if self.running {
            self.running = false;
            self.generation += 1;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether a poll loop carrying `generation` should keep polling.
    pub fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }

    pub fn next_beat_at(&self) -> Instant {
        self.next_beat_at
    }

    /// Moves the next beat earlier, e.g. when a deferred beat was cancelled
    /// before it could fire.
    pub fn rewind_to(&mut self, at: Instant) {
        if at < self.next_beat_at {
            self.next_beat_at = at;
        }
    }

    /// Time left until the next beat, floored at zero.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next_beat_at.saturating_duration_since(now)
    }

    /// Hands out every beat due before `now + LOOKAHEAD`.
    ///
    /// `bpm` is read per beat, so a tempo change applies from the next beat
    /// that is accounted for.
    pub fn poll_once(&mut self, now: Instant, bpm: u32) -> Vec<BeatFire> {
        let mut fires = Vec::new();
        if !self.running {
            return fires;
        }
        let horizon = now + LOOKAHEAD;
        while self.next_beat_at < horizon {
            if self.next_beat_at <= now {
                fires.push(BeatFire::Now);
            } else {
                fires.push(BeatFire::At(self.next_beat_at));
            }
            self.next_beat_at += beat_interval(bpm);
        }
        fires
    }
}

impl Default for BeatScheduler {
    fn default() -> Self {
        Self::new()
    }
}
