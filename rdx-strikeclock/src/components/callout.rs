//! Random callout selection and timing for work phases.

use crate::config::{Callout, SessionConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::Instant;

/// Lets the "Fight!"/"Round N" announcement finish before the first callout.
pub const GRACE_DELAY: Duration = Duration::from_secs(1);

/// How a freshly armed scheduler computes its first deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalloutArm {
    /// The grace delay, then a random delay. Used when a round begins.
    AfterGrace,
    /// A random delay only. Used when resuming mid-round.
    Fresh,
}

/// Picks a random enabled callout after a random whole-second delay.
///
/// The scheduler only computes deadlines. The owner sleeps until
/// [`CalloutScheduler::deadline`] and then calls [`CalloutScheduler::fire`].
#[derive(Debug)]
pub struct CalloutScheduler {
    callouts: Vec<Callout>,
    min_secs: u32,
    max_secs: u32,
    rng: StdRng,
    deadline: Option<Instant>,
}

impl CalloutScheduler {
    /// Snapshots the enabled callouts of `config`.
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: &SessionConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SessionConfig, rng: StdRng) -> Self {
        let min_secs = config.callout_interval_min.min(config.callout_interval_max).max(1);
        let max_secs = config.callout_interval_max.max(min_secs);
        Self {
            callouts: config.enabled_callouts(),
            min_secs,
            max_secs,
            rng,
            deadline: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.callouts.is_empty()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A uniform delay in `[min, max]` whole seconds.
    pub fn next_delay(&mut self) -> Duration {
        Duration::from_secs(self.rng.gen_range(self.min_secs..=self.max_secs).into())
    }

    /// Arms the next callout relative to `now`. Does nothing without callouts.
    pub fn arm(&mut self, arm: CalloutArm, now: Instant) {
        if self.is_empty() {
            self.deadline = None;
            return;
        }
        let delay = self.next_delay();
        self.deadline = Some(match arm {
            CalloutArm::AfterGrace => now + GRACE_DELAY + delay,
            CalloutArm::Fresh => now + delay,
        });
    }

    /// Discards the pending wait. Safe to call when nothing is armed.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Selects a callout for the deadline that just passed and re-arms the
    /// next one from that deadline.
    pub fn fire(&mut self) -> Option<Callout> {
        let due = self.deadline?;
        let picked = self.callouts.choose(&mut self.rng).cloned()?;
        let delay = self.next_delay();
        self.deadline = Some(due + delay);
        Some(picked)
    }
}
