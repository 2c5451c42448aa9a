//! Time primitives: the per-second phase clock and beat interval maths.
//!
//! All timestamps are `tokio::time::Instant`, which is monotonic and is
//! virtualised when the runtime clock is paused in tests.

use std::future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// The resolution of the phase state machine.
pub const PHASE_TICK: Duration = Duration::from_secs(1);

/// Returns the spacing between two beats at the given tempo.
pub fn beat_interval(bpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / f64::from(bpm.max(1)))
}

/// Formats a number of seconds as `m:ss`.
pub fn format_clock(total_secs: u32) -> String {
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// A restartable one-second ticker that drives the phase state machine.
///
/// When stopped, `tick()` never resolves, so it can sit in a `select!` arm
/// unconditionally. Restarting always waits a full period before the first tick.
#[derive(Debug, Default)]
pub struct PhaseClock {
    interval: Option<Interval>,
    ticks: u64,
}

impl PhaseClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        let mut interval = interval_at(Instant::now() + PHASE_TICK, PHASE_TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.interval = Some(interval);
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// The number of ticks delivered since this clock was created.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Waits for the next tick and returns the running tick count.
    pub async fn tick(&mut self) -> u64 {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
                self.ticks += 1;
                self.ticks
            }
            None => future::pending().await,
        }
    }
}

/// Sleeps until `deadline`, or forever if there is none.
pub async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_interval() {
        assert_eq!(beat_interval(120), Duration::from_millis(500));
        assert_eq!(beat_interval(60), Duration::from_secs(1));
        let fast = beat_interval(220).as_secs_f64() * 1000.0;
        assert!((fast - 272.727).abs() < 0.01);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(180), "3:00");
        assert_eq!(format_clock(65), "1:05");
        assert_eq!(format_clock(9), "0:09");
        assert_eq!(format_clock(0), "0:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_clock_waits_a_full_period() {
        let mut clock = PhaseClock::new();
        assert!(!clock.is_running());
        let started = Instant::now();
        clock.start();
        assert_eq!(clock.tick().await, 1);
        assert_eq!(started.elapsed(), PHASE_TICK);
        assert_eq!(clock.tick().await, 2);
        assert_eq!(started.elapsed(), PHASE_TICK * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_clock_never_ticks() {
        let mut clock = PhaseClock::new();
        clock.start();
        clock.stop();
        let waited = tokio::time::timeout(Duration::from_secs(5), clock.tick()).await;
        assert!(waited.is_err());
        assert_eq!(clock.ticks(), 0);
    }
}
