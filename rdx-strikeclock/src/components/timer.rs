//! Cancel-safe bookkeeping for one-shot timers.
//!
//! Every timer lives in a `SlotMap` until it either fires or is cancelled,
//! whichever happens first. The timer task must call [`TimerSet::complete`]
//! under the owner's lock before acting. If that returns `false`, the timer
//! was cancelled while it slept and must do nothing.

use crate::common::TimerId;
use slotmap::SlotMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What a pending timer will do when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// A beat that was due inside the look-ahead window.
    Beat,
    /// Restores the metronome volume after a duck.
    DuckExpiry,
}

struct PendingTimer {
    kind: TimerKind,
    due: Instant,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct TimerSet {
    timers: SlotMap<TimerId, PendingTimer>,
}

impl TimerSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a timer. `spawn` receives the new key and returns the task
    /// that sleeps until `due`.
    pub(crate) fn arm(
        &mut self,
        kind: TimerKind,
        due: Instant,
        spawn: impl FnOnce(TimerId) -> JoinHandle<()>,
    ) -> TimerId {
        self.timers.insert_with_key(|id| PendingTimer {
            kind,
            due,
            handle: spawn(id),
        })
    }

    /// Claims a timer that has woken up. Returns `false` if it was cancelled.
    pub(crate) fn complete(&mut self, id: TimerId) -> bool {
        self.timers.remove(id).is_some()
    }

    /// Cancels one timer. Cancelling a fired or already cancelled timer is a no-op.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.remove(id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every timer of `kind` and returns the earliest due time among them.
    pub(crate) fn cancel_kind(&mut self, kind: TimerKind) -> Option<Instant> {
        let ids: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.kind == kind)
            .map(|(id, _)| id)
            .collect();
        let mut earliest: Option<Instant> = None;
        for id in ids {
            if let Some(timer) = self.timers.remove(id) {
                timer.handle.abort();
                earliest = Some(earliest.map_or(timer.due, |e| e.min(timer.due)));
            }
        }
        earliest
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self, kind: TimerKind) -> usize {
        self.timers.values().filter(|timer| timer.kind == kind).count()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
