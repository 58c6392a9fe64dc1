//! Cooperative timer queue.
//!
//! A single-threaded stand-in for a host's interval timers. The queue owns a
//! monotonic clock (time since the queue was created) and a set of periodic
//! timers addressed by [`TimerId`] handles. Callers move the clock forward
//! with [`TimerQueue::pop_due`] / [`TimerQueue::advance_to`]; nothing fires on
//! its own, which keeps the CPR controller deterministic under test and lets a
//! real-time driver decide how to sleep between deadlines.

use std::time::Duration;

/// Handle to a scheduled timer; doubles as its cancellation token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// What a timer drives when it fires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Compression metronome beat
    Compression,
    /// Once-per-second elapsed time display
    Clock,
}

#[derive(Debug)]
struct Timer {
    id: TimerId,
    kind: TimerKind,
    period: Duration,
    next_due: Duration,
}

/// A timer that came due
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fired {
    pub id: TimerId,
    pub kind: TimerKind,
    /// Deadline the timer was scheduled for
    pub at: Duration,
}

/// Periodic timers over a manually advanced monotonic clock
#[derive(Debug, Default)]
pub struct TimerQueue {
    now: Duration,
    timers: Vec<Timer>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position of the queue's clock
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule a repeating timer; the first firing is one period from now
    ///
    /// A zero period is bumped to one millisecond so the queue can always
    /// make progress.
    pub fn schedule_every(&mut self, kind: TimerKind, period: Duration) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            kind,
            period,
            next_due: self.now + period,
        });
        tracing::trace!("Scheduled {:?} timer {:?} every {:?}", kind, id, period);
        id
    }

    /// Cancel a timer. Returns false if the handle was already dead.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        let removed = self.timers.len() != before;
        if removed {
            tracing::trace!("Cancelled timer {:?}", id);
        }
        removed
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    pub fn period_of(&self, id: TimerId) -> Option<Duration> {
        self.timers.iter().find(|t| t.id == id).map(|t| t.period)
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Earliest pending deadline, if any timer is live
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.iter().map(|t| t.next_due).min()
    }

    /// Pop the earliest timer due at or before `until`
    ///
    /// The clock moves to that timer's deadline and the timer is rescheduled
    /// one period later (drift-free). Ties go to the timer scheduled first.
    /// Returns `None` when nothing is due; the clock is left untouched.
    pub fn pop_due(&mut self, until: Duration) -> Option<Fired> {
        let timer = self
            .timers
            .iter_mut()
            .filter(|t| t.next_due <= until)
            .min_by_key(|t| (t.next_due, t.id.0))?;

        let fired = Fired {
            id: timer.id,
            kind: timer.kind,
            at: timer.next_due,
        };
        timer.next_due += timer.period;
        self.now = self.now.max(fired.at);
        Some(fired)
    }

    /// Move the clock forward to `t` without firing anything
    ///
    /// Callers are expected to drain [`pop_due`](Self::pop_due) first.
    pub fn advance_to(&mut self, t: Duration) {
        self.now = self.now.max(t);
    }
}
