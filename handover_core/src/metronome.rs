//! Compression metronome and session elapsed timer.
//!
//! Both wrap a single [`TimerQueue`] handle. Scheduling a new timer always
//! cancels the previous handle first, so at most one compression timer and
//! one clock timer are ever live.

use crate::scheduler::{TimerId, TimerKind, TimerQueue};
use std::time::Duration;

/// Compressions per pulse-check interval
pub const DEFAULT_CYCLE_TARGET: u32 = 120;

/// Period of the elapsed-time display timer
pub const CLOCK_PERIOD: Duration = Duration::from_millis(1000);

/// Beat interval for a rate in compressions per minute (`60000 / bpm` ms)
pub fn interval_for(bpm: u32) -> Duration {
    Duration::from_millis(60_000 / u64::from(bpm.max(1)))
}

/// Result of a single compression beat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Beat {
    pub count: u32,
    /// The cycle target was reached on this beat
    pub cycle_complete: bool,
}

/// Beat generator and compression counter
#[derive(Debug)]
pub struct Metronome {
    rate: u32,
    cycle_target: u32,
    compression_count: u32,
    handle: Option<TimerId>,
}

impl Metronome {
    pub fn new(rate: u32, cycle_target: u32) -> Self {
        Self {
            rate: rate.max(1),
            cycle_target: cycle_target.max(1),
            compression_count: 0,
            handle: None,
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn interval(&self) -> Duration {
        interval_for(self.rate)
    }

    pub fn cycle_target(&self) -> u32 {
        self.cycle_target
    }

    pub fn compression_count(&self) -> u32 {
        self.compression_count
    }

    pub fn handle(&self) -> Option<TimerId> {
        self.handle
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start beating at the current rate, replacing any live timer
    pub fn start(&mut self, queue: &mut TimerQueue) {
        self.stop(queue);
        self.handle = Some(queue.schedule_every(TimerKind::Compression, self.interval()));
    }

    /// Cancel the beat timer; the compression count is kept
    pub fn stop(&mut self, queue: &mut TimerQueue) {
        if let Some(id) = self.handle.take() {
            queue.cancel(id);
        }
    }

    /// Change the rate; a running metronome is rescheduled at the new period
    /// without touching the compression count.
    pub fn set_rate(&mut self, bpm: u32, queue: &mut TimerQueue) {
        self.rate = bpm.max(1);
        if self.is_running() {
            self.start(queue);
        }
    }

    /// Count one compression
    pub fn tick(&mut self) -> Beat {
        self.compression_count += 1;
        Beat {
            count: self.compression_count,
            cycle_complete: self.compression_count >= self.cycle_target
                && self.compression_count % self.cycle_target == 0,
        }
    }

    pub fn reset_count(&mut self) {
        self.compression_count = 0;
    }

    /// `ceil(count / target)`
    pub fn current_cycle(&self) -> u32 {
        self.compression_count.div_ceil(self.cycle_target)
    }

    /// Position within the current cycle; shows the full target (not 0)
    /// on the boundary beat.
    pub fn cycle_progress(&self) -> u32 {
        let progress = self.compression_count % self.cycle_target;
        if progress == 0 && self.compression_count > 0 {
            self.cycle_target
        } else {
            progress
        }
    }
}

/// Wall-clock style elapsed timer for the active session
///
/// Elapsed time is measured from the start instant on the queue clock, so the
/// display timer's cadence never affects the recorded duration.
#[derive(Debug, Default)]
pub struct SessionTimer {
    started_at: Option<Duration>,
    handle: Option<TimerId>,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, queue: &mut TimerQueue) {
        self.stop(queue);
        self.started_at = Some(queue.now());
        self.handle = Some(queue.schedule_every(TimerKind::Clock, CLOCK_PERIOD));
    }

    /// Cancel the display timer and forget the start instant
    pub fn stop(&mut self, queue: &mut TimerQueue) {
        if let Some(id) = self.handle.take() {
            queue.cancel(id);
        }
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn handle(&self) -> Option<TimerId> {
        self.handle
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        self.started_at
            .map(|start| now.saturating_sub(start))
            .unwrap_or_default()
    }
}
