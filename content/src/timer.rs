use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use host::Clock;

/// Snapshot of a [`ReviewTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewTimerState {
    pub accumulated_ms: u64,
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Active time spent on a problem: counts only while the page is visible and focused.
pub struct ReviewTimer {
    clock: Rc<dyn Clock>,
    accumulated_ms: u64,
    started_at: Option<DateTime<Utc>>,
    /// Highest value reported since the last reset; keeps readings monotonic
    /// when the wall clock steps backwards.
    high_water_ms: Cell<u64>,
}

impl ReviewTimer {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            accumulated_ms: 0,
            started_at: None,
            high_water_ms: Cell::new(0),
        }
    }

    /// Start counting. No-op when already running or when the page is not
    /// both visible and focused. Returns whether the timer is running.
    pub fn start(&mut self, page_active: bool) -> bool {
        if self.started_at.is_none() && page_active {
            self.started_at = Some(self.clock.now());
        }
        self.is_running()
    }

    /// Fold the running span into the accumulator and stop.
    pub fn pause(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            let folded = self.accumulated_ms + self.span_since(started_at);
            self.accumulated_ms = folded.max(self.high_water_ms.get());
        }
    }

    pub fn reset(&mut self) {
        self.accumulated_ms = 0;
        self.started_at = None;
        self.high_water_ms.set(0);
    }

    pub fn elapsed_ms(&self) -> u64 {
        let live = self.started_at.map_or(0, |started_at| self.span_since(started_at));
        let elapsed = (self.accumulated_ms + live).max(self.high_water_ms.get());
        self.high_water_ms.set(elapsed);
        elapsed
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn state(&self) -> ReviewTimerState {
        ReviewTimerState {
            accumulated_ms: self.accumulated_ms,
            running: self.is_running(),
            started_at: self.started_at,
        }
    }

    fn span_since(&self, started_at: DateTime<Utc>) -> u64 {
        u64::try_from((self.clock.now() - started_at).num_milliseconds()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use host::ManualClock;

    fn timer() -> (ReviewTimer, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::at_millis(1_000_000));
        (ReviewTimer::new(clock.clone()), clock)
    }

    #[test]
    fn test_start_requires_active_page() {
        let (mut timer, clock) = timer();
        assert!(!timer.start(false));
        clock.advance_ms(5_000);
        assert_eq!(timer.elapsed_ms(), 0);

        assert!(timer.start(true));
        clock.advance_ms(2_000);
        assert_eq!(timer.elapsed_ms(), 2_000);
    }

    #[test]
    fn test_start_while_running_keeps_original_start() {
        let (mut timer, clock) = timer();
        timer.start(true);
        clock.advance_ms(1_000);
        timer.start(true);
        clock.advance_ms(1_000);
        assert_eq!(timer.elapsed_ms(), 2_000);
    }

    #[test]
    fn test_pause_and_resume_keep_accumulated_time() {
        let (mut timer, clock) = timer();
        timer.start(true);
        clock.advance_ms(3_000);
        timer.pause();
        clock.advance_ms(60_000);
        assert_eq!(timer.elapsed_ms(), 3_000);
        assert!(!timer.is_running());

        timer.start(true);
        clock.advance_ms(500);
        assert_eq!(timer.elapsed_ms(), 3_500);
        assert_eq!(timer.state().accumulated_ms, 3_000);
    }

    #[test]
    fn test_reset_zeroes_and_stops() {
        let (mut timer, clock) = timer();
        timer.start(true);
        clock.advance_ms(3_000);
        timer.reset();
        clock.advance_ms(3_000);
        assert_eq!(timer.elapsed_ms(), 0);
        assert_eq!(
            timer.state(),
            ReviewTimerState {
                accumulated_ms: 0,
                running: false,
                started_at: None
            }
        );
    }

    #[test]
    fn test_clock_going_backwards_never_decreases_elapsed() {
        let (mut timer, clock) = timer();
        timer.start(true);
        clock.advance_ms(4_000);
        assert_eq!(timer.elapsed_ms(), 4_000);

        clock.advance_ms(-10_000);
        assert_eq!(timer.elapsed_ms(), 4_000);
        timer.pause();
        assert_eq!(timer.elapsed_ms(), 4_000);
    }
}
