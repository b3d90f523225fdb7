//! Tick timing.
//!
//! The simulation clock advances by a fixed step per tick. In realtime mode
//! the loop also sleeps off whatever is left of the tick budget.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ember_gameplay::Millis;

/// Fixed-step simulation clock.
#[derive(Debug)]
pub struct TickClock {
    /// Simulated milliseconds per tick
    tick_ms: Millis,
    /// Wall-clock budget per tick
    tick_budget: Duration,
    /// Ticks completed
    ticks: u64,
    /// Wall-clock start of the current tick
    tick_started: Instant,
    /// Sleep off the remaining budget
    realtime: bool,
    /// Recent tick durations in seconds
    tick_times: VecDeque<f32>,
    /// Maximum samples for averaging
    max_samples: usize,
}

impl TickClock {
    /// Create a clock stepping `tick_ms` simulated milliseconds per tick.
    #[must_use]
    pub fn new(tick_ms: Millis) -> Self {
        let tick_ms = tick_ms.max(1);
        Self {
            tick_ms,
            tick_budget: Duration::from_millis(tick_ms),
            ticks: 0,
            tick_started: Instant::now(),
            realtime: false,
            tick_times: VecDeque::with_capacity(120),
            max_samples: 120,
        }
    }

    /// Create with realtime pacing.
    #[must_use]
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Simulated time of the current tick.
    #[must_use]
    pub fn now(&self) -> Millis {
        self.ticks * self.tick_ms
    }

    /// Ticks completed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated milliseconds per tick.
    #[must_use]
    #[allow(dead_code)]
    pub fn tick_ms(&self) -> Millis {
        self.tick_ms
    }

    /// Finish the current tick: record how long it took, sleep off the rest
    /// of the budget in realtime mode, and advance the simulated clock.
    pub fn advance(&mut self) {
        let spent = self.tick_started.elapsed();
        self.tick_times.push_back(spent.as_secs_f32());
        if self.tick_times.len() > self.max_samples {
            self.tick_times.pop_front();
        }

        if self.realtime && spent < self.tick_budget {
            std::thread::sleep(self.tick_budget - spent);
        }

        self.ticks += 1;
        self.tick_started = Instant::now();
    }

    /// Average wall-clock time spent per tick in milliseconds.
    #[must_use]
    pub fn average_tick_time_ms(&self) -> f32 {
        if self.tick_times.is_empty() {
            return 0.0;
        }

        (self.tick_times.iter().sum::<f32>() / self.tick_times.len() as f32) * 1000.0
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(250)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_by_fixed_step() {
        let mut clock = TickClock::new(100);
        assert_eq!(clock.now(), 0);
        clock.advance();
        clock.advance();
        assert_eq!(clock.now(), 200);
        assert_eq!(clock.ticks(), 2);
    }

    #[test]
    fn test_zero_step_is_clamped() {
        let mut clock = TickClock::new(0);
        clock.advance();
        assert_eq!(clock.now(), 1);
    }

    #[test]
    fn test_average_tick_time() {
        let mut clock = TickClock::default();
        assert_eq!(clock.average_tick_time_ms(), 0.0);
        clock.advance();
        assert!(clock.average_tick_time_ms() >= 0.0);
        assert_eq!(clock.tick_ms(), 250);
    }
}
