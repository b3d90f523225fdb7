//! Per-call simulation context.

use crate::config::CombatConfig;
use crate::random::RandomSource;

/// Milliseconds on the simulation clock.
pub type Millis = u64;

/// Everything a simulation step needs besides the characters themselves:
/// the current time, the random source and the tuning tables.
///
/// A context is built once per tick by the driver and threaded through every
/// call that can roll dice or read the clock.
pub struct SimContext<'a> {
    /// Current simulation time
    pub now: Millis,
    /// Random source for every roll in this step
    pub rng: &'a mut dyn RandomSource,
    /// Combat tuning
    pub config: &'a CombatConfig,
}

impl<'a> SimContext<'a> {
    /// Creates a context.
    pub fn new(now: Millis, rng: &'a mut dyn RandomSource, config: &'a CombatConfig) -> Self {
        Self { now, rng, config }
    }
}

impl std::fmt::Debug for SimContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext").field("now", &self.now).finish_non_exhaustive()
    }
}
