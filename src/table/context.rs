//! Time and randomness handed to every session operation.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

/// Source of the current time.
pub trait Clock: Debug + Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }

    /// Jumps to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clock and random generator for one command.
///
/// Sessions never read the wall clock or global randomness directly, so a
/// command replayed with the same context yields the same result.
#[derive(Debug)]
pub struct TableContext {
    clock: Arc<dyn Clock>,
    rng: ChaCha8Rng,
}

impl TableContext {
    /// Context from explicit parts.
    pub fn new(clock: Arc<dyn Clock>, rng: ChaCha8Rng) -> Self {
        Self { clock, rng }
    }

    /// Wall clock with a seeded generator.
    pub fn seeded(seed: u64) -> Self {
        Self::new(Arc::new(SystemClock), ChaCha8Rng::seed_from_u64(seed))
    }

    /// Current time at millisecond precision.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(3)
    }

    /// Generator for this command.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}
