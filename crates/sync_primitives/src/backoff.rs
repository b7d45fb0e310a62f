//! Exponential backoff for spinning retries.
//!
//! A thread which just lost a test-and-set or CAS race is better off waiting a little before trying again: the retry
//! would otherwise put another exclusive request for the cache line on the bus while the winner is trying to use it.
//! [Backoff] spins for a delay which grows geometrically with every failed attempt, up to a cap, so that latency stays
//! bounded.
use crate::sync::spin_loop;

/// Parameters for a [Backoff].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BackoffConfig {
    /// Spins performed on the first call to [Backoff::backoff].
    pub initial: u32,

    /// The delay is multiplied by this after every call.
    pub factor: u32,

    /// The delay never grows past this.
    pub cap: u32,
}

impl BackoffConfig {
    pub const DEFAULT: BackoffConfig = BackoffConfig {
        initial: 64,
        factor: 2,
        cap: 4096,
    };
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Caller-owned backoff state.  Create one per acquisition attempt.
#[derive(Clone, Debug)]
pub struct Backoff {
    delay: u32,
    config: BackoffConfig,
}

impl Backoff {
    pub fn new() -> Backoff {
        Self::with_config(BackoffConfig::DEFAULT)
    }

    pub fn with_config(config: BackoffConfig) -> Backoff {
        debug_assert!(config.initial <= config.cap);
        Backoff {
            delay: config.initial,
            config,
        }
    }

    /// The number of spins the next call to [Backoff::backoff] will perform.
    pub fn delay(&self) -> u32 {
        self.delay
    }

    /// Busy-wait for the current delay, then grow it.
    pub fn backoff(&mut self) {
        for _ in 0..self.spins() {
            spin_loop();
        }

        self.delay = self
            .delay
            .saturating_mul(self.config.factor)
            .min(self.config.cap);
    }

    /// Under loom every spin is a scheduling point, so one is plenty.
    #[cfg(loom)]
    fn spins(&self) -> u32 {
        1
    }

    #[cfg(not(loom))]
    fn spins(&self) -> u32 {
        self.delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
