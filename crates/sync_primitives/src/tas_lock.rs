//! Test-and-set spin lock with exponential backoff.
//!
//! The simplest lock there is: one word, `0` when free.  Acquiring is winning a [AtomicWord::test_and_set] race.
//! Losers back off before retrying.  There is no fairness whatsoever; an unlucky thread can lose every race.
use crate::atomics::{acquire_fence, release_fence, AtomicWord};
use crate::backoff::{Backoff, BackoffConfig};
use crate::lock::RawLock;
use crate::sync::Ordering;

#[derive(Debug)]
pub struct TasLock {
    flag: AtomicWord,
    backoff: BackoffConfig,
}

impl TasLock {
    #[cfg(not(loom))]
    pub const fn new() -> TasLock {
        Self::with_backoff(BackoffConfig::DEFAULT)
    }

    #[cfg(loom)]
    pub fn new() -> TasLock {
        Self::with_backoff(BackoffConfig::DEFAULT)
    }

    #[cfg(not(loom))]
    pub const fn with_backoff(backoff: BackoffConfig) -> TasLock {
        TasLock {
            flag: AtomicWord::new(0),
            backoff,
        }
    }

    #[cfg(loom)]
    pub fn with_backoff(backoff: BackoffConfig) -> TasLock {
        TasLock {
            flag: AtomicWord::new(0),
            backoff,
        }
    }

    pub fn acquire(&self) {
        if self.flag.test_and_set() != 0 {
            self.acquire_slow();
        }
        acquire_fence();
    }

    #[cold]
    fn acquire_slow(&self) {
        let mut backoff = Backoff::with_config(self.backoff);
        loop {
            backoff.backoff();
            if self.flag.test_and_set() == 0 {
                return;
            }
        }
    }

    /// Acquire only if nobody holds the lock right now.
    pub fn try_acquire(&self) -> bool {
        if self.flag.test_and_set() != 0 {
            return false;
        }
        acquire_fence();
        true
    }

    /// # Safety
    ///
    /// The lock must be held.  Which thread acquired it is not tracked; any thread following the acquire/release
    /// discipline may release.
    pub unsafe fn release(&self) {
        debug_assert_ne!(
            self.flag.load(Ordering::Relaxed),
            0,
            "Released a TAS lock which was not held"
        );
        release_fence();
        self.flag.store(0, Ordering::Relaxed);
    }

    /// Racy snapshot, for diagnostics.
    pub fn is_locked(&self) -> bool {
        self.flag.load(Ordering::Relaxed) != 0
    }
}

impl Default for TasLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawLock for TasLock {
    type Node = ();

    fn acquire(&self, _node: &()) {
        TasLock::acquire(self);
    }

    unsafe fn release(&self, _node: &()) {
        TasLock::release(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::lock::Locked;
    use crate::sync::{spawn, Arc};

    #[test]
    fn try_acquire_fails_while_held() {
        crate::sync::wrap_test(|| {
            let lock = TasLock::new();
            assert!(lock.try_acquire());
            assert!(lock.is_locked());
            assert!(!lock.try_acquire());
            unsafe { lock.release() };
            assert!(!lock.is_locked());
            assert!(lock.try_acquire());
        });
    }

    #[test]
    fn mutual_exclusion() {
        crate::sync::wrap_test(|| {
            let counter = Arc::new(Locked::<usize, TasLock>::new(0));

            let handles = (0..2)
                .map(|_| {
                    let counter = counter.clone();
                    spawn(move || {
                        counter.lock_with(|c| {
                            // Split so that a second thread inside the lock would lose one of the increments.
                            let seen = *c;
                            crate::sync::yield_now();
                            *c = seen + 1;
                        });
                    })
                })
                .collect::<Vec<_>>();

            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(counter.lock_with(|c| *c), 2);
        });
    }
}
