//! Ticket lock: first come, first served.
//!
//! Arriving threads take a ticket from `next_ticket` and wait for `now_serving` to reach it.  Acquisition order is
//! exactly ticket order, which makes this the fairness baseline.  The price is that every waiter polls the same word,
//! so each release invalidates the line in every waiting core's cache; see [crate::mcs_lock] for the fix.
use crossbeam::utils::CachePadded;

use crate::atomics::{release_fence, AtomicWord};
use crate::lock::RawLock;
use crate::sync::{spin_loop, Ordering};

#[derive(Debug, Default)]
pub struct TicketLock {
    next_ticket: CachePadded<AtomicWord>,
    now_serving: CachePadded<AtomicWord>,
}

impl TicketLock {
    #[cfg(not(loom))]
    pub const fn new() -> TicketLock {
        TicketLock {
            next_ticket: CachePadded::new(AtomicWord::new(0)),
            now_serving: CachePadded::new(AtomicWord::new(0)),
        }
    }

    #[cfg(loom)]
    pub fn new() -> TicketLock {
        TicketLock {
            next_ticket: CachePadded::new(AtomicWord::new(0)),
            now_serving: CachePadded::new(AtomicWord::new(0)),
        }
    }

    /// Take a ticket and wait for it to be served.  Returns the ticket.
    pub fn acquire(&self) -> usize {
        let my_ticket = self.next_ticket.fetch_and_increment();
        while self.now_serving.load(Ordering::Acquire) != my_ticket {
            spin_loop();
        }
        my_ticket
    }

    /// Acquire only if no ticket is outstanding.
    pub fn try_acquire(&self) -> bool {
        let serving = self.now_serving.load(Ordering::Acquire);
        // Succeeds only if nobody holds or waits, in which case the ticket taken is the one being served.
        self.next_ticket.bool_compare_and_swap(serving, serving.wrapping_add(1))
    }

    /// # Safety
    ///
    /// The calling thread must hold the lock.
    pub unsafe fn release(&self) {
        // Only the holder writes `now_serving`, so a load and a store is enough.
        let serving = self.now_serving.load(Ordering::Relaxed);
        debug_assert_ne!(
            serving,
            self.next_ticket.load(Ordering::Relaxed),
            "Released a ticket lock which was not held"
        );
        release_fence();
        self.now_serving.store(serving.wrapping_add(1), Ordering::Relaxed);
    }

    /// Racy snapshot, for diagnostics.
    pub fn is_locked(&self) -> bool {
        self.now_serving.load(Ordering::Relaxed) != self.next_ticket.load(Ordering::Relaxed)
    }

    /// How many threads hold or wait for the lock.  Racy snapshot, for diagnostics.
    pub fn queue_length(&self) -> usize {
        self.next_ticket
            .load(Ordering::Relaxed)
            .wrapping_sub(self.now_serving.load(Ordering::Relaxed))
    }
}

unsafe impl RawLock for TicketLock {
    type Node = ();

    fn acquire(&self, _node: &()) {
        TicketLock::acquire(self);
    }

    unsafe fn release(&self, _node: &()) {
        TicketLock::release(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::lock::Locked;
    use crate::sync::{spawn, Arc};

    #[test]
    fn tickets_are_sequential() {
        crate::sync::wrap_test(|| {
            let lock = TicketLock::new();
            for expected in 0..3 {
                assert_eq!(lock.acquire(), expected);
                assert_eq!(lock.queue_length(), 1);
                unsafe { lock.release() };
            }
            assert!(!lock.is_locked());
        });
    }

    #[test]
    fn try_acquire_only_when_free() {
        crate::sync::wrap_test(|| {
            let lock = TicketLock::new();
            assert!(lock.try_acquire());
            assert!(!lock.try_acquire());
            unsafe { lock.release() };
            assert!(lock.try_acquire());
            unsafe { lock.release() };
            assert_eq!(lock.queue_length(), 0);
        });
    }

    #[test]
    fn mutual_exclusion() {
        crate::sync::wrap_test(|| {
            let counter = Arc::new(Locked::<usize, TicketLock>::new(0));

            let handles = (0..2)
                .map(|_| {
                    let counter = counter.clone();
                    spawn(move || {
                        counter.lock_with(|c| {
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
