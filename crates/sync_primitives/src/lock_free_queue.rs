//! The non-blocking queue of Michael and Scott.
//!
//! Like [crate::two_lock_queue::TwoLockQueue], this is a linked list with a dummy node at the front, but head, tail and
//! every link are [TaggedAtomic]s and every update is a [TaggedAtomic::wide_compare_and_swap] which moves the
//! generation forward.  A thread which finds the tail lagging behind the true last node helps move it along rather than
//! waiting, so some operation always completes.
//!
//! Nodes are indices into a [NodeArena].  Two separate hazards are closed:
//!
//! - ABA on head, tail and links: a snapshot taken before a slot was recycled carries an older generation, so CASing
//!   against it fails.
//! - Reading a slot after it has been reused: a dequeue reads the value out of a node before knowing whether it won,
//!   and that read must not race with a new enqueue writing the same slot.  Retired nodes go back to the arena only once
//!   every thread which was pinned when they were retired has unpinned, via crossbeam's epoch scheme.
use std::sync::Arc;

use crossbeam::epoch;
use crossbeam::utils::CachePadded;

use crate::atomics::{TaggedAtomic, TaggedIndex, NULL_INDEX};
use crate::error::{AllocError, EnqueueError, Result};
use crate::node_arena::{NodeArena, Slot};
use crate::queue::ConcurrentQueue;
use crate::sync::Ordering;

/// Retired nodes are reclaimed two epochs after retirement, and each flush advances the epoch at most once.
const RECLAIM_ATTEMPTS: usize = 4;

pub struct LockFreeQueue<T> {
    head: CachePadded<TaggedAtomic>,
    tail: CachePadded<TaggedAtomic>,

    /// Shared with deferred reclamation, which may run after the queue is gone.
    arena: Arc<NodeArena<T>>,
}

impl<T> LockFreeQueue<T> {
    pub fn new() -> LockFreeQueue<T> {
        Self::from_arena(NodeArena::new())
    }

    /// A queue which will never use more than `limit` nodes at once.
    ///
    /// The dummy node counts, as do dequeued nodes waiting to be reclaimed.  Once the limit is reached and reclamation
    /// cannot free anything up, enqueue fails with [AllocError::Exhausted].
    pub fn with_node_limit(limit: u32) -> LockFreeQueue<T> {
        Self::from_arena(NodeArena::with_limit(limit.max(1)))
    }

    fn from_arena(arena: NodeArena<T>) -> LockFreeQueue<T> {
        let dummy = match arena.allocate() {
            Ok(i) => i,
            Err(_) => std::alloc::handle_alloc_error(std::alloc::Layout::new::<Slot<T>>()),
        };

        LockFreeQueue {
            head: CachePadded::new(TaggedAtomic::new(TaggedIndex::new(0, dummy))),
            tail: CachePadded::new(TaggedAtomic::new(TaggedIndex::new(0, dummy))),
            arena: Arc::new(arena),
        }
    }

    /// The most nodes this queue will ever use, dummy included.
    pub fn node_limit(&self) -> u32 {
        self.arena.capacity()
    }

    pub fn enqueue(&self, value: T) -> Result<(), EnqueueError<T>> {
        let index = match self.allocate_node() {
            Ok(i) => i,
            Err(cause) => {
                log::warn!("Lock-free queue could not get a node: {}", cause);
                return Err(EnqueueError { value, cause });
            }
        };

        let node = self.arena.slot(index);
        // Unpublished, so ours alone.
        unsafe { (*node.value.get()).write(value) };
        // A reused slot keeps counting up from wherever its link's generation was.
        let old_next = node.next.load(Ordering::Relaxed);
        node.next.store(old_next.successor(NULL_INDEX), Ordering::Relaxed);

        let _guard = epoch::pin();

        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let tail_next = &self.arena.slot(tail.raw_index()).next;
            let next = tail_next.load(Ordering::Acquire);

            if tail != self.tail.load(Ordering::Acquire) {
                continue;
            }

            match next.index() {
                None => {
                    // The CAS publishes the value written above.
                    if tail_next.wide_compare_and_swap(next, next.successor(index)) {
                        // If this fails, somebody already helped.
                        self.tail.wide_compare_and_swap(tail, tail.successor(index));
                        return Ok(());
                    }
                }
                Some(last) => {
                    self.tail.wide_compare_and_swap(tail, tail.successor(last));
                }
            }
        }
    }

    /// Get a node from the arena.  At the limit, push reclamation along a few times before giving up.
    fn allocate_node(&self) -> Result<u32> {
        let mut attempts = 0;
        loop {
            match self.arena.allocate() {
                Err(AllocError::Exhausted { .. }) if attempts < RECLAIM_ATTEMPTS => {
                    attempts += 1;
                    // A fresh pin each time: a guard held across attempts would keep the epoch from advancing.
                    epoch::pin().flush();
                }
                r => return r,
            }
        }
    }

    pub fn dequeue(&self) -> Option<T> {
        let guard = epoch::pin();

        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let next = self
                .arena
                .slot(head.raw_index())
                .next
                .load(Ordering::Acquire);

            if head != self.head.load(Ordering::Acquire) {
                continue;
            }

            if head.raw_index() == tail.raw_index() {
                // Empty, unless the tail is lagging.
                let last = next.index()?;
                self.tail.wide_compare_and_swap(tail, tail.successor(last));
                continue;
            }

            // Head is behind tail, so this is only null if the snapshot was inconsistent.
            let Some(first) = next.index() else {
                continue;
            };

            // Read before the CAS: once head moves past `first`, another dequeue may take and retire it.  Only the
            // winner keeps the copy.
            let value = unsafe { std::ptr::read(self.arena.slot(first).value.get()) };

            if self.head.wide_compare_and_swap(head, head.successor(first)) {
                let arena = self.arena.clone();
                let retired = head.raw_index();
                // The closure only touches the arena, which it keeps alive itself.
                unsafe { guard.defer_unchecked(move || arena.recycle(retired)) };
                if self.arena.is_limited() {
                    // Otherwise the node sits in this thread's local bag until that fills, which a small limit never
                    // lets it do.
                    guard.flush();
                }
                return Some(unsafe { value.assume_init() });
            }
        }
    }

    /// Racy snapshot.
    pub fn is_empty(&self) -> bool {
        let _guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire);
        self.arena
            .slot(head.raw_index())
            .next
            .load(Ordering::Acquire)
            .is_null()
    }

    /// Generation of the head pointer, which moves forward once per successful dequeue or head update.
    pub fn head_generation(&self) -> u32 {
        self.head.load(Ordering::Relaxed).generation()
    }

    /// Generation of the tail pointer, which moves forward once per tail update.
    pub fn tail_generation(&self) -> u32 {
        self.tail.load(Ordering::Relaxed).generation()
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        let mut dropped = 0usize;

        let dummy = self.head.load(Ordering::Relaxed);
        let mut cur = self.arena.slot(dummy.raw_index()).next.load(Ordering::Relaxed);
        while let Some(index) = cur.index() {
            let slot = self.arena.slot(index);
            // Everything after the dummy holds a value nobody dequeued.
            unsafe { (*slot.value.get()).assume_init_drop() };
            dropped += 1;
            cur = slot.next.load(Ordering::Relaxed);
        }

        if dropped > 0 {
            log::debug!("Dropped a lock-free queue with {} values still queued", dropped);
        }

        // Give pending reclamation a chance to run so the arena is not held any longer than needed.
        epoch::pin().flush();
    }
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T: Send> ConcurrentQueue<T> for LockFreeQueue<T> {
    fn enqueue(&self, value: T) -> Result<(), EnqueueError<T>> {
        LockFreeQueue::enqueue(self, value)
    }

    fn dequeue(&self) -> Option<T> {
        LockFreeQueue::dequeue(self)
    }

    fn is_empty(&self) -> bool {
        LockFreeQueue::is_empty(self)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    use proptest::prelude::*;

    #[test]
    fn fifo_and_empty() {
        let queue = LockFreeQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);

        for i in 0..500u32 {
            queue.enqueue(i).unwrap();
        }
        assert!(!queue.is_empty());

        let got = std::iter::from_fn(|| queue.dequeue()).collect::<Vec<_>>();
        pretty_assertions::assert_eq!(got, (0..500).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn every_successful_cas_bumps_a_generation() {
        let queue = LockFreeQueue::new();
        assert_eq!((queue.head_generation(), queue.tail_generation()), (0, 0));

        for i in 0..10u32 {
            queue.enqueue(i).unwrap();
            assert_eq!(queue.tail_generation(), i + 1);
        }

        for i in 0..10u32 {
            assert_eq!(queue.dequeue(), Some(i));
            assert_eq!(queue.head_generation(), i + 1);
        }

        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.head_generation(), 10);
    }

    /// Keep the queue cycling until the slot under a stale head snapshot has been reclaimed and is the head again.  The
    /// stale snapshot must then fail to CAS even though its index matches.
    #[test]
    fn stale_head_cannot_win_after_reuse() {
        let queue = LockFreeQueue::with_node_limit(8);
        let stale = queue.head.load(Ordering::Relaxed);

        let mut reused = false;
        for i in 0..1_000_000u32 {
            queue.enqueue(i).unwrap_or_else(|_| {
                // Everything is waiting on reclamation; let it catch up.
                epoch::pin().flush();
            });
            queue.dequeue();
            epoch::pin().flush();

            let now = queue.head.load(Ordering::Relaxed);
            if now.raw_index() == stale.raw_index() && now != stale {
                reused = true;
                break;
            }
        }

        assert!(reused, "The original dummy's slot was never reused");
        assert!(!queue
            .head
            .wide_compare_and_swap(stale, stale.successor(stale.raw_index())));
        assert!(queue.head_generation() > stale.generation());
    }

    #[test]
    fn node_limit_reports_exhaustion() {
        let queue = LockFreeQueue::with_node_limit(4);
        assert_eq!(queue.node_limit(), 4);

        for i in 0..3 {
            queue.enqueue(i).unwrap();
        }

        let err = queue.enqueue(3).unwrap_err();
        assert_eq!(err.cause, AllocError::Exhausted { capacity: 4 });
        assert_eq!(err.into_inner(), 3);

        // Unchanged by the failure.
        let got = std::iter::from_fn(|| queue.dequeue()).collect::<Vec<_>>();
        assert_eq!(got, vec![0, 1, 2]);
    }

    /// Nodes retired by a consumer on another thread, which is still alive and idle, must come back to a producer
    /// that has hit the limit.
    #[test]
    fn limit_recovers_after_dequeues_on_another_thread() {
        use std::sync::mpsc;

        let queue = Arc::new(LockFreeQueue::with_node_limit(4));
        for i in 0..3u32 {
            queue.enqueue(i).unwrap();
        }
        assert!(queue.enqueue(3).is_err());

        let (drained_tx, drained_rx) = mpsc::channel();
        let (finish_tx, finish_rx) = mpsc::channel::<()>();
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                let got = std::iter::from_fn(|| queue.dequeue()).collect::<Vec<_>>();
                drained_tx.send(got).unwrap();
                // Stay alive, so the thread's local garbage is not handed over by thread exit.
                finish_rx.recv().unwrap();
            })
        };

        assert_eq!(drained_rx.recv().unwrap(), vec![0, 1, 2]);
        assert!(queue.is_empty());

        // Other tests share the global collector and may hold the epoch back for a moment.
        let mut enqueued = 0;
        for i in 0..10_000u32 {
            if queue.enqueue(i).is_ok() {
                enqueued += 1;
                if enqueued == 3 {
                    break;
                }
            } else {
                std::thread::yield_now();
            }
        }
        assert_eq!(enqueued, 3, "Retired nodes were never reclaimed");

        finish_tx.send(()).unwrap();
        consumer.join().unwrap();
        assert!(queue.dequeue().is_some());
    }

    #[test]
    fn drop_releases_queued_values() {
        let counted = Arc::new(());

        let queue = LockFreeQueue::new();
        for _ in 0..10 {
            queue.enqueue(counted.clone()).unwrap();
        }
        drop(queue.dequeue());
        assert_eq!(Arc::strong_count(&counted), 10);

        drop(queue);
        assert_eq!(Arc::strong_count(&counted), 1);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Enqueue(u16),
        Dequeue,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u16>().prop_map(Op::Enqueue), Just(Op::Dequeue)]
    }

    proptest! {
        #[test]
        fn matches_vecdeque(ops in prop::collection::vec(op_strategy(), 0..200)) {
            let queue = LockFreeQueue::new();
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    Op::Enqueue(v) => {
                        queue.enqueue(v).unwrap();
                        model.push_back(v);
                    }
                    Op::Dequeue => prop_assert_eq!(queue.dequeue(), model.pop_front()),
                }
                prop_assert_eq!(queue.is_empty(), model.is_empty());
            }
        }
    }
}
