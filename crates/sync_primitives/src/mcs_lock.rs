//! The Mellor-Crummey and Scott queue lock.
//!
//! Waiters form an implicit linked list of caller-owned [McsNode]s.  The lock itself is one word: a pointer to the last
//! node in the list, or null when free.  An arriving thread swaps its node into the tail and, if there was a
//! predecessor, links itself behind it and spins on the flag in *its own* node.  Releasing hands the lock to the
//! successor by clearing that flag.
//!
//! Because every waiter spins on a different cache line, a release touches exactly one remote cache line no matter how
//! many threads are waiting, which is the whole point compared to [crate::ticket_lock::TicketLock].  Acquisition order
//! is the order in which the tail swaps complete, so this is just as fair.
//!
//! The node must stay put from `acquire` until `release` returns; the lock holds a raw pointer to it.  Using
//! [RawLock::lock] or [crate::lock::Locked] enforces that by borrowing.
use std::ptr::null_mut;

use crossbeam::utils::CachePadded;

use crate::atomics::AtomicLink;
use crate::lock::RawLock;
use crate::sync::{spin_loop, AtomicBool, Ordering};

/// One thread's place in the queue for one acquisition.
#[derive(Debug, Default)]
pub struct McsNode {
    inner: CachePadded<NodeInner>,
}

#[derive(Debug, Default)]
struct NodeInner {
    /// True while this node's owner must keep waiting.  Written by the predecessor.
    locked: AtomicBool,

    /// The node which queued up behind this one.  Written by the successor.
    next: AtomicLink<McsNode>,
}

impl McsNode {
    pub fn new() -> McsNode {
        Default::default()
    }

    fn as_ptr(&self) -> *mut McsNode {
        self as *const McsNode as *mut McsNode
    }
}

#[derive(Debug, Default)]
pub struct McsLock {
    tail: AtomicLink<McsNode>,
}

impl McsLock {
    pub fn new() -> McsLock {
        Default::default()
    }

    pub fn acquire(&self, node: &McsNode) {
        node.inner.next.store(null_mut(), Ordering::Relaxed);

        let pred = self.tail.swap(node.as_ptr());
        if pred.is_null() {
            return;
        }

        node.inner.locked.store(true, Ordering::Relaxed);
        // The predecessor cannot finish releasing until it sees this link, so it outlives this borrow.
        let pred = unsafe { &*pred };
        pred.inner.next.store(node.as_ptr(), Ordering::Release);

        while node.inner.locked.load(Ordering::Acquire) {
            spin_loop();
        }
    }

    /// Acquire only if the lock is free, i.e. the queue is empty.
    pub fn try_acquire(&self, node: &McsNode) -> bool {
        node.inner.next.store(null_mut(), Ordering::Relaxed);
        self.tail.bool_compare_and_swap(null_mut(), node.as_ptr())
    }

    /// # Safety
    ///
    /// The lock must be held through `node`, which must not have moved since it was passed to `acquire`.
    pub unsafe fn release(&self, node: &McsNode) {
        debug_assert!(
            !self.tail.load(Ordering::Relaxed).is_null(),
            "Released an MCS lock which was not held"
        );

        let mut next = node.inner.next.load(Ordering::Acquire);
        if next.is_null() {
            if self.tail.bool_compare_and_swap(node.as_ptr(), null_mut()) {
                return;
            }

            // Someone swapped themselves into the tail but has not linked in yet.
            loop {
                next = node.inner.next.load(Ordering::Acquire);
                if !next.is_null() {
                    break;
                }
                spin_loop();
            }
        }

        // The successor spins until the store below, so its node lives at least that long.  After the store it may
        // return from acquire and free the node; don't touch it again.
        let next = &*next;
        next.inner.locked.store(false, Ordering::Release);
    }

    /// Racy snapshot, for diagnostics.
    pub fn is_locked(&self) -> bool {
        !self.tail.load(Ordering::Relaxed).is_null()
    }
}

unsafe impl RawLock for McsLock {
    type Node = McsNode;

    fn acquire(&self, node: &McsNode) {
        McsLock::acquire(self, node);
    }

    unsafe fn release(&self, node: &McsNode) {
        McsLock::release(self, node);
    }
}
