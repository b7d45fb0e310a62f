//! The interface shared by every lock in this crate, plus the pieces built on top of it.
//!
//! Locks expose `acquire`/`release` directly rather than only through a guard, because the queue algorithms and the
//! benchmark harness want exactly that shape.  The MCS lock needs a per-acquisition record which the caller owns, so the
//! trait carries it as an associated type; locks which need nothing use `()`.
use std::cell::UnsafeCell;

use parking_lot::lock_api::RawMutex as _;

/// A mutual exclusion lock with explicit acquire and release.
///
/// # Safety
///
/// Implementations must guarantee that after `acquire` returns, no other call to `acquire` on the same lock returns
/// until the matching `release` has been called.
pub unsafe trait RawLock: Send + Sync {
    /// The record a caller supplies for one acquire/release pair.
    type Node: Default;

    /// Spin (or block, for [OsMutex]) until the lock is held through `node`.
    fn acquire(&self, node: &Self::Node);

    /// Release a lock previously acquired through `node`.
    ///
    /// # Safety
    ///
    /// The lock must currently be held through `node` by a call to `acquire` which has returned, and `node` must not have
    /// moved since.  Releasing a lock which is not held is undefined behavior.
    unsafe fn release(&self, node: &Self::Node);

    /// Acquire, returning a guard which releases when dropped.
    fn lock<'a>(&'a self, node: &'a Self::Node) -> LockGuard<'a, Self>
    where
        Self: Sized,
    {
        self.acquire(node);
        LockGuard { lock: self, node }
    }
}

/// Releases a [RawLock] when dropped.
///
/// The guard borrows the node, which pins it for as long as the lock is held.
pub struct LockGuard<'a, L: RawLock> {
    lock: &'a L,
    node: &'a L::Node,
}

impl<'a, L: RawLock> Drop for LockGuard<'a, L> {
    fn drop(&mut self) {
        // Only `RawLock::lock` builds guards, after a successful acquire through this node.
        unsafe { self.lock.release(self.node) }
    }
}

/// A value protected by a [RawLock].
pub struct Locked<T, L: RawLock> {
    lock: L,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send, L: RawLock> Sync for Locked<T, L> {}

impl<T, L: RawLock + Default> Locked<T, L> {
    pub fn new(value: T) -> Self {
        Self::with_lock(L::default(), value)
    }
}

impl<T, L: RawLock> Locked<T, L> {
    pub fn with_lock(lock: L, value: T) -> Self {
        Self {
            lock,
            value: UnsafeCell::new(value),
        }
    }

    /// Run `closure` with exclusive access to the value.
    ///
    /// The lock node lives on this stack frame for the duration of the call.
    pub fn lock_with<R>(&self, closure: impl FnOnce(&mut T) -> R) -> R {
        let node = L::Node::default();
        let _guard = self.lock.lock(&node);
        // The guard proves exclusive access until it drops, which is after the closure returns.
        closure(unsafe { &mut *self.value.get() })
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    pub fn raw(&self) -> &L {
        &self.lock
    }
}

/// The platform's blocking mutex, as a [RawLock].
///
/// Unlike everything else here this may put the thread to sleep.
pub struct OsMutex {
    inner: parking_lot::RawMutex,
}

impl OsMutex {
    pub fn new() -> OsMutex {
        OsMutex {
            inner: parking_lot::RawMutex::INIT,
        }
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OsMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsMutex")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

unsafe impl RawLock for OsMutex {
    type Node = ();

    fn acquire(&self, _node: &()) {
        self.inner.lock();
    }

    unsafe fn release(&self, _node: &()) {
        debug_assert!(self.inner.is_locked());
        self.inner.unlock();
    }
}
