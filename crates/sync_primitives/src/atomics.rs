//! The atomic operations every lock and queue in this crate is built from.
//!
//! These are thin wrappers over the platform's native atomic types.  All read-modify-write operations are sequentially
//! consistent with respect to each other, so callers can reason about them the way they would about the classic
//! `cas`/`tas`/`fai`/`swap` primitives, without picking orderings per call.  Plain `load` and `store` take an explicit
//! ordering, since the protocols above this layer only use them for words they know to be stable or monotonic.
//!
//! The double-width operation is [TaggedAtomic::wide_compare_and_swap], which replaces a `(generation, index)` pair as
//! one unit.  The pair is packed into a single 64-bit word, so it is available everywhere a 64-bit CAS is, and loom can
//! see it.
use std::ptr::null_mut;

use crate::sync::{fence, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

/// The value [AtomicWord::test_and_set] leaves behind.
pub const SET: usize = 1;

/// Index value meaning "no node".
pub const NULL_INDEX: u32 = u32::MAX;

/// A machine word which is only ever touched through atomic operations.
#[derive(Debug, Default)]
pub struct AtomicWord {
    inner: AtomicUsize,
}

impl AtomicWord {
    #[cfg(not(loom))]
    pub const fn new(value: usize) -> AtomicWord {
        AtomicWord {
            inner: AtomicUsize::new(value),
        }
    }

    #[cfg(loom)]
    pub fn new(value: usize) -> AtomicWord {
        AtomicWord {
            inner: AtomicUsize::new(value),
        }
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> usize {
        self.inner.load(ordering)
    }

    #[inline]
    pub fn store(&self, value: usize, ordering: Ordering) {
        self.inner.store(value, ordering)
    }

    /// Write `desired` if the word currently holds `expected`.
    ///
    /// Returns the value which was observed, which equals `expected` exactly when the write happened.
    #[inline]
    pub fn compare_and_swap(&self, expected: usize, desired: usize) -> usize {
        match self
            .inner
            .compare_exchange(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(v) | Err(v) => v,
        }
    }

    /// Like [AtomicWord::compare_and_swap], but only reports whether the write happened.
    #[inline]
    pub fn bool_compare_and_swap(&self, expected: usize, desired: usize) -> bool {
        self.compare_and_swap(expected, desired) == expected
    }

    /// Write [SET] and return the previous value.
    #[inline]
    pub fn test_and_set(&self) -> usize {
        self.inner.swap(SET, Ordering::SeqCst)
    }

    #[inline]
    pub fn swap(&self, value: usize) -> usize {
        self.inner.swap(value, Ordering::SeqCst)
    }

    /// Add one, returning the value before the increment.
    #[inline]
    pub fn fetch_and_increment(&self) -> usize {
        self.fetch_and_add(1)
    }

    /// Add `amount` with wrapping, returning the value before the addition.
    #[inline]
    pub fn fetch_and_add(&self, amount: usize) -> usize {
        self.inner.fetch_add(amount, Ordering::SeqCst)
    }

    /// The same as [AtomicWord::fetch_and_add], but built only from [AtomicWord::compare_and_swap].
    ///
    /// This is what targets without a native fetch-and-add do, and is kept so that the fallback stays tested.
    pub fn fetch_and_add_cas(&self, amount: usize) -> usize {
        let mut found = self.inner.load(Ordering::Relaxed);
        loop {
            let expected = found;
            found = self.compare_and_swap(expected, expected.wrapping_add(amount));
            if found == expected {
                return found;
            }
        }
    }
}

/// A nullable pointer which is only ever touched through atomic operations.
///
/// Same operations as [AtomicWord], over `*mut T`.
#[derive(Debug)]
pub struct AtomicLink<T> {
    inner: AtomicPtr<T>,
}

impl<T> AtomicLink<T> {
    pub fn null() -> AtomicLink<T> {
        AtomicLink {
            inner: AtomicPtr::new(null_mut()),
        }
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> *mut T {
        self.inner.load(ordering)
    }

    #[inline]
    pub fn store(&self, ptr: *mut T, ordering: Ordering) {
        self.inner.store(ptr, ordering)
    }

    #[inline]
    pub fn swap(&self, ptr: *mut T) -> *mut T {
        self.inner.swap(ptr, Ordering::SeqCst)
    }

    #[inline]
    pub fn compare_and_swap(&self, expected: *mut T, desired: *mut T) -> *mut T {
        match self
            .inner
            .compare_exchange(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(p) | Err(p) => p,
        }
    }

    #[inline]
    pub fn bool_compare_and_swap(&self, expected: *mut T, desired: *mut T) -> bool {
        self.compare_and_swap(expected, desired) == expected
    }
}

impl<T> Default for AtomicLink<T> {
    fn default() -> Self {
        Self::null()
    }
}

/// A `(generation, index)` pair, read from or written to a [TaggedAtomic].
///
/// The index addresses a node in some arena, with [NULL_INDEX] standing in for null.  The generation exists to defeat
/// ABA: every successful CAS through this type moves it forward, so a snapshot taken before some other thread recycled
/// the same index can never compare equal to what is stored afterwards.
///
/// Wraparound needs 2^32 successful CAS operations on one word between a load and the CAS that uses it.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct TaggedIndex {
    generation: u32,
    index: u32,
}

#[inline(always)]
fn pack(generation: u32, index: u32) -> u64 {
    ((generation as u64) << 32) | (index as u64)
}

impl TaggedIndex {
    pub const fn new(generation: u32, index: u32) -> TaggedIndex {
        TaggedIndex { generation, index }
    }

    pub const fn null() -> TaggedIndex {
        Self::new(0, NULL_INDEX)
    }

    #[inline(always)]
    fn unpack(val: u64) -> TaggedIndex {
        TaggedIndex {
            generation: (val >> 32) as u32,
            index: val as u32,
        }
    }

    #[inline(always)]
    fn pack(&self) -> u64 {
        pack(self.generation, self.index)
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The index, or `None` for null.
    #[inline]
    pub fn index(&self) -> Option<u32> {
        (self.index != NULL_INDEX).then_some(self.index)
    }

    /// The index with [NULL_INDEX] standing in for null.
    #[inline]
    pub fn raw_index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.index == NULL_INDEX
    }

    /// The value a successful CAS against `self` should install to point at `index`: the next generation.
    #[inline]
    #[must_use]
    pub fn successor(&self, index: u32) -> TaggedIndex {
        TaggedIndex {
            generation: self.generation.wrapping_add(1),
            index,
        }
    }
}

/// A [TaggedIndex] which can be shared between threads.
#[derive(Debug)]
pub struct TaggedAtomic {
    storage: AtomicU64,
}

impl TaggedAtomic {
    pub fn new(value: TaggedIndex) -> TaggedAtomic {
        TaggedAtomic {
            storage: AtomicU64::new(value.pack()),
        }
    }

    pub fn null() -> TaggedAtomic {
        Self::new(TaggedIndex::null())
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> TaggedIndex {
        TaggedIndex::unpack(self.storage.load(ordering))
    }

    /// Store without a CAS.
    ///
    /// Only for words no other thread can be racing on, e.g. the link of a node which is not yet published.  Callers
    /// are responsible for keeping the generation moving forward.
    #[inline]
    pub fn store(&self, value: TaggedIndex, ordering: Ordering) {
        self.storage.store(value.pack(), ordering)
    }

    /// Replace the pair with `new` iff both halves still match `expected`.
    #[inline]
    pub fn wide_compare_and_swap(&self, expected: TaggedIndex, new: TaggedIndex) -> bool {
        self.storage
            .compare_exchange(
                expected.pack(),
                new.pack(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Like std's compare_exchange, for loops which want the observed value back.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: TaggedIndex,
        new: TaggedIndex,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedIndex, TaggedIndex> {
        self.storage
            .compare_exchange(current.pack(), new.pack(), success, failure)
            .map(TaggedIndex::unpack)
            .map_err(TaggedIndex::unpack)
    }
}

/// Full bidirectional hardware barrier.
#[inline]
pub fn full_fence() {
    fence(Ordering::SeqCst);
}

/// Stop the compiler from reordering memory accesses across this point without emitting a hardware fence.
///
/// For orderings already implied by a data dependency.
#[inline]
pub fn compiler_fence() {
    std::sync::atomic::compiler_fence(Ordering::SeqCst);
}

/// Nothing after this point may be hoisted above a preceding atomic read.
#[inline]
pub fn acquire_fence() {
    fence(Ordering::Acquire);
}

/// Nothing before this point may be sunk below a following atomic write.
#[inline]
pub fn release_fence() {
    fence(Ordering::Release);
}
