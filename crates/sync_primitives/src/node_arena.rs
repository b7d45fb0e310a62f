//! Node storage for [crate::lock_free_queue::LockFreeQueue].
//!
//! Nodes are addressed by `u32` index so that a link and its generation fit in one [TaggedAtomic].  Slots live in
//! segments which are allocated on demand and never freed before the arena is: segment `k` holds `64 << k` slots, and
//! 26 of them cover every index below [NULL_INDEX].  Since a slot's memory never goes away, a thread holding a stale
//! index can always read the slot's atomics safely; deciding whether what it reads still means anything is what the
//! generations and the epoch scheme in the queue are for.
//!
//! Freed slots go on an MPMC stack whose head is itself tagged, so popping is ABA-safe without any help from the
//! queue.
use std::alloc::Layout;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr::null_mut;

use crate::atomics::{TaggedAtomic, NULL_INDEX};
use crate::error::{AllocError, Result};
use crate::sync::{AtomicPtr, AtomicU32, Ordering};

const FIRST_SEGMENT_SHIFT: u32 = 6;
const FIRST_SEGMENT_LEN: u64 = 1 << FIRST_SEGMENT_SHIFT;
const SEGMENTS: usize = 26;

/// Total number of slots across all segments.
pub(crate) const CAPACITY: u64 = FIRST_SEGMENT_LEN * ((1 << SEGMENTS) - 1);

pub(crate) struct Slot<T> {
    /// The queue's link to the following node.
    pub(crate) next: TaggedAtomic,

    /// The next slot on the free list, while this slot is on it.
    free_next: AtomicU32,

    pub(crate) value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new() -> Slot<T> {
        Slot {
            next: TaggedAtomic::null(),
            free_next: AtomicU32::new(NULL_INDEX),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

pub(crate) struct NodeArena<T> {
    segments: [AtomicPtr<Slot<T>>; SEGMENTS],

    /// Indices at or above this have never been handed out.
    next_fresh: AtomicU32,

    /// Never hand out `limit` or above, even if segments would allow it.
    limit: u32,

    free_head: TaggedAtomic,
}

unsafe impl<T: Send> Send for NodeArena<T> {}
unsafe impl<T: Send> Sync for NodeArena<T> {}

#[inline(always)]
fn segment_len(segment: usize) -> usize {
    (FIRST_SEGMENT_LEN as usize) << segment
}

/// Which segment, and where in it, an index lives.
#[inline(always)]
fn locate(index: u32) -> (usize, usize) {
    // Offsetting by the first segment's length makes every segment start at a power of two.
    let shifted = index as u64 + FIRST_SEGMENT_LEN;
    let segment = (63 - shifted.leading_zeros() - FIRST_SEGMENT_SHIFT) as usize;
    let offset = (shifted - (FIRST_SEGMENT_LEN << segment)) as usize;
    (segment, offset)
}

fn segment_layout<T>(segment: usize) -> Result<Layout> {
    Layout::array::<Slot<T>>(segment_len(segment))
        .map_err(|_| AllocError::OutOfMemory { bytes: usize::MAX })
}

impl<T> NodeArena<T> {
    pub(crate) fn new() -> NodeArena<T> {
        Self::with_limit(CAPACITY as u32)
    }

    /// An arena which refuses to hand out more than `limit` slots in total, free ones included.
    pub(crate) fn with_limit(limit: u32) -> NodeArena<T> {
        NodeArena {
            segments: std::array::from_fn(|_| AtomicPtr::new(null_mut())),
            next_fresh: AtomicU32::new(0),
            limit: limit.min(CAPACITY as u32),
            free_head: TaggedAtomic::null(),
        }
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.limit
    }

    /// Whether a limit below what the segments could hold was asked for.
    pub(crate) fn is_limited(&self) -> bool {
        (self.limit as u64) < CAPACITY
    }

    /// Get the slot for an index which this arena has handed out.
    #[inline]
    pub(crate) fn slot(&self, index: u32) -> &Slot<T> {
        let (segment, offset) = locate(index);
        let base = self.segments[segment].load(Ordering::Acquire);
        debug_assert!(!base.is_null(), "Index {} was never allocated", index);
        // Segments only ever go from null to allocated, and the caller got this index from us after that happened.
        unsafe { &*base.add(offset) }
    }

    /// Get a slot which nobody else is using.  Its `value` is uninitialized.
    pub(crate) fn allocate(&self) -> Result<u32> {
        if let Some(index) = self.pop_free() {
            return Ok(index);
        }
        self.allocate_fresh()
    }

    /// Put a slot on the free list.
    ///
    /// The caller must own the slot, its value must already be moved out, and no other thread may still be reading it
    /// through an index obtained before it became unreachable.
    pub(crate) fn recycle(&self, index: u32) {
        let slot = self.slot(index);
        let mut head = self.free_head.load(Ordering::Relaxed);
        loop {
            slot.free_next.store(head.raw_index(), Ordering::Relaxed);
            match self.free_head.compare_exchange(
                head,
                head.successor(index),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(h) => head = h,
            }
        }
    }

    fn pop_free(&self) -> Option<u32> {
        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            let index = head.index()?;
            // May be stale if another thread pops this slot first; then the CAS below fails on the generation.
            let next = self.slot(index).free_next.load(Ordering::Relaxed);
            match self.free_head.compare_exchange(
                head,
                head.successor(next),
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(index),
                Err(h) => head = h,
            }
        }
    }

    fn allocate_fresh(&self) -> Result<u32> {
        let mut fresh = self.next_fresh.load(Ordering::Relaxed);
        loop {
            if fresh >= self.limit {
                return Err(AllocError::Exhausted {
                    capacity: self.limit as u64,
                });
            }

            // Grow before claiming, so that a failed allocation does not burn the index.
            self.ensure_segment(locate(fresh).0)?;

            match self.next_fresh.compare_exchange_weak(
                fresh,
                fresh + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(fresh),
                Err(f) => fresh = f,
            }
        }
    }

    fn ensure_segment(&self, segment: usize) -> Result<()> {
        if !self.segments[segment].load(Ordering::Acquire).is_null() {
            return Ok(());
        }

        let layout = segment_layout::<T>(segment)?;
        let base = unsafe { std::alloc::alloc(layout) }.cast::<Slot<T>>();
        if base.is_null() {
            return Err(AllocError::OutOfMemory {
                bytes: layout.size(),
            });
        }

        let len = segment_len(segment);
        for i in 0..len {
            unsafe { base.add(i).write(Slot::new()) };
        }

        match self.segments[segment].compare_exchange(
            null_mut(),
            base,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                log::debug!(
                    "Node arena grew segment {} ({} slots, {} bytes)",
                    segment,
                    len,
                    layout.size()
                );
            }
            Err(_) => {
                log::trace!("Lost the race to install node arena segment {}", segment);
                unsafe { free_segment(base, segment) };
            }
        }

        Ok(())
    }
}

/// # Safety
///
/// `base` is an initialized segment `segment` which nothing references anymore.
unsafe fn free_segment<T>(base: *mut Slot<T>, segment: usize) {
    // Slot values are `MaybeUninit`, so this drops only the atomics.
    std::ptr::drop_in_place(std::ptr::slice_from_raw_parts_mut(
        base,
        segment_len(segment),
    ));
    // The layout was valid when the segment was allocated.
    if let Ok(layout) = segment_layout::<T>(segment) {
        std::alloc::dealloc(base.cast(), layout);
    }
}

impl<T> Drop for NodeArena<T> {
    /// Frees the memory.  Any values still in slots are leaked; dropping those is the owner's job.
    fn drop(&mut self) {
        for (segment, ptr) in self.segments.iter_mut().enumerate() {
            let base = *ptr.get_mut();
            if !base.is_null() {
                unsafe { free_segment(base, segment) };
            }
        }
    }
}

/// A read of the free list head, for tests.
#[cfg(test)]
impl<T> NodeArena<T> {
    fn free_head(&self) -> crate::atomics::TaggedIndex {
        self.free_head.load(Ordering::Relaxed)
    }
}
