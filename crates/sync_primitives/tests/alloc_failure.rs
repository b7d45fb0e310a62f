//! Node allocation failing while the queues are in use.
#![cfg(not(loom))]
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use sync_primitives::{AllocError, LockFreeQueue, TicketLock, TwoLockQueue};

/// The system allocator, except that it returns null on threads which have asked it to.
struct FailingAllocator;

thread_local! {
    static FAIL_ALLOCATIONS: Cell<bool> = const { Cell::new(false) };
}

fn failing() -> bool {
    FAIL_ALLOCATIONS.try_with(Cell::get).unwrap_or(false)
}

unsafe impl GlobalAlloc for FailingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if failing() {
            return std::ptr::null_mut();
        }
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: FailingAllocator = FailingAllocator;

/// Run `what` with every allocation on this thread failing.
fn without_memory<R>(what: impl FnOnce() -> R) -> R {
    FAIL_ALLOCATIONS.with(|f| f.set(true));
    let ret = what();
    FAIL_ALLOCATIONS.with(|f| f.set(false));
    ret
}

#[test]
fn two_lock_queue_hands_back_the_value() {
    let queue = TwoLockQueue::<u64, TicketLock>::new();
    queue.enqueue(1).unwrap();
    queue.enqueue(2).unwrap();

    let err = without_memory(|| queue.enqueue(3)).unwrap_err();
    let AllocError::OutOfMemory { bytes } = err.cause else {
        panic!("Expected running out of memory, got {:?}", err.cause);
    };
    assert!(bytes >= std::mem::size_of::<u64>());
    assert_eq!(err.into_inner(), 3);

    // Unchanged by the failure, and usable again once memory is back.
    queue.enqueue(4).unwrap();
    assert_eq!(queue.dequeue(), Some(1));
    assert_eq!(queue.dequeue(), Some(2));
    assert_eq!(queue.dequeue(), Some(4));
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn lock_free_queue_fails_to_grow() {
    // The first segment holds 64 nodes, one of which is the dummy.
    let queue = LockFreeQueue::<u64>::new();
    for i in 0..63 {
        queue.enqueue(i).unwrap();
    }

    let err = without_memory(|| queue.enqueue(63)).unwrap_err();
    assert!(
        matches!(err.cause, AllocError::OutOfMemory { .. }),
        "{:?}",
        err.cause
    );
    assert_eq!(err.into_inner(), 63);

    queue.enqueue(63).unwrap();
    let got = std::iter::from_fn(|| queue.dequeue()).collect::<Vec<_>>();
    pretty_assertions::assert_eq!(got, (0..64).collect::<Vec<_>>());
}
