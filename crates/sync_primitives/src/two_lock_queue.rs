//! The two-lock queue of Michael and Scott.
//!
//! A singly linked list with a dummy node at the front.  The head pointer is protected by one lock and the tail pointer
//! by another, so enqueuers and dequeuers never wait on each other.  The only word both sides touch is the `next` link
//! of the last node when the queue is empty or has one element, and that link is atomic.
//!
//! Dequeue takes the value out of the node after the dummy and makes that node the new dummy, so the node which is
//! freed is always the old dummy, whose value was already taken.
use std::alloc::Layout;
use std::mem::MaybeUninit;
use std::ptr::{null_mut, NonNull};

use crossbeam::utils::CachePadded;

use crate::error::{AllocError, EnqueueError};
use crate::lock::{Locked, OsMutex, RawLock};
use crate::queue::ConcurrentQueue;
use crate::sync::{AtomicPtr, Ordering};

struct Node<T> {
    next: AtomicPtr<Node<T>>,

    /// Initialized for every node except the current dummy.
    value: MaybeUninit<T>,
}

fn node_layout<T>() -> Layout {
    Layout::new::<Node<T>>()
}

fn alloc_node<T>() -> Result<NonNull<Node<T>>, AllocError> {
    let layout = node_layout::<T>();
    let ptr = unsafe { std::alloc::alloc(layout) }.cast::<Node<T>>();
    NonNull::new(ptr).ok_or(AllocError::OutOfMemory {
        bytes: layout.size(),
    })
}

/// # Safety
///
/// `node` came from [alloc_node], was initialized, and is unreachable from the queue.  The value must already have
/// been moved out or dropped.
unsafe fn free_node<T>(node: *mut Node<T>) {
    // Drops the link only; `MaybeUninit` never drops the value.
    std::ptr::drop_in_place(node);
    std::alloc::dealloc(node.cast(), node_layout::<T>());
}

pub struct TwoLockQueue<T, L: RawLock = OsMutex> {
    /// The dummy node.
    head: CachePadded<Locked<*mut Node<T>, L>>,

    /// The last node, which is the dummy when the queue is empty.
    tail: CachePadded<Locked<*mut Node<T>, L>>,
}

unsafe impl<T: Send, L: RawLock> Send for TwoLockQueue<T, L> {}
unsafe impl<T: Send, L: RawLock> Sync for TwoLockQueue<T, L> {}

impl<T, L: RawLock + Default> TwoLockQueue<T, L> {
    pub fn new() -> Self {
        Self::with_locks(L::default(), L::default())
    }
}

impl<T, L: RawLock + Default> Default for TwoLockQueue<T, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, L: RawLock> TwoLockQueue<T, L> {
    /// Build a queue around two already-configured locks.
    pub fn with_locks(head_lock: L, tail_lock: L) -> Self {
        // Like any other collection, failing to allocate on construction is fatal.
        let dummy = match alloc_node::<T>() {
            Ok(n) => n.as_ptr(),
            Err(_) => std::alloc::handle_alloc_error(node_layout::<T>()),
        };

        unsafe {
            dummy.write(Node {
                next: AtomicPtr::new(null_mut()),
                value: MaybeUninit::uninit(),
            });
        }

        TwoLockQueue {
            head: CachePadded::new(Locked::with_lock(head_lock, dummy)),
            tail: CachePadded::new(Locked::with_lock(tail_lock, dummy)),
        }
    }

    pub fn enqueue(&self, value: T) -> Result<(), EnqueueError<T>> {
        let node = match alloc_node::<T>() {
            Ok(n) => n.as_ptr(),
            Err(cause) => {
                log::warn!("Two-lock queue could not allocate a node: {}", cause);
                return Err(EnqueueError { value, cause });
            }
        };

        unsafe {
            node.write(Node {
                next: AtomicPtr::new(null_mut()),
                value: MaybeUninit::new(value),
            });
        }

        self.tail.lock_with(|tail| {
            // The release pairs with the acquire in dequeue, which is what makes the value visible.
            unsafe { (**tail).next.store(node, Ordering::Release) };
            *tail = node;
        });

        Ok(())
    }

    pub fn dequeue(&self) -> Option<T> {
        let (old_dummy, value) = self.head.lock_with(|head| {
            let dummy = *head;
            let next = unsafe { (*dummy).next.load(Ordering::Acquire) };
            if next.is_null() {
                return None;
            }

            // `next` becomes the dummy, so its value is ours to take.
            let value = unsafe { (*next).value.assume_init_read() };
            *head = next;
            Some((dummy, value))
        })?;

        // Nobody can reach the old dummy anymore: head moved past it, and tail did before its link was set.
        unsafe { free_node(old_dummy) };
        Some(value)
    }

    /// Takes the head lock.
    pub fn is_empty(&self) -> bool {
        self.head
            .lock_with(|head| unsafe { (**head).next.load(Ordering::Acquire) }.is_null())
    }
}

impl<T, L: RawLock> Drop for TwoLockQueue<T, L> {
    fn drop(&mut self) {
        let mut dropped = 0usize;

        unsafe {
            let dummy = *self.head.get_mut();
            let mut cur = (*dummy).next.load(Ordering::Relaxed);
            free_node(dummy);

            while !cur.is_null() {
                let next = (*cur).next.load(Ordering::Relaxed);
                (*cur).value.assume_init_drop();
                free_node(cur);
                dropped += 1;
                cur = next;
            }
        }

        if dropped > 0 {
            log::debug!("Dropped a two-lock queue with {} values still queued", dropped);
        }
    }
}

impl<T: Send, L: RawLock> ConcurrentQueue<T> for TwoLockQueue<T, L> {
    fn enqueue(&self, value: T) -> Result<(), EnqueueError<T>> {
        TwoLockQueue::enqueue(self, value)
    }

    fn dequeue(&self) -> Option<T> {
        TwoLockQueue::dequeue(self)
    }

    fn is_empty(&self) -> bool {
        TwoLockQueue::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::mcs_lock::McsLock;
    use crate::sync::{spawn, Arc};
    use crate::tas_lock::TasLock;
    use crate::ticket_lock::TicketLock;

    #[cfg(not(loom))]
    fn fifo<L: RawLock + Default>() {
        let queue = TwoLockQueue::<u32, L>::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);

        for i in 0..100 {
            queue.enqueue(i).unwrap();
        }
        assert!(!queue.is_empty());

        let got = std::iter::from_fn(|| queue.dequeue()).collect::<Vec<_>>();
        pretty_assertions::assert_eq!(got, (0..100).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[cfg(not(loom))]
    #[test]
    fn fifo_with_every_lock() {
        fifo::<TasLock>();
        fifo::<TicketLock>();
        fifo::<McsLock>();
        fifo::<OsMutex>();
    }

    #[cfg(not(loom))]
    #[test]
    fn drop_releases_queued_values() {
        let counted = std::sync::Arc::new(());

        let queue = TwoLockQueue::<_, TicketLock>::new();
        for _ in 0..10 {
            queue.enqueue(counted.clone()).unwrap();
        }
        drop(queue.dequeue());
        assert_eq!(std::sync::Arc::strong_count(&counted), 10);

        drop(queue);
        assert_eq!(std::sync::Arc::strong_count(&counted), 1);
    }

    #[cfg(not(loom))]
    #[test]
    fn zero_sized_values() {
        let queue = TwoLockQueue::<(), OsMutex>::new();
        queue.enqueue(()).unwrap();
        queue.enqueue(()).unwrap();
        assert_eq!(queue.dequeue(), Some(()));
        assert_eq!(queue.dequeue(), Some(()));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn producer_and_consumer_race() {
        crate::sync::wrap_test(|| {
            let queue = Arc::new(TwoLockQueue::<u32, TicketLock>::new());

            let producer = {
                let queue = queue.clone();
                spawn(move || {
                    queue.enqueue(1).unwrap();
                    queue.enqueue(2).unwrap();
                })
            };

            let mut got = vec![];
            if let Some(v) = queue.dequeue() {
                got.push(v);
            }

            producer.join().unwrap();
            got.extend(std::iter::from_fn(|| queue.dequeue()));

            assert_eq!(got, vec![1, 2]);
        });
    }
}
