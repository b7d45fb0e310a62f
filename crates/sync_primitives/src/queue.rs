//! The contract both queue implementations satisfy.
use crate::error::EnqueueError;

/// An unbounded multi-producer multi-consumer FIFO queue.
///
/// Values come out in the order their enqueues took effect.  Neither operation ever waits on the other: an enqueue
/// can only contend with enqueues and a dequeue only with dequeues (or, for the lock-free queue, retry because of
/// them).
pub trait ConcurrentQueue<T>: Send + Sync {
    /// Add a value to the back of the queue.
    ///
    /// Fails only if memory for a node cannot be obtained, in which case the value is returned inside the error and the
    /// queue is unchanged.
    fn enqueue(&self, value: T) -> Result<(), EnqueueError<T>>;

    /// Remove the value at the front of the queue, or return `None` if the queue is empty.
    fn dequeue(&self) -> Option<T>;

    /// Racy snapshot: by the time the caller looks at the answer, it may be wrong.
    fn is_empty(&self) -> bool;
}
