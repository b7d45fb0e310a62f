//! Spin locks and concurrent queues for shared-memory multiprocessors.
//!
//! Everything here is built from the handful of operations in [atomics]: compare-and-swap, test-and-set,
//! fetch-and-add, swap, and a double-width compare-and-swap over a `(generation, index)` pair.  On top of those sit
//! three mutual exclusion locks with different trade-offs:
//!
//! - [TasLock]: one word, exponential backoff, no fairness.
//! - [TicketLock]: strict FIFO, but every waiter polls the same cache line.
//! - [McsLock]: strict FIFO, and every waiter polls its own cache line.
//!
//! And two unbounded MPMC FIFO queues implementing [ConcurrentQueue]:
//!
//! - [TwoLockQueue]: separate head and tail locks, generic over the lock.
//! - [LockFreeQueue]: the Michael and Scott non-blocking queue.
//!
//! None of the spinning primitives ever enter the kernel.  [OsMutex] exists to compare against one that does.
//!
//! Build with `RUSTFLAGS="--cfg loom"` to run the unit tests under loom's model checker.
pub mod atomics;
pub mod backoff;
pub mod error;
pub mod lock;
pub mod lock_free_queue;
pub mod mcs_lock;
mod node_arena;
pub mod queue;
mod sync;
pub mod tas_lock;
pub mod ticket_lock;
pub mod two_lock_queue;

pub use backoff::{Backoff, BackoffConfig};
pub use error::{AllocError, EnqueueError};
pub use lock::{LockGuard, Locked, OsMutex, RawLock};
pub use lock_free_queue::LockFreeQueue;
pub use mcs_lock::{McsLock, McsNode};
pub use queue::ConcurrentQueue;
pub use tas_lock::TasLock;
pub use ticket_lock::TicketLock;
pub use two_lock_queue::TwoLockQueue;
