//! Switch between std and loom.
//!
//! Every atomic, fence and spin hint the algorithms use comes through here, so that building with `--cfg loom` puts
//! all of them under the model checker.  Compiler fences are the exception: loom has no notion of them, so
//! [crate::atomics::compiler_fence] always uses core's.
//!
//! The node arena and the epoch-based reclamation behind the lock-free queue are not modelled; their tests only run
//! without loom.
#[cfg(not(loom))]
pub(crate) use std::{
    hint::spin_loop,
    sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering},
};

#[cfg(all(test, not(loom)))]
pub(crate) use std::{
    sync::Arc,
    thread::{spawn, yield_now},
};

#[cfg(loom)]
pub(crate) use loom::{
    hint::spin_loop,
    sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering},
};

#[cfg(all(test, loom))]
pub(crate) use loom::{
    sync::Arc,
    thread::{spawn, yield_now},
};

/// Run a test body once, or under loom, once per interleaving loom explores.
#[cfg(test)]
pub(crate) fn wrap_test(what: impl Fn() + Sync + Send + 'static) {
    #[cfg(loom)]
    loom::model(what);

    #[cfg(not(loom))]
    what();
}
