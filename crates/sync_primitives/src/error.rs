/// Why a queue could not get memory for a node.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    #[error("The allocator could not provide {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("All {capacity} node slots are in use")]
    Exhausted { capacity: u64 },
}

/// An enqueue which failed, handing the value back.
///
/// The queue is left exactly as it was before the call.  Like std's channel errors, `Debug` does not require `T:
/// Debug` and does not print the value.
pub struct EnqueueError<T> {
    pub value: T,
    pub cause: AllocError,
}

impl<T> EnqueueError<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> std::fmt::Debug for EnqueueError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnqueueError")
            .field("cause", &self.cause)
            .finish_non_exhaustive()
    }
}

impl<T> std::fmt::Display for EnqueueError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unable to enqueue: {}", self.cause)
    }
}

impl<T> std::error::Error for EnqueueError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

pub type Result<T, E = AllocError> = std::result::Result<T, E>;
