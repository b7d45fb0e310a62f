//! Spawning and timing the worker threads.
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What came back from a run: one result per worker, in thread order, and the wall-clock time between the first spawn
/// and the last join.
pub struct RunOutcome<R> {
    pub results: Vec<R>,
    pub elapsed: Duration,
}

/// Run `work(thread_index, &shared)` on `threads` threads at once.
pub fn run_workers<S, R, F>(
    threads: usize,
    shared: Arc<S>,
    work: F,
) -> anyhow::Result<RunOutcome<R>>
where
    S: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(usize, &S) -> R + Send + Sync + 'static,
{
    anyhow::ensure!(threads > 0, "Need at least one thread");

    let work = Arc::new(work);
    let started = Instant::now();

    let handles = (0..threads)
        .map(|thread_index| {
            let shared = shared.clone();
            let work = work.clone();
            std::thread::Builder::new()
                .name(format!("worker-{thread_index}"))
                .spawn(move || (*work)(thread_index, &*shared))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut results = Vec::with_capacity(threads);
    for (thread_index, h) in handles.into_iter().enumerate() {
        let res = h
            .join()
            .map_err(|_| anyhow::anyhow!("Worker {thread_index} panicked"))?;
        results.push(res);
    }

    let elapsed = started.elapsed();
    log::debug!("{threads} workers finished in {elapsed:?}");

    Ok(RunOutcome { results, elapsed })
}
