//! N threads doing random enqueues and dequeues against one queue.
use std::sync::Arc;

use rand::Rng;

use sync_primitives::ConcurrentQueue;

use crate::cli_args::CliArgs;
use crate::workers::run_workers;

#[derive(Debug, Default)]
struct WorkerStats {
    enqueued: u64,
    dequeued: u64,
    empty: u64,

    /// Sums of the values, to catch a value coming out twice while another never does.
    enqueued_sum: u64,
    dequeued_sum: u64,
}

/// Half enqueues and half dequeues, picked at random.
fn worker<Q: ConcurrentQueue<u64>>(
    thread_index: usize,
    iterations: usize,
    queue: &Q,
) -> anyhow::Result<WorkerStats> {
    let mut rng = rand::thread_rng();
    let mut stats = WorkerStats::default();

    for i in 0..iterations {
        if rng.gen_bool(0.5) {
            // Distinct across all threads.
            let value = (thread_index * iterations + i) as u64;
            queue.enqueue(value)?;
            stats.enqueued += 1;
            stats.enqueued_sum += value;
        } else {
            match queue.dequeue() {
                Some(v) => {
                    stats.dequeued += 1;
                    stats.dequeued_sum += v;
                }
                None => stats.empty += 1,
            }
        }
    }

    Ok(stats)
}

pub fn random_ops<Q>(args: &CliArgs, name: &str, queue: Q) -> anyhow::Result<()>
where
    Q: ConcurrentQueue<u64> + 'static,
{
    let iterations = args.iterations;
    let queue = Arc::new(queue);

    let outcome = run_workers(args.threads, queue.clone(), move |thread_index, queue: &Q| {
        worker(thread_index, iterations, queue)
    })?;

    let mut total = WorkerStats::default();
    for (thread_index, stats) in outcome.results.into_iter().enumerate() {
        let stats = stats?;
        log::info!("{name}: worker {thread_index}: {stats:?}");
        total.enqueued += stats.enqueued;
        total.dequeued += stats.dequeued;
        total.empty += stats.empty;
        total.enqueued_sum += stats.enqueued_sum;
        total.dequeued_sum += stats.dequeued_sum;
    }

    let mut remaining = 0u64;
    while let Some(v) = queue.dequeue() {
        remaining += 1;
        total.dequeued_sum += v;
    }

    println!(
        "{name}: enqueued={} dequeued={} empty={} remaining={remaining} elapsed={:?}",
        total.enqueued, total.dequeued, total.empty, outcome.elapsed
    );

    anyhow::ensure!(
        total.enqueued == total.dequeued + remaining,
        "{name}: {} values went in but {} came out",
        total.enqueued,
        total.dequeued + remaining
    );

    anyhow::ensure!(
        total.enqueued_sum == total.dequeued_sum,
        "{name}: counts match but the values do not"
    );

    Ok(())
}
