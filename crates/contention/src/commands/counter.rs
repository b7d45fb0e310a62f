//! N threads incrementing one shared counter.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sync_primitives::{Locked, RawLock};

use crate::cli_args::CliArgs;
use crate::workers::run_workers;

/// A separate load and store, so concurrent increments overwrite each other.
pub fn unsynchronized(args: &CliArgs) -> anyhow::Result<()> {
    let iterations = args.iterations;
    let counter = Arc::new(AtomicU64::new(0));

    let outcome = run_workers(args.threads, counter.clone(), move |_, counter| {
        for _ in 0..iterations {
            let seen = counter.load(Ordering::Relaxed);
            counter.store(seen + 1, Ordering::Relaxed);
        }
    })?;

    let expected = (args.threads * args.iterations) as u64;
    let got = counter.load(Ordering::Relaxed);
    println!(
        "unsynchronized: counter={got} expected={expected} lost={} elapsed={:?}",
        expected.saturating_sub(got),
        outcome.elapsed
    );

    Ok(())
}

pub fn locked<L: RawLock + 'static>(args: &CliArgs, name: &str, lock: L) -> anyhow::Result<()> {
    let iterations = args.iterations;
    let counter = Arc::new(Locked::with_lock(lock, 0u64));

    let outcome = run_workers(args.threads, counter.clone(), move |_, counter| {
        for _ in 0..iterations {
            counter.lock_with(|c| *c += 1);
        }
    })?;

    let expected = (args.threads * args.iterations) as u64;
    let got = counter.lock_with(|c| *c);
    println!(
        "{name}: counter={got} expected={expected} elapsed={:?}",
        outcome.elapsed
    );

    anyhow::ensure!(
        got == expected,
        "{name} lost {} increments; mutual exclusion is broken",
        expected.saturating_sub(got)
    );

    Ok(())
}
