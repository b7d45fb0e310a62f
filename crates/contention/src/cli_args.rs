//! Definition of the Clap command line.
use clap::{Parser, Subcommand, ValueEnum};

use sync_primitives::BackoffConfig;

#[derive(Debug, Parser)]
pub struct CliArgs {
    /// Number of worker threads.
    #[arg(short, long, default_value_t = 4, global = true)]
    pub threads: usize,

    /// Operations performed by each worker.
    #[arg(short, long, default_value_t = 10000, global = true)]
    pub iterations: usize,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Increment a shared counter with no synchronization at all, to show what gets lost.
    Unsynchronized,

    /// Increment a shared counter under a test-and-set lock.
    Tas(BackoffArgs),

    /// Increment a shared counter under a ticket lock.
    Ticket,

    /// Increment a shared counter under an MCS lock.
    Mcs,

    /// Increment a shared counter under the OS mutex.
    OsMutex,

    /// Random enqueues and dequeues against the two-lock queue.
    TwoLockQueue(TwoLockQueueArgs),

    /// Random enqueues and dequeues against the lock-free queue.
    LockFreeQueue,
}

#[derive(Debug, Parser)]
pub struct BackoffArgs {
    /// Spins after the first failed attempt.
    #[arg(long, default_value_t = BackoffConfig::DEFAULT.initial)]
    pub backoff_initial: u32,

    /// Growth factor of the delay after every failed attempt.
    #[arg(long, default_value_t = BackoffConfig::DEFAULT.factor)]
    pub backoff_factor: u32,

    /// Upper bound on the delay.
    #[arg(long, default_value_t = BackoffConfig::DEFAULT.cap)]
    pub backoff_cap: u32,
}

impl BackoffArgs {
    pub fn config(&self) -> anyhow::Result<BackoffConfig> {
        anyhow::ensure!(
            self.backoff_initial <= self.backoff_cap,
            "Backoff starts at {} which is above the cap of {}",
            self.backoff_initial,
            self.backoff_cap
        );

        Ok(BackoffConfig {
            initial: self.backoff_initial,
            factor: self.backoff_factor,
            cap: self.backoff_cap,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LockKind {
    Tas,
    Ticket,
    Mcs,
    OsMutex,
}

#[derive(Debug, Parser)]
pub struct TwoLockQueueArgs {
    /// Which lock protects the head and the tail.
    #[arg(long, value_enum, default_value_t = LockKind::OsMutex)]
    pub lock: LockKind,

    /// Only used with `--lock tas`.
    #[command(flatten)]
    pub backoff: BackoffArgs,
}
