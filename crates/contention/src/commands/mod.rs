mod counter;
mod queue;

use crate::cli_args::{self, CliArgs, LockKind};
use sync_primitives::{LockFreeQueue, McsLock, OsMutex, TasLock, TicketLock, TwoLockQueue};

/// Figure out what command to run, then run it.
pub fn dispatch_command(args: &CliArgs) -> anyhow::Result<()> {
    log::info!(
        "Running {:?} with {} threads and {} iterations per thread",
        args.command,
        args.threads,
        args.iterations
    );

    match &args.command {
        cli_args::Command::Unsynchronized => counter::unsynchronized(args),
        cli_args::Command::Tas(b) => {
            counter::locked(args, "tas", TasLock::with_backoff(b.config()?))
        }
        cli_args::Command::Ticket => counter::locked(args, "ticket", TicketLock::new()),
        cli_args::Command::Mcs => counter::locked(args, "mcs", McsLock::new()),
        cli_args::Command::OsMutex => counter::locked(args, "os-mutex", OsMutex::new()),
        cli_args::Command::TwoLockQueue(q) => match q.lock {
            LockKind::Tas => {
                let config = q.backoff.config()?;
                queue::random_ops(
                    args,
                    "two-lock-queue/tas",
                    TwoLockQueue::with_locks(
                        TasLock::with_backoff(config),
                        TasLock::with_backoff(config),
                    ),
                )
            }
            LockKind::Ticket => queue::random_ops(
                args,
                "two-lock-queue/ticket",
                TwoLockQueue::<_, TicketLock>::new(),
            ),
            LockKind::Mcs => {
                queue::random_ops(args, "two-lock-queue/mcs", TwoLockQueue::<_, McsLock>::new())
            }
            LockKind::OsMutex => queue::random_ops(
                args,
                "two-lock-queue/os-mutex",
                TwoLockQueue::<_, OsMutex>::new(),
            ),
        },
        cli_args::Command::LockFreeQueue => {
            queue::random_ops(args, "lock-free-queue", LockFreeQueue::new())
        }
    }
}
