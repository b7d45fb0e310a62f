//! Contention harness for the locks and queues in `sync_primitives`.
//!
//! Each subcommand builds one lock or queue, shares it between `--threads` workers through an `Arc`, has every worker
//! run `--iterations` operations against it, and reports how long that took from the first spawn to the last join.
//! Lock runs increment one shared counter and fail if any increment went missing.  Queue runs pick enqueue or dequeue
//! at random and fail if any value went missing or came out twice.
//!
//! Set `RUST_LOG=info` to see the configuration and per-thread results.
mod cli_args;
mod commands;
mod workers;

fn main() -> anyhow::Result<()> {
    use clap::Parser;

    env_logger::init();

    let args = cli_args::CliArgs::parse();
    commands::dispatch_command(&args)
}
