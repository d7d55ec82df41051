mod commands;
mod opts;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cqlsync_engine::EngineError;
use tracing_subscriber::EnvFilter;

use commands::apply::ApplyArgs;
use commands::plan::PlanArgs;
use commands::probe::ProbeArgs;
use opts::GlobalOpts;

#[derive(Parser, Debug)]
#[command(
    name = "cqlsync",
    version,
    about = "Converge a Cassandra cluster's schema to a declared state"
)]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the cluster, then create or drop objects until it matches the file
    Apply(ApplyArgs),

    /// Validate the file and print the statements each object would use
    Plan(PlanArgs),

    /// Only check that the cluster is reachable with the configured credentials
    Probe(ProbeArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.opts.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let stage = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<EngineError>())
                .map(EngineError::stage);
            output::print_error(&cli.opts, stage, &err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let opts = &cli.opts;
    match &cli.command {
        Command::Apply(args) => commands::apply::cmd_apply(opts, args),
        Command::Plan(args) => commands::plan::cmd_plan(opts, args),
        Command::Probe(args) => commands::probe::cmd_probe(opts, args),
    }
}

fn setup_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();
}
