//! `cqlsync apply` command.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use cqlsync_engine::{
    FailurePolicy, Orchestrator, Outcome, ProcessRunner, ReportEntry, RunReport, ThreadSleeper,
};

use tracing::info;

use crate::opts::{GlobalOpts, load};
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Desired-state file (.toml or .json)
    pub file: PathBuf,

    /// Keep converging kinds that do not depend on a failed one
    #[arg(long)]
    pub keep_going: bool,
}

pub fn cmd_apply(opts: &GlobalOpts, args: &ApplyArgs) -> Result<()> {
    let loaded = load(opts, &args.file)?;
    let policy = if args.keep_going {
        FailurePolicy::KeepGoing
    } else {
        FailurePolicy::FailFast
    };
    info!(
        file = %args.file.display(),
        descriptors = loaded.descriptors.len(),
        host = %loaded.config.host,
        "applying desired state"
    );
    let report = Orchestrator::new(&loaded.config, &ProcessRunner, &ThreadSleeper)
        .with_policy(policy)
        .run(&loaded.descriptors)?;

    print_success(
        opts,
        &render_report(&report),
        serde_json::to_value(&report)?,
        vec![],
    )?;
    if !report.is_success() {
        let unconverged = report.entries.len() - report.count(converged);
        bail!("{unconverged} object(s) did not converge");
    }
    Ok(())
}

fn converged(outcome: &Outcome) -> bool {
    matches!(
        outcome,
        Outcome::Skipped | Outcome::Created | Outcome::Dropped
    )
}

fn render_report(report: &RunReport) -> String {
    let mut lines = report.entries.iter().map(render_entry).collect::<Vec<_>>();
    lines.push(format!(
        "{} changed, {} unchanged, {} not converged",
        report.changed(),
        report.count(|o| *o == Outcome::Skipped),
        report.entries.len() - report.count(converged),
    ));
    lines.join("\n")
}

fn render_entry(entry: &ReportEntry) -> String {
    let (status, note) = match &entry.outcome {
        Outcome::Skipped => ("ok", String::new()),
        Outcome::Created => ("created", String::new()),
        Outcome::Dropped => ("dropped", String::new()),
        Outcome::Failed { error } => ("failed", format!(": {error}")),
        Outcome::Blocked { prerequisite } => {
            ("blocked", format!(" (a {prerequisite} failed)"))
        }
    };
    format!("{status:<8} {} {}{note}", entry.kind, entry.identity)
}
