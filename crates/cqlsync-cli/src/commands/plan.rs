//! `cqlsync plan` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cqlsync_engine::{Orchestrator, PlannedStep, ProcessRunner, ThreadSleeper};
use cqlsync_types::DesiredState;
use serde_json::{Value, json};

use crate::opts::{GlobalOpts, load};
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Desired-state file (.toml or .json)
    pub file: PathBuf,
}

/// Validates and renders without contacting the cluster.
pub fn cmd_plan(opts: &GlobalOpts, args: &PlanArgs) -> Result<()> {
    let loaded = load(opts, &args.file)?;
    let steps = Orchestrator::new(&loaded.config, &ProcessRunner, &ThreadSleeper)
        .plan(&loaded.descriptors)?;

    let human = steps.iter().map(render_step).collect::<Vec<_>>().join("\n");
    let data = Value::Array(steps.iter().map(step_json).collect());
    print_success(opts, &human, data, vec![])
}

fn verb(state: DesiredState) -> &'static str {
    match state {
        DesiredState::Present => "ensure present",
        DesiredState::Absent => "ensure absent",
    }
}

fn render_step(step: &PlannedStep) -> String {
    format!(
        "{} {} ({})\n  read:  {}\n  write: {}",
        step.kind,
        step.identity,
        verb(step.state),
        step.read,
        step.write
    )
}

fn step_json(step: &PlannedStep) -> Value {
    json!({
        "kind": step.kind,
        "title": step.title,
        "identity": step.identity.to_string(),
        "state": step.state,
        "read": step.read.to_string(),
        "write": step.write.to_string(),
    })
}
