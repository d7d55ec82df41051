use cqlsync_types::{DesiredState, Descriptor};
use serde::Serialize;
use tracing::{debug, info};

use crate::builder::build_write;
use crate::config::ConnectionConfig;
use crate::error::EngineError;
use crate::reader::exists;
use crate::runner::CommandRunner;

/// What convergence did for one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Skipped,
    Created,
    Dropped,
}

/// Converge one descriptor: read, then write only if observed and desired
/// existence differ.
///
/// Nothing guards the window between the read and the write; a concurrent
/// writer can make the write fail or be redundant.
pub fn apply<R: CommandRunner + ?Sized>(
    descriptor: &Descriptor,
    config: &ConnectionConfig,
    runner: &R,
) -> Result<Action, EngineError> {
    let kind = descriptor.kind();
    let identity = descriptor.identity();
    let observed = exists(descriptor, config, runner)?;
    let action = match (descriptor.state, observed) {
        (DesiredState::Present, true) | (DesiredState::Absent, false) => {
            debug!(%kind, %identity, "already converged");
            return Ok(Action::Skipped);
        }
        (DesiredState::Present, false) => Action::Created,
        (DesiredState::Absent, true) => Action::Dropped,
    };

    let command = config.command(&build_write(descriptor));
    let output = runner.run(&command)?;
    if !output.success() {
        return Err(EngineError::Command {
            kind,
            identity,
            command: command.to_string(),
            status: output.status().to_string(),
            stderr: command.redact_output(&output.stderr),
        });
    }
    info!(%kind, %identity, ?action, statement = %command.statement, "converged");
    Ok(action)
}
