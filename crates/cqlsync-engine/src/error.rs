use std::path::PathBuf;

use cqlsync_types::{ConfigError, Identity, Kind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "connectivity probe failed after {attempts} attempt(s): `{command}` {status}{}",
        detail(.stderr)
    )]
    Connectivity {
        attempts: u32,
        command: String,
        status: String,
        stderr: String,
    },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(
        "apply {kind} '{identity}' failed: `{command}` {status}{}",
        detail(.stderr)
    )]
    Command {
        kind: Kind,
        identity: Identity,
        command: String,
        status: String,
        stderr: String,
    },
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot load desired state from {path:?}: {message}")]
    Manifest { path: PathBuf, message: String },
}

impl EngineError {
    /// Pipeline stage that failed, for operator-facing summaries.
    pub fn stage(&self) -> &'static str {
        match self {
            EngineError::Connectivity { .. } => "connectivity probe",
            EngineError::Config(_) | EngineError::Manifest { .. } => "configuration",
            EngineError::Command { .. } | EngineError::Spawn { .. } => "apply",
        }
    }
}

fn detail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
