//! Global CLI options and desired-state loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use cqlsync_engine::{ConnectionConfig, ConnectionSettings, EngineError, Manifest};
use cqlsync_types::Descriptor;

/// Global options for every command.
///
/// Connection flags override the `[connection]` section of the file and can
/// be set through env vars.
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// JSON output envelope
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output (implies --json)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Suppress notices
    #[arg(long, global = true)]
    pub quiet: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to the cqlsh binary (env: CQLSYNC_CQLSH)
    #[arg(long = "cqlsh-command", global = true, env = "CQLSYNC_CQLSH")]
    pub cqlsh_command: Option<PathBuf>,

    /// Cluster host (env: CQLSYNC_HOST)
    #[arg(long, global = true, env = "CQLSYNC_HOST")]
    pub host: Option<String>,

    /// Native protocol port (env: CQLSYNC_PORT)
    #[arg(long, global = true, env = "CQLSYNC_PORT")]
    pub port: Option<u16>,

    /// Connectivity probe attempts (env: CQLSYNC_CONNECTION_TRIES)
    #[arg(long, global = true, env = "CQLSYNC_CONNECTION_TRIES")]
    pub connection_tries: Option<u32>,

    /// Seconds between probe attempts (env: CQLSYNC_CONNECTION_TRY_SLEEP)
    #[arg(long, global = true, env = "CQLSYNC_CONNECTION_TRY_SLEEP")]
    pub connection_try_sleep: Option<u64>,

    /// Per-command time limit in seconds (env: CQLSYNC_COMMAND_TIMEOUT)
    #[arg(long, global = true, env = "CQLSYNC_COMMAND_TIMEOUT")]
    pub command_timeout: Option<u64>,
}

impl GlobalOpts {
    pub fn connection_overrides(&self) -> ConnectionSettings {
        ConnectionSettings {
            command: self.cqlsh_command.clone(),
            host: self.host.clone(),
            port: self.port,
            connection_tries: self.connection_tries,
            connection_try_sleep: self.connection_try_sleep,
            command_timeout: self.command_timeout,
            ..ConnectionSettings::default()
        }
    }

    pub fn wants_json(&self) -> bool {
        self.json || self.pretty
    }
}

/// A loaded desired-state file with its connection resolved.
pub struct Loaded {
    pub config: ConnectionConfig,
    pub descriptors: Vec<Descriptor>,
}

pub fn load(opts: &GlobalOpts, path: &Path) -> Result<Loaded> {
    let manifest = Manifest::from_path(path)?;
    let config = manifest
        .connection
        .overlay(&opts.connection_overrides())
        .resolve()
        .map_err(EngineError::from)
        .with_context(|| format!("resolve connection settings for {}", path.display()))?;
    let descriptors = manifest
        .descriptors()
        .map_err(EngineError::from)
        .with_context(|| format!("read descriptors from {}", path.display()))?;
    Ok(Loaded {
        config,
        descriptors,
    })
}
