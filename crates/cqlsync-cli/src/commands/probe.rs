//! `cqlsync probe` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cqlsync_engine::{ProcessRunner, ThreadSleeper, probe};
use serde_json::json;

use crate::opts::{GlobalOpts, load};
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Desired-state file whose `[connection]` section is used
    pub file: PathBuf,
}

pub fn cmd_probe(opts: &GlobalOpts, args: &ProbeArgs) -> Result<()> {
    let loaded = load(opts, &args.file)?;
    let config = &loaded.config;
    probe(config, &ProcessRunner, &ThreadSleeper)?;
    print_success(
        opts,
        &format!("{}:{} is reachable", config.host, config.port),
        json!({ "host": config.host, "port": config.port, "reachable": true }),
        vec![],
    )
}
