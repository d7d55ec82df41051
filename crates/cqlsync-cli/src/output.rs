//! Shared output helpers for human and JSON modes.
//!
//! Human mode prints primary data to stdout and notices to stderr. JSON mode
//! wraps responses in `{ data, warnings? }` and respects `--pretty` and
//! `--quiet`.

use std::io::Write;

use anyhow::Result;
use serde_json::{Map, Value, json};

use crate::opts::GlobalOpts;

/// `human` is what a terminal user sees; `data` is the JSON payload.
pub fn print_success(
    opts: &GlobalOpts,
    human: &str,
    data: Value,
    mut warnings: Vec<String>,
) -> Result<()> {
    if opts.quiet {
        warnings.clear();
    }
    if opts.wants_json() {
        print_json(opts, data, warnings)
    } else {
        print_human(human, warnings)
    }
}

fn print_json(opts: &GlobalOpts, data: Value, warnings: Vec<String>) -> Result<()> {
    let mut root = Map::new();
    root.insert("data".into(), data);
    if !warnings.is_empty() {
        root.insert(
            "warnings".into(),
            warnings.into_iter().map(Value::String).collect(),
        );
    }
    let root = Value::Object(root);
    if opts.pretty {
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else {
        println!("{}", serde_json::to_string(&root)?);
    }
    Ok(())
}

fn print_human(human: &str, warnings: Vec<String>) -> Result<()> {
    let mut stderr = std::io::stderr();
    for w in warnings {
        writeln!(stderr, "notice: {w}")?;
    }
    if !human.is_empty() {
        println!("{human}");
    }
    Ok(())
}

/// Error envelope for JSON mode; human mode gets a single `error:` line.
pub fn print_error(opts: &GlobalOpts, stage: Option<&str>, err: &anyhow::Error) {
    if opts.wants_json() {
        let root = json!({
            "error": {
                "stage": stage,
                "message": format!("{err:#}"),
            }
        });
        let text = if opts.pretty {
            serde_json::to_string_pretty(&root)
        } else {
            serde_json::to_string(&root)
        };
        if let Ok(text) = text {
            println!("{text}");
            return;
        }
    }
    match stage {
        Some(stage) => eprintln!("error: {stage}: {err:#}"),
        None => eprintln!("error: {err:#}"),
    }
}
