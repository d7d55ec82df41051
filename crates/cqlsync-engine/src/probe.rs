use std::time::Duration;

use tracing::{info, warn};

use crate::builder::LIST_KEYSPACES;
use crate::command::Statement;
use crate::config::ConnectionConfig;
use crate::error::EngineError;
use crate::runner::CommandRunner;

/// Blocking pause between probe attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Check the store is reachable and accepts our credentials.
///
/// Makes up to `retry.tries` attempts with `retry.sleep` between consecutive
/// ones. A client that cannot be started counts as a failed attempt.
pub fn probe<R, S>(config: &ConnectionConfig, runner: &R, sleeper: &S) -> Result<(), EngineError>
where
    R: CommandRunner + ?Sized,
    S: Sleeper + ?Sized,
{
    let command = config.command(&Statement::new(LIST_KEYSPACES));
    let tries = config.retry.tries();
    let mut last_status = String::new();
    let mut last_stderr = String::new();
    for attempt in 1..=tries {
        match runner.run(&command) {
            Ok(output) if output.success() => {
                info!(attempt, host = %config.host, port = config.port, "store reachable");
                return Ok(());
            }
            Ok(output) => {
                last_status = output.status().to_string();
                last_stderr = output.stderr;
            }
            Err(EngineError::Spawn { source, .. }) => {
                last_status = "could not be started".into();
                last_stderr = source.to_string();
            }
            Err(other) => return Err(other),
        }
        warn!(attempt, tries, status = %last_status, "connectivity probe failed");
        if attempt < tries {
            sleeper.sleep(config.retry.sleep());
        }
    }
    Err(EngineError::Connectivity {
        attempts: tries,
        command: command.to_string(),
        status: last_status,
        stderr: last_stderr,
    })
}
