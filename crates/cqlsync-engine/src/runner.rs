//! Process execution seam. Everything that talks to the store goes through
//! [`CommandRunner`], so tests can swap in a fake.

use std::fmt;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::command::CqlCommand;
use crate::error::EngineError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal or timed out.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    pub fn status(&self) -> ExitSummary {
        ExitSummary {
            code: self.code,
            timed_out: self.timed_out,
        }
    }
}

/// Human-readable exit status.
#[derive(Debug, Clone, Copy)]
pub struct ExitSummary {
    code: Option<i32>,
    timed_out: bool,
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.timed_out, self.code) {
            (true, _) => f.write_str("timed out"),
            (false, Some(code)) => write!(f, "exited with status {code}"),
            (false, None) => f.write_str("was terminated by a signal"),
        }
    }
}

/// Runs one client invocation to completion.
pub trait CommandRunner {
    /// `Err` only when the process could not be started; a non-zero exit is
    /// reported through [`CommandOutput`].
    fn run(&self, command: &CqlCommand) -> Result<CommandOutput, EngineError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &CqlCommand) -> Result<CommandOutput, EngineError> {
        (**self).run(command)
    }
}

/// Spawns the real client binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &CqlCommand) -> Result<CommandOutput, EngineError> {
        debug!(command = %command, "running client");
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let spawn_error = |source: std::io::Error| EngineError::Spawn {
            program: command.program.display().to_string(),
            source,
        };
        let output = match command.timeout {
            None => {
                let output = cmd.output().map_err(spawn_error)?;
                CommandOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    timed_out: false,
                }
            }
            Some(limit) => run_with_timeout(cmd, limit).map_err(spawn_error)?,
        };
        debug!(status = %output.status(), "client finished");
        Ok(output)
    }
}

fn run_with_timeout(mut cmd: Command, limit: Duration) -> io::Result<CommandOutput> {
    let mut child = cmd.spawn()?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    let status = wait_until(&mut child, Instant::now() + limit);
    let collect = |handle: Option<thread::JoinHandle<String>>| {
        handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    };
    let stdout = collect(stdout);
    let stderr = collect(stderr);
    let status = status?;
    Ok(CommandOutput {
        code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        timed_out: status.is_none(),
    })
}

/// The parts of a child process the deadline loop drives.
trait Reap {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait(&mut self) -> io::Result<ExitStatus>;
}

impl Reap for Child {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self)
    }
}

/// Poll until the child exits. `None` means it was killed at the deadline.
/// The child is killed and reaped on every path that gives up on it,
/// including a failed poll.
fn wait_until(child: &mut impl Reap, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        }
        if Instant::now() >= deadline {
            // The child may have exited between try_wait and kill.
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain(mut pipe: impl Read + Send + 'static) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_summary_wording() {
        assert_eq!(
            CommandOutput::exited(2, "", "").status().to_string(),
            "exited with status 2"
        );
        let timed_out = CommandOutput {
            timed_out: true,
            ..CommandOutput::default()
        };
        assert!(!timed_out.success());
        assert_eq!(timed_out.status().to_string(), "timed out");
        assert!(CommandOutput::exited(0, "", "").success());
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let config = crate::ConnectionConfig {
            command: "/nonexistent/cqlsync-test-client".into(),
            ..crate::ConnectionConfig::default()
        };
        let cmd = config.command(&crate::Statement::new("DESC KEYSPACES"));
        let err = ProcessRunner::new().run(&cmd).unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_slow_commands() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5").stdout(Stdio::piped()).stderr(Stdio::piped());
        let output = run_with_timeout(cmd, Duration::from_millis(100)).unwrap();
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[test]
    fn failed_poll_kills_and_reaps_the_child() {
        use std::os::unix::process::ExitStatusExt;

        #[derive(Default)]
        struct Unpollable {
            killed: bool,
            reaped: bool,
        }

        impl Reap for Unpollable {
            fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
                Err(io::Error::other("poll failed"))
            }

            fn kill(&mut self) -> io::Result<()> {
                self.killed = true;
                Ok(())
            }

            fn wait(&mut self) -> io::Result<ExitStatus> {
                self.reaped = true;
                Ok(ExitStatus::from_raw(9))
            }
        }

        let mut child = Unpollable::default();
        let err = wait_until(&mut child, Instant::now() + Duration::from_secs(60)).unwrap_err();
        assert_eq!(err.to_string(), "poll failed");
        assert!(child.killed);
        assert!(child.reaped);
    }

    #[cfg(unix)]
    #[test]
    fn fast_commands_keep_their_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; exit 3"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let output = run_with_timeout(cmd, Duration::from_secs(10)).unwrap();
        assert!(!output.timed_out);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "out\n");
    }
}
