use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const REDACTED: &str = "******";

/// One rendered CQL statement plus the literal fragments that must never be
/// shown in logs or errors.
#[derive(Clone, PartialEq, Eq)]
pub struct Statement {
    text: String,
    secrets: Vec<String>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            secrets: Vec::new(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secrets.push(secret.into());
        self
    }

    /// Unredacted text, only for handing to the client.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn redacted(&self) -> String {
        redact(&self.text, &self.secrets)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Statement").field(&self.redacted()).finish()
    }
}

/// Fully resolved client invocation:
/// `<program> <auth-options> <additional-options> -e <statement> <host> <port>`.
#[derive(Clone)]
pub struct CqlCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub statement: Statement,
    pub timeout: Option<Duration>,
    /// Positions in `args` that are hidden whole, such as the value after `-p`.
    pub(crate) secret_args: Vec<usize>,
    /// Position in `args` of the statement text.
    pub(crate) statement_arg: Option<usize>,
}

impl CqlCommand {
    pub fn redacted(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().enumerate().map(|(i, arg)| {
            let arg = if self.secret_args.contains(&i) {
                REDACTED.to_string()
            } else if self.statement_arg == Some(i) {
                self.statement.redacted()
            } else {
                arg.clone()
            };
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("\"{}\"", arg.replace('"', "\\\""))
            } else {
                arg
            }
        }));
        parts.join(" ")
    }

    /// Hide the statement's secrets in text the client printed, which may
    /// echo the statement back.
    pub fn redact_output(&self, output: &str) -> String {
        redact(output, &self.statement.secrets)
    }
}

impl fmt::Display for CqlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for CqlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CqlCommand")
            .field("command", &self.redacted())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn redact(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
}
