use std::path::PathBuf;
use std::time::Duration;

use cqlsync_types::ConfigError;

use crate::command::{CqlCommand, Statement};

pub const DEFAULT_COMMAND: &str = "cqlsh";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9042;
pub const DEFAULT_CONNECTION_TRIES: u32 = 6;
pub const DEFAULT_CONNECTION_TRY_SLEEP: Duration = Duration::from_secs(30);

/// How the client authenticates against the store.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Auth {
    #[default]
    None,
    Inline { user: String, password: String },
    /// cqlshrc-style file holding the credentials, produced elsewhere.
    CredentialFile(PathBuf),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Inline { user, .. } => f
                .debug_struct("Inline")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
            Auth::CredentialFile(path) => f.debug_tuple("CredentialFile").field(path).finish(),
        }
    }
}

/// Connectivity probe retry policy. `tries` is always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    tries: u32,
    sleep: Duration,
}

impl RetryPolicy {
    pub fn new(tries: u32, sleep: Duration) -> Result<Self, ConfigError> {
        if tries == 0 {
            return Err(ConfigError::InvalidSetting {
                setting: "connection_tries",
                message: "must be at least 1".into(),
            });
        }
        Ok(Self { tries, sleep })
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn sleep(&self) -> Duration {
        self.sleep
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: DEFAULT_CONNECTION_TRIES,
            sleep: DEFAULT_CONNECTION_TRY_SLEEP,
        }
    }
}

/// Everything needed to invoke the client. Built once per run.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub command: PathBuf,
    pub host: String,
    pub port: u16,
    pub auth: Auth,
    /// Raw extra client arguments, passed through untouched.
    pub additional_options: Vec<String>,
    pub retry: RetryPolicy,
    /// Optional per-command time limit.
    pub command_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from(DEFAULT_COMMAND),
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            auth: Auth::None,
            additional_options: Vec::new(),
            retry: RetryPolicy::default(),
            command_timeout: None,
        }
    }
}

impl ConnectionConfig {
    /// Wrap a statement into a full client invocation.
    pub fn command(&self, statement: &Statement) -> CqlCommand {
        let mut args = Vec::new();
        let mut secret_args = Vec::new();
        match &self.auth {
            Auth::None => {}
            Auth::Inline { user, password } => {
                args.extend(["-u".to_string(), user.clone(), "-p".to_string()]);
                secret_args.push(args.len());
                args.push(password.clone());
            }
            Auth::CredentialFile(path) => {
                args.push(format!("--cqlshrc={}", path.display()));
            }
        }
        args.extend(self.additional_options.iter().cloned());
        args.push("-e".into());
        let statement_arg = args.len();
        args.push(statement.text().to_string());
        args.push(self.host.clone());
        args.push(self.port.to_string());
        CqlCommand {
            program: self.command.clone(),
            args,
            statement: statement.clone(),
            timeout: self.command_timeout,
            secret_args,
            statement_arg: Some(statement_arg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_rejects_zero_tries() {
        assert!(RetryPolicy::new(0, Duration::ZERO).is_err());
        let policy = RetryPolicy::new(1, Duration::from_secs(2)).unwrap();
        assert_eq!(policy.tries(), 1);
        assert_eq!(policy.sleep(), Duration::from_secs(2));
    }

    #[test]
    fn defaults_follow_documented_values() {
        let config = ConnectionConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9042);
        assert_eq!(config.retry.tries(), 6);
        assert_eq!(config.retry.sleep(), Duration::from_secs(30));
    }

    #[test]
    fn command_layout_puts_script_before_host_and_port() {
        let config = ConnectionConfig {
            auth: Auth::CredentialFile(PathBuf::from("/root/.cqlshrc")),
            additional_options: vec!["--ssl".into()],
            ..ConnectionConfig::default()
        };
        let cmd = config.command(&Statement::new("DESC KEYSPACES"));
        assert_eq!(cmd.program, PathBuf::from("cqlsh"));
        assert_eq!(
            cmd.args,
            vec![
                "--cqlshrc=/root/.cqlshrc",
                "--ssl",
                "-e",
                "DESC KEYSPACES",
                "localhost",
                "9042"
            ]
        );
    }

    #[test]
    fn inline_password_is_redacted_everywhere() {
        let config = ConnectionConfig {
            auth: Auth::Inline {
                user: "admin".into(),
                password: "pa55".into(),
            },
            ..ConnectionConfig::default()
        };
        let cmd = config.command(&Statement::new("DESC KEYSPACES"));
        assert!(cmd.args.contains(&"pa55".to_string()));
        assert!(!cmd.to_string().contains("pa55"));
        assert!(!format!("{:?}", config.auth).contains("pa55"));
    }

    #[test]
    fn one_character_password_leaves_other_arguments_alone() {
        let config = ConnectionConfig {
            auth: Auth::Inline {
                user: "admin".into(),
                password: "1".into(),
            },
            host: "10.1.1.1".into(),
            ..ConnectionConfig::default()
        };
        let cmd = config.command(&Statement::new("DESC KEYSPACES"));
        assert_eq!(
            cmd.to_string(),
            "cqlsh -u admin -p ****** -e \"DESC KEYSPACES\" 10.1.1.1 9042"
        );
    }
}
