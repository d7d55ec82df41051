//! Desired-state file: connection settings plus per-kind tables of
//! descriptors keyed by title.
//!
//! ```toml
//! [connection]
//! host = "10.0.0.5"
//! connection_tries = 3
//!
//! [keyspaces.ks1]
//! replication = { class = "SimpleStrategy", replication_factor = 3 }
//!
//! [types.fullname]
//! keyspace = "ks1"
//! fields = { fname = "text", lname = "text" }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use cqlsync_types::{
    ConfigError, DesiredState, Descriptor, GrantResource, IndexSpec, IndexTarget, KeyspaceSpec,
    Kind, PermissionSpec, Privilege, Replication, Resource, TableSpec, TypeSpec, UserSpec,
};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::config::{
    Auth, ConnectionConfig, DEFAULT_COMMAND, DEFAULT_CONNECTION_TRIES, DEFAULT_CONNECTION_TRY_SLEEP,
    DEFAULT_HOST, DEFAULT_PORT, RetryPolicy,
};
use crate::error::EngineError;

/// Keyspace name meaning "every keyspace" in permission entries.
const ALL_KEYSPACES: &str = "ALL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub keyspaces: IndexMap<String, KeyspaceEntry>,
    #[serde(default)]
    pub types: IndexMap<String, TypeEntry>,
    #[serde(default)]
    pub tables: IndexMap<String, TableEntry>,
    #[serde(default)]
    pub indexes: IndexMap<String, IndexEntry>,
    #[serde(default)]
    pub users: IndexMap<String, UserEntry>,
    #[serde(default)]
    pub permissions: IndexMap<String, PermissionEntry>,
}

/// Connection settings as written in the file or given on the command line.
/// Unset fields fall back to defaults in [`ConnectionSettings::resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSettings {
    pub command: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub connection_tries: Option<u32>,
    /// Seconds.
    pub connection_try_sleep: Option<u64>,
    /// Seconds.
    pub command_timeout: Option<u64>,
    pub additional_options: Option<String>,
    pub auth: Option<AuthSettings>,
}

#[derive(Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum AuthSettings {
    None,
    Inline { user: String, password: String },
    CredentialFile { path: PathBuf },
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthSettings::None => f.write_str("None"),
            AuthSettings::Inline { user, .. } => {
                f.debug_struct("Inline").field("user", user).finish_non_exhaustive()
            }
            AuthSettings::CredentialFile { path } => {
                f.debug_struct("CredentialFile").field("path", path).finish()
            }
        }
    }
}

impl ConnectionSettings {
    /// Fields set in `overrides` win.
    pub fn overlay(&self, overrides: &ConnectionSettings) -> ConnectionSettings {
        ConnectionSettings {
            command: overrides.command.clone().or_else(|| self.command.clone()),
            host: overrides.host.clone().or_else(|| self.host.clone()),
            port: overrides.port.or(self.port),
            connection_tries: overrides.connection_tries.or(self.connection_tries),
            connection_try_sleep: overrides.connection_try_sleep.or(self.connection_try_sleep),
            command_timeout: overrides.command_timeout.or(self.command_timeout),
            additional_options: overrides
                .additional_options
                .clone()
                .or_else(|| self.additional_options.clone()),
            auth: overrides.auth.clone().or_else(|| self.auth.clone()),
        }
    }

    pub fn resolve(&self) -> Result<ConnectionConfig, ConfigError> {
        let retry = RetryPolicy::new(
            self.connection_tries.unwrap_or(DEFAULT_CONNECTION_TRIES),
            self.connection_try_sleep
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECTION_TRY_SLEEP),
        )?;
        let host = self.host.clone().unwrap_or_else(|| DEFAULT_HOST.into());
        if host.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                setting: "host",
                message: "must not be empty".into(),
            });
        }
        let command_timeout = match self.command_timeout {
            Some(0) => {
                return Err(ConfigError::InvalidSetting {
                    setting: "command_timeout",
                    message: "must be at least 1 second".into(),
                });
            }
            other => other.map(Duration::from_secs),
        };
        let auth = match &self.auth {
            None | Some(AuthSettings::None) => Auth::None,
            Some(AuthSettings::Inline { user, password }) => {
                if user.trim().is_empty() {
                    return Err(ConfigError::InvalidSetting {
                        setting: "auth.user",
                        message: "must not be empty".into(),
                    });
                }
                Auth::Inline {
                    user: user.clone(),
                    password: password.clone(),
                }
            }
            Some(AuthSettings::CredentialFile { path }) => Auth::CredentialFile(path.clone()),
        };
        Ok(ConnectionConfig {
            command: self
                .command
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_COMMAND)),
            host,
            port: self.port.unwrap_or(DEFAULT_PORT),
            auth,
            additional_options: self
                .additional_options
                .as_deref()
                .map(|opts| opts.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            retry,
            command_timeout,
        })
    }
}

/// Scalar inside a replication map: the class name or a replication factor.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReplicationValue {
    Factor(u32),
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyspaceEntry {
    #[serde(default)]
    pub ensure: DesiredState,
    pub name: Option<String>,
    #[serde(default)]
    pub replication: IndexMap<String, ReplicationValue>,
    #[serde(default = "default_true")]
    pub durable_writes: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeEntry {
    #[serde(default)]
    pub ensure: DesiredState,
    pub keyspace: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableEntry {
    #[serde(default)]
    pub ensure: DesiredState,
    pub keyspace: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub columns: IndexMap<String, String>,
    /// Defaults to the first declared column.
    #[serde(default)]
    pub partition_key: Vec<String>,
    #[serde(default)]
    pub clustering_key: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexEntry {
    #[serde(default)]
    pub ensure: DesiredState,
    pub keyspace: Option<String>,
    pub table: Option<String>,
    pub name: Option<String>,
    /// `column` or `keys(column)` style target.
    pub keys: Option<String>,
    pub class: Option<String>,
    #[serde(default)]
    pub options: IndexMap<String, String>,
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserEntry {
    #[serde(default)]
    pub ensure: DesiredState,
    pub name: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub superuser: bool,
    #[serde(default = "default_true")]
    pub login: bool,
}

impl std::fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserEntry")
            .field("ensure", &self.ensure)
            .field("name", &self.name)
            .field("superuser", &self.superuser)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionEntry {
    #[serde(default)]
    pub ensure: DesiredState,
    pub user_name: Option<String>,
    pub keyspace_name: Option<String>,
    pub table_name: Option<String>,
    pub permission_name: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Manifest {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let manifest_error = |message: String| EngineError::Manifest {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text).map_err(manifest_error)
        } else {
            Self::from_toml_str(&text).map_err(manifest_error)
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    pub fn from_json_str(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| e.to_string())
    }

    /// Materialize typed descriptors: keyspaces first, then types, tables,
    /// indexes, users and permissions, each in declaration order.
    pub fn descriptors(&self) -> Result<Vec<Descriptor>, ConfigError> {
        let mut out = Vec::new();
        for (title, entry) in &self.keyspaces {
            out.push(keyspace(title, entry)?);
        }
        for (title, entry) in &self.types {
            let keyspace = required(Kind::Type, title, "keyspace", &entry.keyspace)?;
            let spec = TypeSpec {
                keyspace,
                name: name_or_title(&entry.name, title),
                fields: entry.fields.clone(),
            };
            out.push(Descriptor::new(title, entry.ensure, Resource::Type(spec)));
        }
        for (title, entry) in &self.tables {
            let keyspace = required(Kind::Table, title, "keyspace", &entry.keyspace)?;
            let partition_key = if entry.partition_key.is_empty() {
                entry.columns.keys().take(1).cloned().collect()
            } else {
                entry.partition_key.clone()
            };
            let spec = TableSpec {
                keyspace,
                name: name_or_title(&entry.name, title),
                columns: entry.columns.clone(),
                partition_key,
                clustering_key: entry.clustering_key.clone(),
                options: entry.options.clone(),
            };
            out.push(Descriptor::new(title, entry.ensure, Resource::Table(spec)));
        }
        for (title, entry) in &self.indexes {
            out.push(index(title, entry)?);
        }
        for (title, entry) in &self.users {
            let spec = UserSpec {
                name: name_or_title(&entry.name, title),
                password: entry.password.clone(),
                superuser: entry.superuser,
                login: entry.login,
            };
            out.push(Descriptor::new(title, entry.ensure, Resource::User(spec)));
        }
        for (title, entry) in &self.permissions {
            out.push(permission(title, entry)?);
        }
        Ok(out)
    }
}

fn name_or_title(name: &Option<String>, title: &str) -> String {
    name.clone().unwrap_or_else(|| title.to_string())
}

fn required(
    kind: Kind,
    title: &str,
    attribute: &'static str,
    value: &Option<String>,
) -> Result<String, ConfigError> {
    value.clone().ok_or_else(|| ConfigError::MissingAttribute {
        kind,
        title: title.to_string(),
        attribute,
    })
}

fn invalid(kind: Kind, title: &str, attribute: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidAttribute {
        kind,
        title: title.to_string(),
        attribute: attribute.to_string(),
        message: message.into(),
    }
}

fn keyspace(title: &str, entry: &KeyspaceEntry) -> Result<Descriptor, ConfigError> {
    let replication = if entry.replication.is_empty() {
        None
    } else {
        Some(replication(title, &entry.replication)?)
    };
    let spec = KeyspaceSpec {
        name: name_or_title(&entry.name, title),
        replication,
        durable_writes: entry.durable_writes,
    };
    Ok(Descriptor::new(title, entry.ensure, Resource::Keyspace(spec)))
}

fn replication(
    title: &str,
    map: &IndexMap<String, ReplicationValue>,
) -> Result<Replication, ConfigError> {
    let class = match map.get("class") {
        Some(ReplicationValue::Text(class)) => class.as_str(),
        Some(ReplicationValue::Factor(_)) => {
            return Err(invalid(Kind::Keyspace, title, "replication.class", "must be a string"));
        }
        None => {
            return Err(ConfigError::MissingAttribute {
                kind: Kind::Keyspace,
                title: title.to_string(),
                attribute: "replication.class",
            });
        }
    };
    let factor = |key: &str, value: &ReplicationValue| match value {
        ReplicationValue::Factor(n) => Ok(*n),
        ReplicationValue::Text(raw) => raw.trim().parse::<u32>().map_err(|_| {
            invalid(
                Kind::Keyspace,
                title,
                &format!("replication.{key}"),
                format!("'{raw}' is not a replication factor"),
            )
        }),
    };
    // Accept both the short and the fully qualified class names.
    match class.rsplit('.').next().unwrap_or(class) {
        "SimpleStrategy" => {
            let value = map.get("replication_factor").ok_or_else(|| {
                ConfigError::MissingAttribute {
                    kind: Kind::Keyspace,
                    title: title.to_string(),
                    attribute: "replication.replication_factor",
                }
            })?;
            if let Some(extra) = map
                .keys()
                .find(|k| !matches!(k.as_str(), "class" | "replication_factor"))
            {
                return Err(invalid(
                    Kind::Keyspace,
                    title,
                    &format!("replication.{extra}"),
                    "not valid for SimpleStrategy",
                ));
            }
            Ok(Replication::Simple {
                replication_factor: factor("replication_factor", value)?,
            })
        }
        "NetworkTopologyStrategy" => {
            let mut datacenters = IndexMap::new();
            for (dc, value) in map.iter().filter(|(k, _)| k.as_str() != "class") {
                datacenters.insert(dc.clone(), factor(dc, value)?);
            }
            Ok(Replication::NetworkTopology { datacenters })
        }
        other => Err(invalid(
            Kind::Keyspace,
            title,
            "replication.class",
            format!("unsupported replication class '{other}'"),
        )),
    }
}

fn index(title: &str, entry: &IndexEntry) -> Result<Descriptor, ConfigError> {
    let target = match &entry.keys {
        None => None,
        Some(raw) => Some(IndexTarget::parse(raw).ok_or_else(|| {
            invalid(
                Kind::Index,
                title,
                "keys",
                format!("'{raw}' is not a column or keys(...)/values(...)/entries(...)/full(...) target"),
            )
        })?),
    };
    let spec = IndexSpec {
        keyspace: required(Kind::Index, title, "keyspace", &entry.keyspace)?,
        table: required(Kind::Index, title, "table", &entry.table)?,
        name: name_or_title(&entry.name, title),
        target,
        class: entry.class.clone(),
        options: entry.options.clone(),
    };
    Ok(Descriptor::new(title, entry.ensure, Resource::Index(spec)))
}

fn permission(title: &str, entry: &PermissionEntry) -> Result<Descriptor, ConfigError> {
    let grantee = required(Kind::Permission, title, "user_name", &entry.user_name)?;
    let privilege = match &entry.permission_name {
        None => Privilege::All,
        Some(raw) => Privilege::parse(raw).ok_or_else(|| {
            invalid(
                Kind::Permission,
                title,
                "permission_name",
                format!("unknown permission '{raw}'"),
            )
        })?,
    };
    let keyspace = entry
        .keyspace_name
        .clone()
        .unwrap_or_else(|| ALL_KEYSPACES.to_string());
    let resource = match (keyspace.as_str(), &entry.table_name) {
        (ALL_KEYSPACES, None) => GrantResource::AllKeyspaces,
        (ALL_KEYSPACES, Some(_)) => {
            return Err(invalid(
                Kind::Permission,
                title,
                "table_name",
                "requires a specific keyspace_name",
            ));
        }
        (_, None) => GrantResource::Keyspace { keyspace },
        (_, Some(table)) => GrantResource::Table {
            keyspace,
            table: table.clone(),
        },
    };
    let spec = PermissionSpec {
        grantee,
        privilege,
        resource,
    };
    Ok(Descriptor::new(title, entry.ensure, Resource::Permission(spec)))
}
