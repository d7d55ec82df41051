use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Kind;
use crate::cql::{qualified, quote_ident};

/// Target existence state of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
}

/// Unique key of a schema object within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Identity {
    /// Cluster-wide names: keyspaces and roles.
    Global { name: String },
    /// Objects living inside a keyspace: types, tables and indexes.
    Scoped { keyspace: String, name: String },
    Grant {
        grantee: String,
        privilege: Privilege,
        resource: GrantResource,
    },
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Global { name } => write!(f, "{name}"),
            Identity::Scoped { keyspace, name } => write!(f, "{keyspace}.{name}"),
            Identity::Grant {
                grantee,
                privilege,
                resource,
            } => write!(f, "{privilege} on {resource} to {grantee}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Replication {
    Simple { replication_factor: u32 },
    NetworkTopology { datacenters: IndexMap<String, u32> },
}

impl Replication {
    pub fn class(&self) -> &'static str {
        match self {
            Replication::Simple { .. } => "SimpleStrategy",
            Replication::NetworkTopology { .. } => "NetworkTopologyStrategy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyspaceSpec {
    pub name: String,
    /// Required when the keyspace should be present.
    pub replication: Option<Replication>,
    pub durable_writes: bool,
}

/// User-defined type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSpec {
    pub keyspace: String,
    pub name: String,
    /// Field name to CQL type expression, in declaration order.
    pub fields: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSpec {
    pub keyspace: String,
    pub name: String,
    /// Column name to CQL type expression, in declaration order.
    pub columns: IndexMap<String, String>,
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
    /// Raw `WITH` fragments, joined with `AND`.
    pub options: Vec<String>,
}

/// Collection indexing function wrapped around an index target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFunction {
    Keys,
    Values,
    Entries,
    Full,
}

impl IndexFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexFunction::Keys => "KEYS",
            IndexFunction::Values => "VALUES",
            IndexFunction::Entries => "ENTRIES",
            IndexFunction::Full => "FULL",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "keys" => Some(IndexFunction::Keys),
            "values" => Some(IndexFunction::Values),
            "entries" => Some(IndexFunction::Entries),
            "full" => Some(IndexFunction::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexTarget {
    pub function: Option<IndexFunction>,
    pub column: String,
}

impl IndexTarget {
    pub fn column(column: impl Into<String>) -> Self {
        Self {
            function: None,
            column: column.into(),
        }
    }

    /// Parse `col` or `keys(col)` style targets.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.split_once('(') {
            None => (!raw.is_empty()).then(|| Self::column(raw)),
            Some((func, rest)) => {
                let function = IndexFunction::parse(func.trim())?;
                let column = rest.strip_suffix(')')?.trim();
                (!column.is_empty()).then(|| Self {
                    function: Some(function),
                    column: column.to_string(),
                })
            }
        }
    }

    pub fn render(&self) -> String {
        match self.function {
            None => quote_ident(&self.column),
            Some(func) => format!("{}({})", func.as_str(), quote_ident(&self.column)),
        }
    }
}

/// Secondary index, optionally a custom index class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    /// Required when the index should be present.
    pub target: Option<IndexTarget>,
    pub class: Option<String>,
    pub options: IndexMap<String, String>,
}

/// Role with optional password. Serialization skips the password.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct UserSpec {
    pub name: String,
    #[serde(skip)]
    pub password: Option<String>,
    pub superuser: bool,
    pub login: bool,
}

impl fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSpec")
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("superuser", &self.superuser)
            .field("login", &self.login)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privilege {
    All,
    Alter,
    Authorize,
    Create,
    Drop,
    Modify,
    Select,
}

impl Privilege {
    pub fn as_str(self) -> &'static str {
        match self {
            Privilege::All => "ALL",
            Privilege::Alter => "ALTER",
            Privilege::Authorize => "AUTHORIZE",
            Privilege::Create => "CREATE",
            Privilege::Drop => "DROP",
            Privilege::Modify => "MODIFY",
            Privilege::Select => "SELECT",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ALL" | "ALL PERMISSIONS" => Some(Privilege::All),
            "ALTER" => Some(Privilege::Alter),
            "AUTHORIZE" => Some(Privilege::Authorize),
            "CREATE" => Some(Privilege::Create),
            "DROP" => Some(Privilege::Drop),
            "MODIFY" => Some(Privilege::Modify),
            "SELECT" => Some(Privilege::Select),
            _ => None,
        }
    }

    /// Keyword used in GRANT/REVOKE/LIST statements.
    pub fn statement_keyword(self) -> &'static str {
        match self {
            Privilege::All => "ALL PERMISSIONS",
            other => other.as_str(),
        }
    }

    /// Concrete privileges this one stands for on `resource`.
    pub fn expand(self, resource: &GrantResource) -> Vec<Privilege> {
        match self {
            Privilege::All => resource.applicable_privileges().to_vec(),
            other => vec![other],
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "on", rename_all = "snake_case")]
pub enum GrantResource {
    AllKeyspaces,
    Keyspace { keyspace: String },
    Table { keyspace: String, table: String },
}

impl GrantResource {
    pub fn applicable_privileges(&self) -> &'static [Privilege] {
        match self {
            GrantResource::AllKeyspaces | GrantResource::Keyspace { .. } => &[
                Privilege::Alter,
                Privilege::Authorize,
                Privilege::Create,
                Privilege::Drop,
                Privilege::Modify,
                Privilege::Select,
            ],
            GrantResource::Table { .. } => &[
                Privilege::Alter,
                Privilege::Authorize,
                Privilege::Drop,
                Privilege::Modify,
                Privilege::Select,
            ],
        }
    }

    /// How `LIST ... PERMISSIONS` prints the resource: `<all keyspaces>`,
    /// `<keyspace ks>` or `<table ks.t>`, names unquoted.
    pub fn listed_as(&self) -> String {
        format!("<{self}>")
    }

    /// Resource clause as written after `ON`.
    pub fn render(&self) -> String {
        match self {
            GrantResource::AllKeyspaces => "ALL KEYSPACES".into(),
            GrantResource::Keyspace { keyspace } => format!("KEYSPACE {}", quote_ident(keyspace)),
            GrantResource::Table { keyspace, table } => {
                format!("TABLE {}", qualified(keyspace, table))
            }
        }
    }
}

impl fmt::Display for GrantResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantResource::AllKeyspaces => f.write_str("all keyspaces"),
            GrantResource::Keyspace { keyspace } => write!(f, "keyspace {keyspace}"),
            GrantResource::Table { keyspace, table } => write!(f, "table {keyspace}.{table}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSpec {
    pub grantee: String,
    pub privilege: Privilege,
    pub resource: GrantResource,
}

/// Kind-specific attributes of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Keyspace(KeyspaceSpec),
    Type(TypeSpec),
    Table(TableSpec),
    Index(IndexSpec),
    User(UserSpec),
    Permission(PermissionSpec),
}

/// One declared schema object and the existence state it should converge to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    /// Key the object was declared under in the desired-state file.
    pub title: String,
    pub state: DesiredState,
    pub resource: Resource,
}

impl Descriptor {
    pub fn new(title: impl Into<String>, state: DesiredState, resource: Resource) -> Self {
        Self {
            title: title.into(),
            state,
            resource,
        }
    }

    pub fn present(title: impl Into<String>, resource: Resource) -> Self {
        Self::new(title, DesiredState::Present, resource)
    }

    pub fn absent(title: impl Into<String>, resource: Resource) -> Self {
        Self::new(title, DesiredState::Absent, resource)
    }

    pub fn kind(&self) -> Kind {
        match &self.resource {
            Resource::Keyspace(_) => Kind::Keyspace,
            Resource::Type(_) => Kind::Type,
            Resource::Table(_) => Kind::Table,
            Resource::Index(_) => Kind::Index,
            Resource::User(_) => Kind::User,
            Resource::Permission(_) => Kind::Permission,
        }
    }

    pub fn identity(&self) -> Identity {
        match &self.resource {
            Resource::Keyspace(ks) => Identity::Global {
                name: ks.name.clone(),
            },
            Resource::Type(spec) => Identity::Scoped {
                keyspace: spec.keyspace.clone(),
                name: spec.name.clone(),
            },
            Resource::Table(spec) => Identity::Scoped {
                keyspace: spec.keyspace.clone(),
                name: spec.name.clone(),
            },
            Resource::Index(spec) => Identity::Scoped {
                keyspace: spec.keyspace.clone(),
                name: spec.name.clone(),
            },
            Resource::User(user) => Identity::Global {
                name: user.name.clone(),
            },
            Resource::Permission(perm) => Identity::Grant {
                grantee: perm.grantee.clone(),
                privilege: perm.privilege,
                resource: perm.resource.clone(),
            },
        }
    }
}
