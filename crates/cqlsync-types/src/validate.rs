use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::cql::{check_fragment, check_type_expr};
use crate::{DesiredState, Descriptor, GrantResource, Identity, Kind, Replication, Resource};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{kind} '{title}' is missing required attribute '{attribute}'")]
    MissingAttribute {
        kind: Kind,
        title: String,
        attribute: &'static str,
    },
    #[error("{kind} '{title}' has invalid attribute '{attribute}': {message}")]
    InvalidAttribute {
        kind: Kind,
        title: String,
        attribute: String,
        message: String,
    },
    #[error("{kind} '{identity}' is declared twice (by '{first}' and '{second}')")]
    DuplicateIdentity {
        kind: Kind,
        identity: Identity,
        first: String,
        second: String,
    },
    #[error("dependency graph contains a cycle through {kind}")]
    DependencyCycle { kind: Kind },
    #[error("invalid setting '{setting}': {message}")]
    InvalidSetting {
        setting: &'static str,
        message: String,
    },
}

pub const MAX_SCHEMA_NAME: usize = 48;

struct Checker<'a> {
    descriptor: &'a Descriptor,
}

impl Checker<'_> {
    fn missing(&self, attribute: &'static str) -> ConfigError {
        ConfigError::MissingAttribute {
            kind: self.descriptor.kind(),
            title: self.descriptor.title.clone(),
            attribute,
        }
    }

    fn invalid(&self, attribute: impl Into<String>, message: impl Into<String>) -> ConfigError {
        ConfigError::InvalidAttribute {
            kind: self.descriptor.kind(),
            title: self.descriptor.title.clone(),
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    fn name(&self, attribute: &'static str, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(self.missing(attribute));
        }
        if value.chars().any(char::is_control) {
            return Err(self.invalid(attribute, "contains a control character"));
        }
        Ok(())
    }

    /// Keyspace, type, table and index names: the cluster only accepts
    /// word characters, at most [`MAX_SCHEMA_NAME`] of them.
    fn schema_name(&self, attribute: &'static str, value: &str) -> Result<(), ConfigError> {
        self.name(attribute, value)?;
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(self.invalid(
                attribute,
                format!("'{value}' may only contain letters, digits and '_'"),
            ));
        }
        if value.len() > MAX_SCHEMA_NAME {
            return Err(self.invalid(
                attribute,
                format!("'{value}' is longer than {MAX_SCHEMA_NAME} characters"),
            ));
        }
        Ok(())
    }

    fn typed_fields<'f>(
        &self,
        attribute: &'static str,
        fields: impl Iterator<Item = (&'f String, &'f String)>,
    ) -> Result<(), ConfigError> {
        let mut count = 0;
        for (field, ty) in fields {
            self.name(attribute, field)?;
            check_type_expr(ty).map_err(|msg| self.invalid(format!("{attribute}.{field}"), msg))?;
            count += 1;
        }
        if count == 0 {
            return Err(self.missing(attribute));
        }
        Ok(())
    }
}

/// Validate a single descriptor's attributes for its kind.
pub fn validate_descriptor(descriptor: &Descriptor) -> Result<(), ConfigError> {
    let check = Checker { descriptor };
    // Dropping only needs the identity; creation needs the full definition.
    let present = descriptor.state == DesiredState::Present;
    match &descriptor.resource {
        Resource::Keyspace(ks) => {
            check.schema_name("name", &ks.name)?;
            match &ks.replication {
                None if present => return Err(check.missing("replication")),
                None => {}
                Some(Replication::Simple { replication_factor }) => {
                    if *replication_factor == 0 {
                        return Err(check.invalid(
                            "replication.replication_factor",
                            "must be at least 1",
                        ));
                    }
                }
                Some(Replication::NetworkTopology { datacenters }) => {
                    if datacenters.is_empty() {
                        return Err(check.missing("replication.<datacenter>"));
                    }
                    for (dc, factor) in datacenters {
                        check.name("replication.<datacenter>", dc)?;
                        if *factor == 0 {
                            return Err(check.invalid(
                                format!("replication.{dc}"),
                                "must be at least 1",
                            ));
                        }
                    }
                }
            }
        }
        Resource::Type(ty) => {
            check.schema_name("keyspace", &ty.keyspace)?;
            check.schema_name("name", &ty.name)?;
            if present {
                check.typed_fields("fields", ty.fields.iter())?;
            }
        }
        Resource::Table(table) => {
            check.schema_name("keyspace", &table.keyspace)?;
            check.schema_name("name", &table.name)?;
            if !present {
                return Ok(());
            }
            check.typed_fields("columns", table.columns.iter())?;
            if table.partition_key.is_empty() {
                return Err(check.missing("partition_key"));
            }
            let mut seen = HashSet::new();
            for (attribute, column) in table
                .partition_key
                .iter()
                .map(|c| ("partition_key", c))
                .chain(table.clustering_key.iter().map(|c| ("clustering_key", c)))
            {
                if !table.columns.contains_key(column) {
                    return Err(check.invalid(
                        attribute,
                        format!("column '{column}' is not declared"),
                    ));
                }
                if !seen.insert(column) {
                    return Err(check.invalid(
                        attribute,
                        format!("column '{column}' is used twice in the primary key"),
                    ));
                }
            }
            for fragment in &table.options {
                check_fragment(fragment).map_err(|msg| check.invalid("options", msg))?;
            }
        }
        Resource::Index(index) => {
            check.schema_name("keyspace", &index.keyspace)?;
            check.schema_name("table", &index.table)?;
            check.schema_name("name", &index.name)?;
            match &index.target {
                Some(target) => check.name("keys", &target.column)?,
                None if present => return Err(check.missing("keys")),
                None => {}
            }
            if let Some(class) = &index.class {
                check.name("class", class)?;
            }
            if index.class.is_none() && !index.options.is_empty() {
                return Err(check.invalid("options", "only custom indexes accept options"));
            }
        }
        Resource::User(user) => {
            check.name("name", &user.name)?;
        }
        Resource::Permission(perm) => {
            check.name("user_name", &perm.grantee)?;
            match &perm.resource {
                GrantResource::AllKeyspaces => {}
                GrantResource::Keyspace { keyspace } => {
                    check.schema_name("keyspace_name", keyspace)?
                }
                GrantResource::Table { keyspace, table } => {
                    check.schema_name("keyspace_name", keyspace)?;
                    check.schema_name("table_name", table)?;
                }
            }
        }
    }
    Ok(())
}

/// Validate every descriptor and reject duplicate `(kind, identity)` pairs.
pub fn validate_descriptors(descriptors: &[Descriptor]) -> Result<(), ConfigError> {
    let mut seen: HashMap<(Kind, Identity), &str> = HashMap::new();
    for descriptor in descriptors {
        validate_descriptor(descriptor)?;
        let key = (descriptor.kind(), descriptor.identity());
        if let Some(first) = seen.get(&key) {
            return Err(ConfigError::DuplicateIdentity {
                kind: key.0,
                identity: key.1,
                first: (*first).to_string(),
                second: descriptor.title.clone(),
            });
        }
        seen.insert(key, descriptor.title.as_str());
    }
    Ok(())
}
