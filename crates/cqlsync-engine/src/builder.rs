//! Renders descriptors into CQL.
//!
//! Identifiers go through [`quote_ident`]/[`qualified`] and string values
//! through [`quote_literal`]; nothing user supplied is interpolated any other
//! way. Type expressions and table option fragments are inserted as written
//! and rely on validation having run first.

use cqlsync_types::cql::{qualified, quote_ident, quote_literal};
use cqlsync_types::{
    DesiredState, Descriptor, IndexSpec, KeyspaceSpec, PermissionSpec, Replication, Resource,
    TableSpec, TypeSpec, UserSpec,
};

use crate::command::Statement;

pub const LIST_KEYSPACES: &str = "DESC KEYSPACES";
pub const LIST_ROLES: &str = "LIST ROLES";

/// Introspection statement for the descriptor's kind and identity.
pub fn build_read(descriptor: &Descriptor) -> Statement {
    let text = match &descriptor.resource {
        // No per-keyspace describe that fails cleanly on absence, so list them all.
        Resource::Keyspace(_) => LIST_KEYSPACES.to_string(),
        Resource::Type(ty) => format!("DESC TYPE {}", qualified(&ty.keyspace, &ty.name)),
        Resource::Table(table) => {
            format!("DESC TABLE {}", qualified(&table.keyspace, &table.name))
        }
        Resource::Index(index) => {
            format!("DESC INDEX {}", qualified(&index.keyspace, &index.name))
        }
        Resource::User(_) => LIST_ROLES.to_string(),
        // Without NORECURSIVE, grants on parent resources are listed too.
        Resource::Permission(perm) => format!(
            "LIST {} ON {} OF {} NORECURSIVE",
            perm.privilege.statement_keyword(),
            perm.resource.render(),
            quote_ident(&perm.grantee)
        ),
    };
    Statement::new(text)
}

/// Create or drop statement, depending on the desired state.
pub fn build_write(descriptor: &Descriptor) -> Statement {
    match descriptor.state {
        DesiredState::Present => build_create(descriptor),
        DesiredState::Absent => build_drop(descriptor),
    }
}

pub fn build_create(descriptor: &Descriptor) -> Statement {
    match &descriptor.resource {
        Resource::Keyspace(ks) => Statement::new(create_keyspace(ks)),
        Resource::Type(ty) => Statement::new(create_type(ty)),
        Resource::Table(table) => Statement::new(create_table(table)),
        Resource::Index(index) => Statement::new(create_index(index)),
        Resource::User(user) => create_role(user),
        Resource::Permission(perm) => Statement::new(grant(perm)),
    }
}

pub fn build_drop(descriptor: &Descriptor) -> Statement {
    let text = match &descriptor.resource {
        Resource::Keyspace(ks) => format!("DROP KEYSPACE {}", quote_ident(&ks.name)),
        Resource::Type(ty) => format!("DROP TYPE {}", qualified(&ty.keyspace, &ty.name)),
        Resource::Table(table) => {
            format!("DROP TABLE {}", qualified(&table.keyspace, &table.name))
        }
        Resource::Index(index) => {
            format!("DROP INDEX {}", qualified(&index.keyspace, &index.name))
        }
        Resource::User(user) => format!("DROP ROLE {}", quote_ident(&user.name)),
        Resource::Permission(perm) => format!(
            "REVOKE {} ON {} FROM {}",
            perm.privilege.statement_keyword(),
            perm.resource.render(),
            quote_ident(&perm.grantee)
        ),
    };
    Statement::new(text)
}

fn create_keyspace(ks: &KeyspaceSpec) -> String {
    let mut text = format!("CREATE KEYSPACE IF NOT EXISTS {}", quote_ident(&ks.name));
    if let Some(replication) = &ks.replication {
        let mut entries = vec![format!("'class' : {}", quote_literal(replication.class()))];
        match replication {
            Replication::Simple { replication_factor } => {
                entries.push(format!("'replication_factor' : {replication_factor}"));
            }
            Replication::NetworkTopology { datacenters } => {
                entries.extend(
                    datacenters
                        .iter()
                        .map(|(dc, factor)| format!("{} : {factor}", quote_literal(dc))),
                );
            }
        }
        text.push_str(&format!(" WITH REPLICATION = {{ {} }}", entries.join(", ")));
        text.push_str(&format!(" AND DURABLE_WRITES = {}", ks.durable_writes));
    }
    text
}

fn field_list<'a>(fields: impl Iterator<Item = (&'a String, &'a String)>) -> Vec<String> {
    fields
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.trim()))
        .collect()
}

fn create_type(ty: &TypeSpec) -> String {
    format!(
        "CREATE TYPE IF NOT EXISTS {} ({})",
        qualified(&ty.keyspace, &ty.name),
        field_list(ty.fields.iter()).join(", ")
    )
}

fn create_table(table: &TableSpec) -> String {
    let mut parts = field_list(table.columns.iter());
    let partition = table
        .partition_key
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>();
    let mut key = match partition.as_slice() {
        [single] => vec![single.clone()],
        _ => vec![format!("({})", partition.join(", "))],
    };
    key.extend(table.clustering_key.iter().map(|c| quote_ident(c)));
    parts.push(format!("PRIMARY KEY ({})", key.join(", ")));

    let mut text = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified(&table.keyspace, &table.name),
        parts.join(", ")
    );
    if !table.options.is_empty() {
        let options = table
            .options
            .iter()
            .map(|o| o.trim())
            .collect::<Vec<_>>();
        text.push_str(&format!(" WITH {}", options.join(" AND ")));
    }
    text
}

fn create_index(index: &IndexSpec) -> String {
    let custom = if index.class.is_some() { "CUSTOM " } else { "" };
    let target = index
        .target
        .as_ref()
        .map(|t| t.render())
        .unwrap_or_default();
    let mut text = format!(
        "CREATE {custom}INDEX IF NOT EXISTS {} ON {} ({target})",
        quote_ident(&index.name),
        qualified(&index.keyspace, &index.table),
    );
    if let Some(class) = &index.class {
        text.push_str(&format!(" USING {}", quote_literal(class)));
        if !index.options.is_empty() {
            let options = index
                .options
                .iter()
                .map(|(k, v)| format!("{}: {}", quote_literal(k), quote_literal(v)))
                .collect::<Vec<_>>();
            text.push_str(&format!(" WITH OPTIONS = {{{}}}", options.join(", ")));
        }
    }
    text
}

fn create_role(user: &UserSpec) -> Statement {
    let mut clauses = Vec::new();
    let mut secret = None;
    if let Some(password) = &user.password {
        let literal = quote_literal(password);
        clauses.push(format!("PASSWORD = {literal}"));
        secret = Some(literal);
    }
    clauses.push(format!("LOGIN = {}", user.login));
    clauses.push(format!("SUPERUSER = {}", user.superuser));
    let statement = Statement::new(format!(
        "CREATE ROLE IF NOT EXISTS {} WITH {}",
        quote_ident(&user.name),
        clauses.join(" AND ")
    ));
    match secret {
        Some(secret) => statement.with_secret(secret),
        None => statement,
    }
}

fn grant(perm: &PermissionSpec) -> String {
    format!(
        "GRANT {} ON {} TO {}",
        perm.privilege.statement_keyword(),
        perm.resource.render(),
        quote_ident(&perm.grantee)
    )
}
