//! Descriptor builders shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use cqlsync_engine::{ConnectionConfig, RetryPolicy};
use cqlsync_types::{
    Descriptor, GrantResource, IndexSpec, IndexTarget, KeyspaceSpec, PermissionSpec, Privilege,
    Replication, Resource, TableSpec, TypeSpec, UserSpec,
};
use indexmap::IndexMap;

pub fn config() -> ConnectionConfig {
    ConnectionConfig {
        retry: RetryPolicy::new(6, Duration::from_secs(30)).unwrap(),
        ..ConnectionConfig::default()
    }
}

pub fn fields(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn keyspace(name: &str) -> Resource {
    Resource::Keyspace(KeyspaceSpec {
        name: name.into(),
        replication: Some(Replication::Simple {
            replication_factor: 1,
        }),
        durable_writes: true,
    })
}

pub fn udt(keyspace: &str, name: &str, pairs: &[(&str, &str)]) -> Resource {
    Resource::Type(TypeSpec {
        keyspace: keyspace.into(),
        name: name.into(),
        fields: fields(pairs),
    })
}

pub fn table(keyspace: &str, name: &str, pairs: &[(&str, &str)]) -> Resource {
    Resource::Table(TableSpec {
        keyspace: keyspace.into(),
        name: name.into(),
        columns: fields(pairs),
        partition_key: vec![pairs[0].0.to_string()],
        clustering_key: Vec::new(),
        options: Vec::new(),
    })
}

pub fn index(keyspace: &str, table: &str, name: &str, column: &str) -> Resource {
    Resource::Index(IndexSpec {
        keyspace: keyspace.into(),
        table: table.into(),
        name: name.into(),
        target: Some(IndexTarget::column(column)),
        class: None,
        options: IndexMap::new(),
    })
}

pub fn user(name: &str, password: &str) -> Resource {
    Resource::User(UserSpec {
        name: name.into(),
        password: Some(password.into()),
        superuser: false,
        login: true,
    })
}

pub fn grant_on_table(grantee: &str, privilege: Privilege, keyspace: &str, table: &str) -> Resource {
    Resource::Permission(PermissionSpec {
        grantee: grantee.into(),
        privilege,
        resource: GrantResource::Table {
            keyspace: keyspace.into(),
            table: table.into(),
        },
    })
}

/// Keyspace, type, table, index, user and a table grant, declared in
/// reverse dependency order.
pub fn full_schema() -> Vec<Descriptor> {
    vec![
        Descriptor::present(
            "alice_users",
            grant_on_table("alice", Privilege::Select, "ks1", "users"),
        ),
        Descriptor::present("alice", user("alice", "Passw0rd")),
        Descriptor::present("users_lname_idx", index("ks1", "users", "users_lname_idx", "lname")),
        Descriptor::present(
            "users",
            table(
                "ks1",
                "users",
                &[("id", "uuid"), ("lname", "text"), ("name", "frozen<fullname>")],
            ),
        ),
        Descriptor::present(
            "fullname",
            udt("ks1", "fullname", &[("fname", "text"), ("lname", "text")]),
        ),
        Descriptor::present("ks1", keyspace("ks1")),
    ]
}

/// Position of the first logged statement starting with `prefix`.
pub fn position(statements: &[String], prefix: &str) -> usize {
    statements
        .iter()
        .position(|s| s.starts_with(prefix))
        .unwrap_or_else(|| panic!("no statement starting with '{prefix}' in {statements:#?}"))
}

/// Position of the last logged statement starting with `prefix`.
pub fn last_position(statements: &[String], prefix: &str) -> usize {
    statements
        .iter()
        .rposition(|s| s.starts_with(prefix))
        .unwrap_or_else(|| panic!("no statement starting with '{prefix}' in {statements:#?}"))
}
