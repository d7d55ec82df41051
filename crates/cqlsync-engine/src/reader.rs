//! Existence checks. Only existence is observed; attributes of an existing
//! object are never compared with the declared ones.

use cqlsync_types::cql::quote_ident;
use cqlsync_types::{Descriptor, PermissionSpec, Resource};
use tracing::debug;

use crate::builder::build_read;
use crate::config::ConnectionConfig;
use crate::error::EngineError;
use crate::runner::CommandRunner;

/// Run the descriptor's introspection statement and report whether the
/// object exists. A failing read means "not found"; only a client that cannot
/// be started is an error.
pub fn exists<R: CommandRunner + ?Sized>(
    descriptor: &Descriptor,
    config: &ConnectionConfig,
    runner: &R,
) -> Result<bool, EngineError> {
    let command = config.command(&build_read(descriptor));
    let output = runner.run(&command)?;
    if !output.success() {
        debug!(
            kind = %descriptor.kind(),
            identity = %descriptor.identity(),
            status = %output.status(),
            "read reported absence"
        );
        return Ok(false);
    }
    let found = match &descriptor.resource {
        Resource::Keyspace(ks) => keyspace_listed(&output.stdout, &ks.name),
        Resource::User(user) => role_listed(&output.stdout, &user.name),
        Resource::Permission(perm) => permission_listed(&output.stdout, perm),
        Resource::Type(_) | Resource::Table(_) | Resource::Index(_) => true,
    };
    Ok(found)
}

/// `DESC KEYSPACES` prints names separated by whitespace, quoting the ones
/// that need it.
fn keyspace_listed(stdout: &str, name: &str) -> bool {
    let quoted = quote_ident(name);
    stdout
        .split_whitespace()
        .any(|token| token == quoted || token == name)
}

fn role_listed(stdout: &str, name: &str) -> bool {
    table_rows(stdout)
        .iter()
        .any(|row| row.first().is_some_and(|role| role == name))
}

/// Rows end with `resource | permission`. A row for a parent resource is an
/// inherited grant and does not count.
fn permission_listed(stdout: &str, perm: &PermissionSpec) -> bool {
    let rows = table_rows(stdout);
    let resource = perm.resource.listed_as();
    perm.privilege.expand(&perm.resource).iter().all(|privilege| {
        rows.iter().any(|row| match row.as_slice() {
            [role, .., listed, permission] => {
                *role == perm.grantee
                    && *listed == resource
                    && permission.eq_ignore_ascii_case(privilege.as_str())
            }
            _ => false,
        })
    })
}

/// Data rows of a cqlsh result table: the `|`-separated lines after the
/// `----+----` rule, with cells trimmed.
fn table_rows(stdout: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut past_rule = false;
    for line in stdout.lines() {
        let trimmed = line.trim();
        if !past_rule {
            past_rule = !trimmed.is_empty()
                && trimmed.starts_with('-')
                && trimmed.chars().all(|c| c == '-' || c == '+');
            continue;
        }
        if trimmed.contains('|') {
            rows.push(trimmed.split('|').map(|cell| cell.trim().to_string()).collect());
        }
    }
    rows
}
