//! In-memory stand-ins for the client process and the retry clock.
//!
//! [`FakeCluster`] interprets the statements this crate renders (and only
//! those) against a small schema model, answering with cqlsh-shaped output.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cqlsync_types::{GrantResource, Privilege};

use crate::command::CqlCommand;
use crate::error::EngineError;
use crate::probe::Sleeper;
use crate::runner::{CommandOutput, CommandRunner};

/// Exit code cqlsh uses for a statement the server rejected.
const REJECTED: i32 = 2;
/// Exit code cqlsh uses when it cannot connect.
const UNREACHABLE: i32 = 1;

#[derive(Debug, Default)]
struct Schema {
    keyspaces: BTreeSet<String>,
    types: BTreeSet<(String, String)>,
    tables: BTreeSet<(String, String)>,
    /// (keyspace, index) -> table
    indexes: BTreeMap<(String, String), String>,
    roles: BTreeSet<String>,
    grants: BTreeSet<(String, GrantResource, Privilege)>,
}

#[derive(Debug, Default)]
struct State {
    schema: Schema,
    log: Vec<String>,
    unreachable_for: u32,
    always_unreachable: bool,
    failing: Vec<String>,
    stalling: Vec<String>,
}

/// A cluster that lives in memory and records every statement it receives.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse connections for the next `attempts` invocations.
    pub fn unreachable_for(self, attempts: u32) -> Self {
        self.lock().unreachable_for = attempts;
        self
    }

    /// Refuse every connection.
    pub fn unreachable(self) -> Self {
        self.lock().always_unreachable = true;
        self
    }

    /// Reject any statement whose text contains `fragment`.
    pub fn fail_statements_containing(self, fragment: impl Into<String>) -> Self {
        self.lock().failing.push(fragment.into());
        self
    }

    /// Answer any statement whose text contains `fragment` as if the client
    /// had been killed at its time limit. The statement is not applied.
    pub fn time_out_statements_containing(self, fragment: impl Into<String>) -> Self {
        self.lock().stalling.push(fragment.into());
        self
    }

    /// Apply a statement directly, without logging it. Used to seed state.
    pub fn execute(&self, statement: &str) -> Result<(), String> {
        let mut state = self.lock();
        let output = interpret(&mut state.schema, statement);
        if output.success() {
            Ok(())
        } else {
            Err(output.stderr)
        }
    }

    /// Every statement received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Received statements that change state.
    pub fn writes(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| !is_read(s))
            .collect()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    pub fn has_keyspace(&self, name: &str) -> bool {
        self.lock().schema.keyspaces.contains(name)
    }

    pub fn has_type(&self, keyspace: &str, name: &str) -> bool {
        self.lock()
            .schema
            .types
            .contains(&(keyspace.to_string(), name.to_string()))
    }

    pub fn has_table(&self, keyspace: &str, name: &str) -> bool {
        self.lock()
            .schema
            .tables
            .contains(&(keyspace.to_string(), name.to_string()))
    }

    pub fn has_index(&self, keyspace: &str, name: &str) -> bool {
        self.lock()
            .schema
            .indexes
            .contains_key(&(keyspace.to_string(), name.to_string()))
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.lock().schema.roles.contains(name)
    }

    pub fn has_grant(&self, role: &str, resource: &GrantResource, privilege: Privilege) -> bool {
        self.lock()
            .schema
            .grants
            .contains(&(role.to_string(), resource.clone(), privilege))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandRunner for FakeCluster {
    fn run(&self, command: &CqlCommand) -> Result<CommandOutput, EngineError> {
        let mut state = self.lock();
        let text = command.statement.text().to_string();
        if state.always_unreachable || state.unreachable_for > 0 {
            state.unreachable_for = state.unreachable_for.saturating_sub(1);
            return Ok(CommandOutput::exited(
                UNREACHABLE,
                "",
                "Connection error: ('Unable to connect to any servers')",
            ));
        }
        state.log.push(text.clone());
        if state.stalling.iter().any(|f| text.contains(f.as_str())) {
            return Ok(CommandOutput {
                timed_out: true,
                ..CommandOutput::default()
            });
        }
        if state.failing.iter().any(|f| text.contains(f.as_str())) {
            return Ok(CommandOutput::exited(
                REJECTED,
                "",
                format!("InvalidRequest: injected failure for: {text}"),
            ));
        }
        Ok(interpret(&mut state.schema, &text))
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

fn is_read(statement: &str) -> bool {
    let upper = statement.trim_start().to_ascii_uppercase();
    upper.starts_with("DESC ") || upper.starts_with("LIST ")
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput::exited(0, stdout, "")
}

fn rejected(message: impl Into<String>) -> CommandOutput {
    CommandOutput::exited(REJECTED, "", message)
}

/// Undo identifier quoting: `"My""Ks"` becomes `My"Ks`, plain names pass
/// through unchanged.
fn unquote(ident: &str) -> String {
    let ident = ident.trim();
    match ident
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        None => ident.to_string(),
    }
}

/// Split `ks.name` at the dot that sits outside double quotes.
fn split_qualified(name: &str) -> Option<(String, String)> {
    let mut in_quotes = false;
    for (i, c) in name.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => return Some((unquote(&name[..i]), unquote(&name[i + 1..]))),
            _ => {}
        }
    }
    None
}

/// Leading identifier of `rest` (quoted or not) and what follows it.
fn take_ident(rest: &str) -> (&str, &str) {
    let rest = rest.trim_start();
    let mut in_quotes = false;
    for (i, c) in rest.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if !in_quotes && (c.is_whitespace() || c == '(') => {
                return (&rest[..i], &rest[i..]);
            }
            _ => {}
        }
    }
    (rest, "")
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let text = text.trim_start();
    let head = text.get(..keyword.len())?;
    head.eq_ignore_ascii_case(keyword)
        .then(|| &text[keyword.len()..])
}

fn interpret(schema: &mut Schema, statement: &str) -> CommandOutput {
    let text = statement.trim();
    if text.eq_ignore_ascii_case("DESC KEYSPACES") {
        let names = schema
            .keyspaces
            .iter()
            .map(|k| cqlsync_types::cql::quote_ident(k))
            .collect::<Vec<_>>();
        return ok(format!("\n{}\n", names.join("  ")));
    }
    if text.eq_ignore_ascii_case("LIST ROLES") {
        let rows = schema
            .roles
            .iter()
            .map(|r| vec![r.clone(), "False".into(), "True".into(), "{}".into()])
            .collect::<Vec<_>>();
        return ok(render_table(&["role", "super", "login", "options"], &rows));
    }
    if let Some(rest) = strip_keyword(text, "DESC ") {
        return describe(schema, rest);
    }
    if let Some(rest) = strip_keyword(text, "LIST ") {
        return list_permissions(schema, rest);
    }
    if let Some(rest) = strip_keyword(text, "CREATE ") {
        return create(schema, rest);
    }
    if let Some(rest) = strip_keyword(text, "DROP ") {
        return drop_object(schema, rest);
    }
    if let Some(rest) = strip_keyword(text, "GRANT ") {
        return grant(schema, rest, true);
    }
    if let Some(rest) = strip_keyword(text, "REVOKE ") {
        return grant(schema, rest, false);
    }
    rejected(format!("SyntaxException: unsupported statement: {text}"))
}

fn describe(schema: &Schema, rest: &str) -> CommandOutput {
    let (kind, rest) = take_ident(rest);
    let (name, _) = take_ident(rest);
    let Some(key) = split_qualified(name) else {
        return rejected(format!("SyntaxException: expected ks.name, got '{name}'"));
    };
    let found = match kind.to_ascii_uppercase().as_str() {
        "TYPE" => schema.types.contains(&key),
        "TABLE" => schema.tables.contains(&key),
        "INDEX" => schema.indexes.contains_key(&key),
        _ => return rejected(format!("SyntaxException: cannot describe '{kind}'")),
    };
    if found {
        ok(format!("\nCREATE {kind} {}.{} ...;\n", key.0, key.1))
    } else {
        rejected(format!(
            "'{}' not found in keyspace '{}'",
            key.1, key.0
        ))
    }
}

/// `<privilege> ON <resource> <sep> <role>` with `sep` one of TO/FROM/OF.
fn parse_grant(rest: &str, sep: &str) -> Option<(Privilege, GrantResource, String)> {
    let upper = rest.to_ascii_uppercase();
    let on = upper.find(" ON ")?;
    let privilege = Privilege::parse(&rest[..on])?;
    let after_on = &rest[on + 4..];
    let sep_at = after_on.to_ascii_uppercase().rfind(&format!(" {sep} "))?;
    let resource_text = after_on[..sep_at].trim();
    let role = unquote(&after_on[sep_at + sep.len() + 2..]);
    let resource = if resource_text.eq_ignore_ascii_case("ALL KEYSPACES") {
        GrantResource::AllKeyspaces
    } else if let Some(ks) = strip_keyword(resource_text, "KEYSPACE ") {
        GrantResource::Keyspace {
            keyspace: unquote(ks),
        }
    } else {
        let (keyspace, table) = split_qualified(strip_keyword(resource_text, "TABLE ")?.trim())?;
        GrantResource::Table { keyspace, table }
    };
    Some((privilege, resource, role))
}

fn resource_exists(schema: &Schema, resource: &GrantResource) -> bool {
    match resource {
        GrantResource::AllKeyspaces => true,
        GrantResource::Keyspace { keyspace } => schema.keyspaces.contains(keyspace),
        GrantResource::Table { keyspace, table } => schema
            .tables
            .contains(&(keyspace.clone(), table.clone())),
    }
}

/// Whether a grant on `parent` applies to `resource`: the resource itself,
/// its keyspace, or all keyspaces.
fn covers(parent: &GrantResource, resource: &GrantResource) -> bool {
    match (parent, resource) {
        (GrantResource::AllKeyspaces, _) => true,
        (GrantResource::Keyspace { keyspace }, GrantResource::Table { keyspace: ks, .. }) => {
            keyspace == ks
        }
        _ => parent == resource,
    }
}

/// Like cqlsh, lists inherited grants unless the statement ends in
/// `NORECURSIVE`.
fn list_permissions(schema: &Schema, rest: &str) -> CommandOutput {
    let rest = rest.trim_end();
    let (rest, recursive) = match rest.len().checked_sub(" NORECURSIVE".len()) {
        Some(at)
            if rest.is_char_boundary(at)
                && rest[at..].eq_ignore_ascii_case(" NORECURSIVE") =>
        {
            (&rest[..at], false)
        }
        _ => (rest, true),
    };
    let Some((privilege, resource, role)) = parse_grant(rest, "OF") else {
        return rejected(format!("SyntaxException: cannot parse LIST {rest}"));
    };
    if !schema.roles.contains(&role) {
        return rejected(format!("InvalidRequest: {role} doesn't exist"));
    }
    let wanted = privilege.expand(&resource);
    let rows = schema
        .grants
        .iter()
        .filter(|(r, res, p)| {
            let applies = if recursive {
                covers(res, &resource)
            } else {
                *res == resource
            };
            *r == role && applies && wanted.contains(p)
        })
        .map(|(r, res, p)| {
            vec![
                r.clone(),
                r.clone(),
                res.listed_as(),
                p.as_str().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    ok(render_table(
        &["role", "username", "resource", "permission"],
        &rows,
    ))
}

fn grant(schema: &mut Schema, rest: &str, add: bool) -> CommandOutput {
    let sep = if add { "TO" } else { "FROM" };
    let Some((privilege, resource, role)) = parse_grant(rest, sep) else {
        return rejected(format!("SyntaxException: cannot parse grant '{rest}'"));
    };
    if !schema.roles.contains(&role) {
        return rejected(format!("InvalidRequest: {role} doesn't exist"));
    }
    if !resource_exists(schema, &resource) {
        return rejected(format!("InvalidRequest: {resource} doesn't exist"));
    }
    for p in privilege.expand(&resource) {
        let key = (role.clone(), resource.clone(), p);
        if add {
            schema.grants.insert(key);
        } else {
            schema.grants.remove(&key);
        }
    }
    ok("")
}

fn create(schema: &mut Schema, rest: &str) -> CommandOutput {
    let (mut kind, mut rest) = take_ident(rest);
    if kind.eq_ignore_ascii_case("CUSTOM") {
        (kind, rest) = take_ident(rest);
    }
    let rest = strip_keyword(rest, "IF NOT EXISTS").unwrap_or(rest);
    let (name, tail) = take_ident(rest);
    match kind.to_ascii_uppercase().as_str() {
        "KEYSPACE" => {
            schema.keyspaces.insert(unquote(name));
            ok("")
        }
        "ROLE" => {
            schema.roles.insert(unquote(name));
            ok("")
        }
        "TYPE" | "TABLE" => {
            let Some(key) = split_qualified(name) else {
                return rejected(format!("SyntaxException: expected ks.name, got '{name}'"));
            };
            if !schema.keyspaces.contains(&key.0) {
                return rejected(format!("InvalidRequest: Keyspace '{}' doesn't exist", key.0));
            }
            if kind.eq_ignore_ascii_case("TYPE") {
                schema.types.insert(key);
            } else {
                schema.tables.insert(key);
            }
            ok("")
        }
        "INDEX" => {
            let Some(on) = strip_keyword(tail, "ON ") else {
                return rejected("SyntaxException: expected ON");
            };
            let (table, _) = take_ident(on);
            let Some((keyspace, table)) = split_qualified(table) else {
                return rejected(format!("SyntaxException: expected ks.table, got '{table}'"));
            };
            if !schema.tables.contains(&(keyspace.clone(), table.clone())) {
                return rejected(format!(
                    "InvalidRequest: table {keyspace}.{table} doesn't exist"
                ));
            }
            schema.indexes.insert((keyspace, unquote(name)), table);
            ok("")
        }
        other => rejected(format!("SyntaxException: cannot create '{other}'")),
    }
}

fn drop_object(schema: &mut Schema, rest: &str) -> CommandOutput {
    let (kind, rest) = take_ident(rest);
    let (name, _) = take_ident(rest);
    let missing = || rejected(format!("InvalidRequest: {name} doesn't exist"));
    match kind.to_ascii_uppercase().as_str() {
        "KEYSPACE" => {
            let ks = unquote(name);
            if !schema.keyspaces.remove(&ks) {
                return missing();
            }
            schema.types.retain(|(k, _)| *k != ks);
            schema.tables.retain(|(k, _)| *k != ks);
            schema.indexes.retain(|(k, _), _| *k != ks);
            schema.grants.retain(|(_, res, _)| match res {
                GrantResource::AllKeyspaces => true,
                GrantResource::Keyspace { keyspace } | GrantResource::Table { keyspace, .. } => {
                    *keyspace != ks
                }
            });
            ok("")
        }
        "ROLE" => {
            let role = unquote(name);
            if !schema.roles.remove(&role) {
                return missing();
            }
            schema.grants.retain(|(r, _, _)| *r != role);
            ok("")
        }
        "TYPE" | "TABLE" | "INDEX" => {
            let Some(key) = split_qualified(name) else {
                return rejected(format!("SyntaxException: expected ks.name, got '{name}'"));
            };
            let removed = match kind.to_ascii_uppercase().as_str() {
                "TYPE" => schema.types.remove(&key),
                "INDEX" => schema.indexes.remove(&key).is_some(),
                _ => {
                    let removed = schema.tables.remove(&key);
                    schema
                        .indexes
                        .retain(|(k, _), table| !(*k == key.0 && *table == key.1));
                    schema.grants.retain(|(_, res, _)| {
                        *res != GrantResource::Table {
                            keyspace: key.0.clone(),
                            table: key.1.clone(),
                        }
                    });
                    removed
                }
            };
            if removed { ok("") } else { missing() }
        }
        other => rejected(format!("SyntaxException: cannot drop '{other}'")),
    }
}

/// cqlsh's tabular result layout.
fn render_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let widths = (0..header.len())
        .map(|i| {
            rows.iter()
                .map(|r| r[i].len())
                .chain(std::iter::once(header[i].len()))
                .max()
                .unwrap_or(0)
        })
        .collect::<Vec<_>>();
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!(" {c:>w$} "))
            .collect::<Vec<_>>()
            .join("|")
    };
    let mut out = String::from("\n");
    out.push_str(&line(header.to_vec()));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+"),
    );
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out.push_str(&format!("\n({} rows)\n", rows.len()));
    out
}
