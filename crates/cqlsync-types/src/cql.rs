//! CQL quoting and escaping rules.
//!
//! All identifiers and string literals that reach a rendered statement pass
//! through this module. Type expressions and raw option fragments cannot be
//! quoted, so they are checked instead and rejected at validation time.

/// Reserved CQL keywords that must be double-quoted when used as names.
const RESERVED: &[&str] = &[
    "add", "allow", "alter", "and", "apply", "asc", "authorize", "batch", "begin", "by",
    "columnfamily", "create", "delete", "desc", "describe", "drop", "entries", "execute", "from",
    "full", "grant", "if", "in", "index", "infinity", "insert", "into", "keyspace", "limit",
    "modify", "nan", "norecursive", "not", "null", "of", "on", "or", "order", "primary", "rename",
    "replace", "revoke", "schema", "select", "set", "table", "to", "token", "truncate", "unlogged",
    "update", "use", "using", "where", "with",
];

/// True when `name` can appear unquoted and still keep its exact spelling.
///
/// Unquoted CQL identifiers are folded to lower case, so anything with an
/// upper-case letter has to be quoted to survive the round trip.
pub fn is_plain_ident(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !RESERVED.contains(&name)
}

/// Render an identifier, double-quoting it when required.
pub fn quote_ident(name: &str) -> String {
    if is_plain_ident(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Render `keyspace.name` with both parts quoted as needed.
pub fn qualified(keyspace: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(keyspace), quote_ident(name))
}

/// Render a single-quoted string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Check a column/field type expression such as `text` or
/// `map<text, frozen<address>>`.
///
/// The expression must be exactly one type: a name, optionally followed by
/// comma-separated type arguments in `<...>`. A comma or a second word outside
/// the brackets would add to the surrounding definition, so both are rejected.
pub fn check_type_expr(expr: &str) -> Result<(), String> {
    let mut chars = expr.chars().peekable();
    type_term(&mut chars).map_err(|msg| format!("type expression '{expr}' {msg}"))?;
    skip_spaces(&mut chars);
    match chars.next() {
        None => Ok(()),
        Some(',') => Err(format!("type expression '{expr}' has ',' outside '<...>'")),
        Some(c) => Err(format!(
            "type expression '{expr}' has unexpected '{c}' after the type"
        )),
    }
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn skip_spaces(chars: &mut Chars<'_>) {
    while chars.next_if_eq(&' ').is_some() {}
}

fn type_term(chars: &mut Chars<'_>) -> Result<(), String> {
    skip_spaces(chars);
    match chars.peek() {
        Some(c) if c.is_ascii_alphabetic() => {}
        Some(c) => return Err(format!("has '{c}' where a type name should start")),
        None => return Err("is missing a type name".into()),
    }
    while chars
        .next_if(|&c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'))
        .is_some()
    {}
    skip_spaces(chars);
    if chars.next_if_eq(&'<').is_none() {
        return Ok(());
    }
    loop {
        type_term(chars)?;
        skip_spaces(chars);
        match chars.next() {
            Some(',') => {}
            Some('>') => return Ok(()),
            Some(c) => return Err(format!("has unexpected '{c}' inside '<...>'")),
            None => return Err("has unbalanced '<'".into()),
        }
    }
}

/// Check a raw option fragment such as `compaction = { 'class' : 'LeveledCompactionStrategy' }`.
///
/// Fragments are inserted verbatim, so they may not terminate the statement
/// or leave a string literal open.
pub fn check_fragment(fragment: &str) -> Result<(), String> {
    if fragment.trim().is_empty() {
        return Err("option fragment is empty".into());
    }
    let mut in_literal = false;
    for c in fragment.chars() {
        match c {
            '\'' => in_literal = !in_literal,
            ';' if !in_literal => {
                return Err(format!("option fragment '{fragment}' contains ';'"));
            }
            c if c.is_control() => {
                return Err(format!(
                    "option fragment '{fragment}' contains a control character"
                ));
            }
            _ => {}
        }
    }
    if in_literal {
        return Err(format!(
            "option fragment '{fragment}' has an unterminated string literal"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_stay_unquoted() {
        assert_eq!(quote_ident("ks1"), "ks1");
        assert_eq!(quote_ident("full_name_2"), "full_name_2");
    }

    #[test]
    fn mixed_case_reserved_and_odd_names_are_quoted() {
        assert_eq!(quote_ident("MyTable"), "\"MyTable\"");
        assert_eq!(quote_ident("table"), "\"table\"");
        assert_eq!(quote_ident("1st"), "\"1st\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn literals_double_single_quotes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's'; DROP"), "'it''s''; DROP'");
    }

    #[test]
    fn qualified_names_quote_each_part() {
        assert_eq!(qualified("ks1", "fullname"), "ks1.fullname");
        assert_eq!(qualified("Ks", "t"), "\"Ks\".t");
    }

    #[test]
    fn type_expressions() {
        assert!(check_type_expr("text").is_ok());
        assert!(check_type_expr("map<text, frozen<address>>").is_ok());
        assert!(check_type_expr("").is_err());
        assert!(check_type_expr("list<text").is_err());
        assert!(check_type_expr("text) ; DROP KEYSPACE x").is_err());
    }

    #[test]
    fn type_expression_is_a_single_type() {
        assert!(check_type_expr(" tuple<int, text, ks1.fullname> ").is_ok());
        assert!(check_type_expr("frozen < list < text > >").is_ok());
        let err = check_type_expr("text, ssn text").unwrap_err();
        assert!(err.contains("','"), "{err}");
        assert!(check_type_expr("int static").is_err());
        assert!(check_type_expr("text PRIMARY KEY").is_err());
        assert!(check_type_expr("map<text int>").is_err());
        assert!(check_type_expr("list<>").is_err());
        assert!(check_type_expr("int>").is_err());
    }

    #[test]
    fn fragments_cannot_escape_the_statement() {
        assert!(check_fragment("compaction = { 'class' : 'LeveledCompactionStrategy' }").is_ok());
        assert!(check_fragment("comment = 'a; b'").is_ok());
        assert!(check_fragment("gc_grace_seconds = 0; DROP KEYSPACE ks").is_err());
        assert!(check_fragment("comment = 'open").is_err());
        assert!(check_fragment("  ").is_err());
    }
}
