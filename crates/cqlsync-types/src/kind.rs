use serde::{Deserialize, Serialize};

/// Category of schema object.
///
/// The declaration order doubles as the tie-break used when the dependency
/// graph has several ready kinds, so it must stay a valid topological order
/// of [`crate::KIND_EDGES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Keyspace,
    Type,
    Table,
    Index,
    User,
    Permission,
}

impl Kind {
    pub const ALL: [Kind; 6] = [
        Kind::Keyspace,
        Kind::Type,
        Kind::Table,
        Kind::Index,
        Kind::User,
        Kind::Permission,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Keyspace => "keyspace",
            Kind::Type => "type",
            Kind::Table => "table",
            Kind::Index => "index",
            Kind::User => "user",
            Kind::Permission => "permission",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
