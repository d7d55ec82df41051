//! Typed model of the schema objects cqlsync reconciles: descriptors, CQL
//! quoting rules, validation and the kind-level dependency graph.

pub mod cql;
pub mod graph;
mod kind;
mod model;
pub mod validate;

pub use graph::{DependencyGraph, KIND_EDGES, ordered_kinds};
pub use kind::Kind;
pub use model::*;
pub use validate::{ConfigError, validate_descriptor, validate_descriptors};
