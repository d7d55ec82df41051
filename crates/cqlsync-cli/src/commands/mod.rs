//! CLI command handlers.

pub mod apply;
pub mod plan;
pub mod probe;
