//! Converges a Cassandra cluster's schema and access-control objects to a
//! declared state by driving the `cqlsh` client.
//!
//! Each descriptor is read first and written only when the observed
//! existence differs from the desired one, so repeated runs against a
//! converged cluster issue reads only.

pub mod builder;
mod command;
mod config;
mod error;
mod executor;
pub mod manifest;
mod orchestrator;
mod probe;
mod reader;
mod runner;
pub mod testing;

pub use command::{CqlCommand, Statement};
pub use config::{
    Auth, ConnectionConfig, DEFAULT_COMMAND, DEFAULT_CONNECTION_TRIES,
    DEFAULT_CONNECTION_TRY_SLEEP, DEFAULT_HOST, DEFAULT_PORT, RetryPolicy,
};
pub use error::EngineError;
pub use executor::{Action, apply};
pub use manifest::{AuthSettings, ConnectionSettings, Manifest};
pub use orchestrator::{
    FailurePolicy, Orchestrator, Outcome, PlannedStep, ReportEntry, RunReport, group_by_kind,
};
pub use probe::{Sleeper, ThreadSleeper, probe};
pub use reader::exists;
pub use runner::{CommandOutput, CommandRunner, ExitSummary, ProcessRunner};
