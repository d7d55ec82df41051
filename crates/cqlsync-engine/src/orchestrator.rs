//! Whole-run driver: validate, probe, then converge kind by kind in
//! dependency order.

use std::collections::BTreeSet;

use cqlsync_types::{DependencyGraph, DesiredState, Descriptor, Identity, Kind, validate_descriptors};
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::builder::{build_read, build_write};
use crate::command::Statement;
use crate::config::ConnectionConfig;
use crate::error::EngineError;
use crate::executor::{Action, apply};
use crate::probe::{Sleeper, probe};
use crate::runner::CommandRunner;

/// What to do after a descriptor fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first error and return it.
    #[default]
    FailFast,
    /// Keep converging kinds that do not depend on a failed kind.
    KeepGoing,
}

/// Terminal state of one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Skipped,
    Created,
    Dropped,
    Failed { error: String },
    /// Not attempted because a prerequisite kind had a failure.
    Blocked { prerequisite: Kind },
}

impl From<Action> for Outcome {
    fn from(action: Action) -> Self {
        match action {
            Action::Skipped => Outcome::Skipped,
            Action::Created => Outcome::Created,
            Action::Dropped => Outcome::Dropped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub kind: Kind,
    pub title: String,
    pub identity: Identity,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.entries
            .iter()
            .all(|e| !matches!(e.outcome, Outcome::Failed { .. } | Outcome::Blocked { .. }))
    }

    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }

    pub fn changed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Created | Outcome::Dropped))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Failed { .. }))
    }
}

/// Rendered statements for one descriptor, without touching the store.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub kind: Kind,
    pub title: String,
    pub identity: Identity,
    pub state: DesiredState,
    pub read: Statement,
    pub write: Statement,
}

pub struct Orchestrator<'a, R: ?Sized, S: ?Sized> {
    config: &'a ConnectionConfig,
    runner: &'a R,
    sleeper: &'a S,
    graph: DependencyGraph,
    policy: FailurePolicy,
}

impl<'a, R, S> Orchestrator<'a, R, S>
where
    R: CommandRunner + ?Sized,
    S: Sleeper + ?Sized,
{
    pub fn new(config: &'a ConnectionConfig, runner: &'a R, sleeper: &'a S) -> Self {
        Self {
            config,
            runner,
            sleeper,
            graph: DependencyGraph::standard(),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_graph(mut self, graph: DependencyGraph) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate and render every descriptor in application order.
    pub fn plan(&self, descriptors: &[Descriptor]) -> Result<Vec<PlannedStep>, EngineError> {
        validate_descriptors(descriptors)?;
        Ok(group_by_kind(&self.graph, descriptors)
            .into_iter()
            .flat_map(|(_, group)| group)
            .map(|d| PlannedStep {
                kind: d.kind(),
                title: d.title.clone(),
                identity: d.identity(),
                state: d.state,
                read: build_read(d),
                write: build_write(d),
            })
            .collect())
    }

    /// Converge all descriptors.
    ///
    /// Configuration errors and an unreachable store abort before any write.
    /// Under [`FailurePolicy::FailFast`] the first descriptor error is
    /// returned; under [`FailurePolicy::KeepGoing`] failures are recorded in
    /// the report and dependent kinds are marked blocked.
    pub fn run(&self, descriptors: &[Descriptor]) -> Result<RunReport, EngineError> {
        validate_descriptors(descriptors)?;
        probe(self.config, self.runner, self.sleeper)?;

        let mut report = RunReport::default();
        let mut failed_kinds = BTreeSet::new();
        for (kind, group) in group_by_kind(&self.graph, descriptors) {
            let _span = info_span!("kind", %kind).entered();
            let blocked_by = failed_kinds
                .iter()
                .copied()
                .find(|failed| self.graph.depends_on(kind, *failed));
            for descriptor in group {
                let outcome = match blocked_by {
                    Some(prerequisite) => {
                        warn!(identity = %descriptor.identity(), %prerequisite, "blocked");
                        Outcome::Blocked { prerequisite }
                    }
                    None => match apply(descriptor, self.config, self.runner) {
                        Ok(action) => action.into(),
                        Err(err) if self.policy == FailurePolicy::KeepGoing => {
                            warn!(error = %err, "descriptor failed; continuing");
                            failed_kinds.insert(kind);
                            Outcome::Failed {
                                error: err.to_string(),
                            }
                        }
                        Err(err) => return Err(err),
                    },
                };
                report.entries.push(ReportEntry {
                    kind,
                    title: descriptor.title.clone(),
                    identity: descriptor.identity(),
                    outcome,
                });
            }
        }
        info!(
            total = report.entries.len(),
            changed = report.changed(),
            "run finished"
        );
        Ok(report)
    }
}

/// Descriptors bucketed by kind, buckets in graph order, declaration order
/// kept within a bucket. Kinds without descriptors are omitted.
pub fn group_by_kind<'d>(
    graph: &DependencyGraph,
    descriptors: &'d [Descriptor],
) -> Vec<(Kind, Vec<&'d Descriptor>)> {
    graph
        .order()
        .iter()
        .map(|kind| {
            let group = descriptors
                .iter()
                .filter(|d| d.kind() == *kind)
                .collect::<Vec<_>>();
            (*kind, group)
        })
        .filter(|(_, group)| !group.is_empty())
        .collect()
}
