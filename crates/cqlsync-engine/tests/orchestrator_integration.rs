//! Whole-run behavior: kind ordering, probing, failure policies and
//! validation before any command.

#[path = "helpers.rs"]
mod helpers;

use std::time::Duration;

use cqlsync_engine::testing::{FakeCluster, RecordingSleeper};
use cqlsync_engine::{EngineError, FailurePolicy, Orchestrator, Outcome, RetryPolicy};
use cqlsync_types::{ConfigError, DependencyGraph, Descriptor, KIND_EDGES, Kind, Privilege};
use helpers::*;

#[test]
fn keyspace_then_type_in_one_run() {
    let cluster = FakeCluster::new();
    let sleeper = RecordingSleeper::new();
    let cfg = config();
    let descriptors = vec![
        Descriptor::present(
            "fullname",
            udt("ks1", "fullname", &[("fname", "text"), ("lname", "text")]),
        ),
        Descriptor::present("ks1", keyspace("ks1")),
    ];

    let report = Orchestrator::new(&cfg, &cluster, &sleeper)
        .run(&descriptors)
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.changed(), 2);
    assert_eq!(report.entries[0].kind, Kind::Keyspace);
    assert_eq!(report.entries[1].kind, Kind::Type);

    let writes = cluster.writes();
    assert_eq!(
        writes,
        vec![
            "CREATE KEYSPACE IF NOT EXISTS ks1 WITH REPLICATION = \
             { 'class' : 'SimpleStrategy', 'replication_factor' : 1 } AND DURABLE_WRITES = true"
                .to_string(),
            "CREATE TYPE IF NOT EXISTS ks1.fullname (fname text, lname text)".to_string(),
        ]
    );
    assert!(sleeper.sleeps().is_empty());
}

#[test]
fn second_run_skips_everything() {
    let cluster = FakeCluster::new();
    let sleeper = RecordingSleeper::new();
    let cfg = config();
    let descriptors = full_schema();
    let orchestrator = Orchestrator::new(&cfg, &cluster, &sleeper);

    let first = orchestrator.run(&descriptors).unwrap();
    assert_eq!(first.count(|o| *o == Outcome::Created), descriptors.len());

    cluster.clear_log();
    let second = orchestrator.run(&descriptors).unwrap();
    assert_eq!(second.count(|o| *o == Outcome::Skipped), descriptors.len());
    assert!(cluster.writes().is_empty(), "{:?}", cluster.writes());
}

#[test]
fn every_kind_finishes_before_its_dependents_start() {
    let cluster = FakeCluster::new();
    let sleeper = RecordingSleeper::new();
    let cfg = config();
    Orchestrator::new(&cfg, &cluster, &sleeper)
        .run(&full_schema())
        .unwrap();

    let log = cluster.statements();
    let keyspace_done = last_position(&log, "CREATE KEYSPACE");
    let type_done = last_position(&log, "CREATE TYPE");
    let table_done = last_position(&log, "CREATE TABLE");
    let index_done = last_position(&log, "CREATE INDEX");
    let user_done = last_position(&log, "CREATE ROLE");

    assert!(keyspace_done < position(&log, "DESC TYPE"));
    assert!(type_done < position(&log, "DESC TABLE"));
    assert!(table_done < position(&log, "DESC INDEX"));
    // The permission's read happens after both index and user converged.
    let permission_read = position(&log, "LIST SELECT");
    assert!(index_done < permission_read);
    assert!(user_done < permission_read);
    assert!(index_done < position(&log, "LIST ROLES"));
}

#[test]
fn unreachable_store_exhausts_retries_without_schema_commands() {
    let cluster = FakeCluster::new().unreachable();
    let sleeper = RecordingSleeper::new();
    let cfg = config();

    let err = Orchestrator::new(&cfg, &cluster, &sleeper)
        .run(&full_schema())
        .unwrap_err();
    match &err {
        EngineError::Connectivity {
            attempts, status, ..
        } => {
            assert_eq!(*attempts, 6);
            assert_eq!(status, "exited with status 1");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.stage(), "connectivity probe");
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(30); 5]);
    assert!(cluster.statements().is_empty());
}

#[test]
fn probe_recovers_when_store_comes_up() {
    let cluster = FakeCluster::new().unreachable_for(2);
    let sleeper = RecordingSleeper::new();
    let cfg = config();

    let report = Orchestrator::new(&cfg, &cluster, &sleeper)
        .run(&[Descriptor::present("ks1", keyspace("ks1"))])
        .unwrap();
    assert_eq!(report.changed(), 1);
    assert_eq!(sleeper.sleeps().len(), 2);
}

#[test]
fn single_try_never_sleeps() {
    let cluster = FakeCluster::new().unreachable();
    let sleeper = RecordingSleeper::new();
    let cfg = cqlsync_engine::ConnectionConfig {
        retry: RetryPolicy::new(1, Duration::from_secs(30)).unwrap(),
        ..config()
    };
    let err = Orchestrator::new(&cfg, &cluster, &sleeper)
        .run(&[])
        .unwrap_err();
    assert!(matches!(err, EngineError::Connectivity { attempts: 1, .. }));
    assert!(sleeper.sleeps().is_empty());
}

#[test]
fn duplicate_identity_fails_before_any_command() {
    let cluster = FakeCluster::new();
    let sleeper = RecordingSleeper::new();
    let cfg = config();
    let descriptors = vec![
        Descriptor::present("first", keyspace("ks1")),
        Descriptor::present("second", keyspace("ks1")),
    ];

    let err = Orchestrator::new(&cfg, &cluster, &sleeper)
        .run(&descriptors)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::DuplicateIdentity {
            kind: Kind::Keyspace,
            ..
        })
    ));
    assert_eq!(err.stage(), "configuration");
    assert!(cluster.statements().is_empty());
}

#[test]
fn fail_fast_stops_at_first_failed_write() {
    let cluster = FakeCluster::new().fail_statements_containing("CREATE TABLE");
    let sleeper = RecordingSleeper::new();
    let cfg = config();

    let err = Orchestrator::new(&cfg, &cluster, &sleeper)
        .run(&full_schema())
        .unwrap_err();
    assert!(matches!(err, EngineError::Command { kind: Kind::Table, .. }));
    assert!(!cluster.statements().iter().any(|s| s.starts_with("DESC INDEX")));
    assert!(!cluster.has_role("alice"));
}

#[test]
fn keep_going_finishes_the_failed_kind_and_blocks_dependents() {
    let cluster = FakeCluster::new().fail_statements_containing("KEYSPACE IF NOT EXISTS bad");
    let sleeper = RecordingSleeper::new();
    let cfg = config();
    let mut descriptors = vec![Descriptor::present("bad", keyspace("bad"))];
    descriptors.extend(full_schema());

    let report = Orchestrator::new(&cfg, &cluster, &sleeper)
        .with_policy(FailurePolicy::KeepGoing)
        .run(&descriptors)
        .unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failures().count(), 1);
    assert!(cluster.has_keyspace("ks1"));
    for entry in report.entries.iter().filter(|e| e.kind != Kind::Keyspace) {
        assert_eq!(
            entry.outcome,
            Outcome::Blocked {
                prerequisite: Kind::Keyspace
            },
            "{}",
            entry.title
        );
    }
    assert!(!cluster.statements().iter().any(|s| s.starts_with("DESC TYPE")));
}

#[test]
fn keep_going_runs_independent_kinds() {
    let cluster = FakeCluster::new().fail_statements_containing("CREATE TABLE");
    let sleeper = RecordingSleeper::new();
    let cfg = config();
    // Users without the index prerequisite.
    let graph = DependencyGraph::with_edges(
        KIND_EDGES
            .into_iter()
            .filter(|edge| *edge != (Kind::Index, Kind::User)),
    )
    .unwrap();

    let report = Orchestrator::new(&cfg, &cluster, &sleeper)
        .with_graph(graph)
        .with_policy(FailurePolicy::KeepGoing)
        .run(&full_schema())
        .unwrap();

    let outcome = |kind: Kind| {
        report
            .entries
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.outcome.clone())
            .unwrap()
    };
    assert_eq!(outcome(Kind::Keyspace), Outcome::Created);
    assert_eq!(outcome(Kind::Type), Outcome::Created);
    assert!(matches!(outcome(Kind::Table), Outcome::Failed { .. }));
    assert_eq!(
        outcome(Kind::Index),
        Outcome::Blocked {
            prerequisite: Kind::Table
        }
    );
    assert_eq!(outcome(Kind::User), Outcome::Created);
    assert_eq!(
        outcome(Kind::Permission),
        Outcome::Blocked {
            prerequisite: Kind::Table
        }
    );
    assert!(cluster.has_role("alice"));
}

#[test]
fn plan_renders_in_dependency_order_without_running() {
    let cluster = FakeCluster::new();
    let sleeper = RecordingSleeper::new();
    let cfg = config();

    let steps = Orchestrator::new(&cfg, &cluster, &sleeper)
        .plan(&full_schema())
        .unwrap();
    let kinds = steps.iter().map(|s| s.kind).collect::<Vec<_>>();
    assert_eq!(kinds, Kind::ALL.to_vec());
    assert_eq!(
        steps[5].write.text(),
        "GRANT SELECT ON TABLE ks1.users TO alice"
    );
    assert_eq!(steps[4].read.text(), "LIST ROLES");
    assert!(!steps[4].write.to_string().contains("Passw0rd"));
    assert!(cluster.statements().is_empty());
}

#[test]
fn revoking_a_grant_leaves_the_user() {
    let cluster = FakeCluster::new();
    let sleeper = RecordingSleeper::new();
    let cfg = config();
    let orchestrator = Orchestrator::new(&cfg, &cluster, &sleeper);
    orchestrator.run(&full_schema()).unwrap();

    let mut descriptors = full_schema();
    descriptors[0] = Descriptor::absent(
        "alice_users",
        grant_on_table("alice", Privilege::Select, "ks1", "users"),
    );
    cluster.clear_log();
    let report = orchestrator.run(&descriptors).unwrap();
    assert_eq!(report.count(|o| *o == Outcome::Dropped), 1);
    assert_eq!(
        cluster.writes(),
        vec!["REVOKE SELECT ON TABLE ks1.users FROM alice".to_string()]
    );
    assert!(cluster.has_role("alice"));
}
