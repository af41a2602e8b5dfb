//! End-to-end scenario runs over the scripted gateway: report outcomes,
//! error classification, and gateway call ordering.

mod common;

use std::time::Duration;

use apep::{
    Error, IsolationLevel, Outcome, Probe, Scenario, ScenarioRunner, Step, TxnActor, Verdict,
    scenarios,
};
use common::{MockGateway, SessionScript};

fn runner(scripts: Vec<SessionScript>) -> ScenarioRunner<MockGateway> {
    ScenarioRunner::new(MockGateway::new(scripts), Duration::from_secs(5))
}

/// Session order for a two-actor scenario with probes: fixture, first actor,
/// second actor, probes.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dirty_read_observed_over_scripted_gateway() {
    let runner = runner(vec![
        SessionScript::new(),                // fixture
        SessionScript::new().affected(1),    // trx1: insert
        SessionScript::new().scalar(1),      // trx2: count sees the dirty row
        SessionScript::new().scalar(0),      // probe: rows after rollback
    ]);

    let report = runner.run(scenarios::dirty_read()).await.unwrap();

    assert_eq!(report.outcome, Outcome::Observed);
    assert!(report.observed());
    assert_eq!(report.evidence_value("observed_count"), Some("1"));
    assert_eq!(report.evidence_value("rows_after_rollback"), Some("0"));
    assert_eq!(
        report.isolation,
        vec![
            ("trx1".to_string(), IsolationLevel::ReadCommitted),
            ("trx2".to_string(), IsolationLevel::ReadUncommitted),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dirty_read_absent_when_the_reader_sees_nothing() {
    let runner = runner(vec![
        SessionScript::new(),
        SessionScript::new().affected(1),
        SessionScript::new().scalar(0),
        SessionScript::new().scalar(0),
    ]);

    let report = runner
        .run(scenarios::dirty_read_at(IsolationLevel::ReadCommitted))
        .await
        .unwrap();

    assert_eq!(report.outcome, Outcome::Absent);
    assert!(!report.observed());
    assert_eq!(report.evidence_value("observed_count"), Some("0"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lost_update_observed_over_scripted_gateway() {
    let runner = runner(vec![
        SessionScript::new(),
        SessionScript::new().scalar(100_000).affected(1), // trx1: read, late write
        SessionScript::new().scalar(100_000).affected(1), // trx2: read, early write
        SessionScript::new().scalar(40_000),              // probe: final amount
    ]);

    let report = runner.run(scenarios::lost_update()).await.unwrap();

    assert_eq!(report.outcome, Outcome::Observed);
    assert_eq!(report.evidence_value("final_amount"), Some("40000"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn aborted_actor_makes_the_run_inconclusive() {
    // trx1's insert fails, so it forfeits the barriers trx2 is waiting on.
    let runner = runner(vec![
        SessionScript::new(),
        SessionScript::new().fail("deadlock detected"),
        SessionScript::new(),
    ]);

    let report = runner.run(scenarios::dirty_read()).await.unwrap();

    assert_eq!(report.outcome, Outcome::Inconclusive);
    assert!(!report.observed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fixture_failure_is_infrastructure() {
    let runner = runner(vec![
        SessionScript::new().batch_error("relation \"logs\" does not exist"),
    ]);

    let err = runner.run(scenarios::dirty_read()).await.unwrap_err();
    assert!(matches!(err, Error::Fixture(_)));
    assert!(err.is_infrastructure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connect_failure_is_infrastructure() {
    let gateway = MockGateway::with_connects(vec![Err("connection refused".to_string())]);
    let runner = ScenarioRunner::new(gateway, Duration::from_secs(5));

    let err = runner.run(scenarios::dirty_read()).await.unwrap_err();
    assert!(matches!(err, Error::Connect(_)));
    assert!(err.is_infrastructure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn begin_failure_aborts_the_run() {
    let runner = runner(vec![
        SessionScript::new(),
        SessionScript::new().begin_error("too many clients already"),
        SessionScript::new(),
    ]);

    let err = runner.run(scenarios::dirty_read()).await.unwrap_err();
    assert!(matches!(err, Error::Begin { .. }));
    assert!(err.is_infrastructure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn too_many_actors_for_the_pool_is_infrastructure() {
    let gateway = MockGateway::new(vec![]).with_capacity(1);
    let runner = ScenarioRunner::new(gateway, Duration::from_secs(5));

    let err = runner.run(scenarios::dirty_read()).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionLimit { needed: 2, max: 1 }));
    assert!(err.is_infrastructure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn post_terminal_step_fails_the_run() {
    let scenario = Scenario {
        name: "step_after_commit",
        summary: "a step sequence that keeps going after commit",
        fixture: "TRUNCATE TABLE logs;",
        actors: vec![TxnActor::new(
            "trx1",
            IsolationLevel::ReadCommitted,
            vec![
                Step::Commit,
                Step::query("SELECT count(*) FROM logs", vec![]),
            ],
        )],
        probes: vec![],
        predicate: Box::new(|_| Verdict::new(false)),
    };
    let runner = runner(vec![SessionScript::new(), SessionScript::new()]);

    let err = runner.run(scenario).await.unwrap_err();
    assert!(matches!(err, Error::ContractViolation { .. }));
    assert!(err.is_infrastructure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn probe_failure_is_infrastructure() {
    let scenario = Scenario {
        name: "probe_fails",
        summary: "final probe hits a missing table",
        fixture: "TRUNCATE TABLE logs;",
        actors: vec![TxnActor::new(
            "trx1",
            IsolationLevel::ReadCommitted,
            vec![Step::Commit],
        )],
        probes: vec![Probe::new("count", "SELECT count(*) FROM missing")],
        predicate: Box::new(|_| Verdict::new(false)),
    };
    let runner = runner(vec![
        SessionScript::new(),
        SessionScript::new(),
        SessionScript::new().fail("relation \"missing\" does not exist"),
    ]);

    let err = runner.run(scenario).await.unwrap_err();
    assert!(matches!(err, Error::Fixture(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fixture_is_applied_before_any_actor_begins() {
    let gateway = MockGateway::new(vec![
        SessionScript::new(),
        SessionScript::new().affected(1),
        SessionScript::new().scalar(1),
        SessionScript::new().scalar(0),
    ]);
    let runner = ScenarioRunner::new(gateway, Duration::from_secs(5));

    runner.run(scenarios::dirty_read()).await.unwrap();

    let journal = runner.gateway().journal();
    assert!(journal[0].starts_with("s1: batch TRUNCATE TABLE logs;"));
    // The writer's session begins only after the fixture block ran.
    assert!(journal.iter().position(|l| l.starts_with("s2: begin")).unwrap() > 0);

    // Within the reader's session: begin, count, commit, in order.
    let reader = runner.gateway().session_journal(3);
    assert_eq!(reader[0], "s3: begin read uncommitted");
    assert!(reader[1].starts_with("s3: query SELECT count(*)"));
    assert_eq!(reader[2], "s3: commit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_barrier_reference_is_rejected_before_launch() {
    let scenario = Scenario {
        name: "barrier_reuse",
        summary: "one actor arriving at the same barrier twice",
        fixture: "TRUNCATE TABLE logs;",
        actors: vec![TxnActor::new(
            "trx1",
            IsolationLevel::ReadCommitted,
            vec![
                Step::await_barrier("loop"),
                Step::await_barrier("loop"),
                Step::Commit,
            ],
        )],
        probes: vec![],
        predicate: Box::new(|_| Verdict::new(false)),
    };
    let runner = runner(vec![]);

    let err = runner.run(scenario).await.unwrap_err();
    assert!(matches!(err, Error::InvalidScenario { .. }));
}
