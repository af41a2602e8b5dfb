//! Transaction actor state machine and step executor behavior, driven
//! against the scripted gateway.

mod common;

use std::sync::Arc;
use std::time::Duration;

use apep::{
    ActorFate, BarrierSet, IsolationLevel, SqlGateway, Step, StepOutcome, SqlValue, TxnActor,
};
use common::{MockGateway, SessionScript};

fn no_barriers() -> Arc<BarrierSet> {
    Arc::new(BarrierSet::new(vec![], Duration::from_secs(5)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn query_then_commit_reaches_committed() {
    let gateway = MockGateway::new(vec![SessionScript::new().scalar(100_000)]);
    let session = gateway.session().await.unwrap();

    let actor = TxnActor::new(
        "trx1",
        IsolationLevel::ReadCommitted,
        vec![
            Step::query(
                "SELECT amount FROM wallets WHERE id = $1",
                vec![SqlValue::Int(1)],
            ),
            Step::Commit,
        ],
    );
    let record = actor.run(session, no_barriers()).await;

    assert_eq!(record.fate, ActorFate::Committed);
    assert_eq!(record.scalar(0), Some(100_000));
    assert_eq!(record.step(1).unwrap().outcome, StepOutcome::Committed);

    let journal = gateway.session_journal(1);
    assert_eq!(journal[0], "s1: begin read committed");
    assert!(journal[1].starts_with("s1: query SELECT amount"));
    assert_eq!(journal[2], "s1: commit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_step_rolls_back_and_skips_the_rest() {
    let gateway = MockGateway::new(vec![
        SessionScript::new().fail("duplicate key value violates unique constraint"),
    ]);
    let session = gateway.session().await.unwrap();

    let actor = TxnActor::new(
        "trx1",
        IsolationLevel::ReadCommitted,
        vec![
            Step::exec(
                "INSERT INTO wallets (id, user_id, amount) VALUES ($1, $2, $3)",
                vec![SqlValue::Int(1), SqlValue::Int(1), SqlValue::Int(0)],
            ),
            Step::query("SELECT count(*) FROM wallets", vec![]),
            Step::Commit,
        ],
    );
    let record = actor.run(session, no_barriers()).await;

    assert!(matches!(record.fate, ActorFate::Aborted(_)));
    assert_eq!(record.log.len(), 1, "remaining steps must be skipped");
    assert!(record.log[0].failed());

    let journal = gateway.session_journal(1);
    assert_eq!(journal.last().unwrap(), "s1: rollback");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_terminal_step_rolls_back() {
    let gateway = MockGateway::new(vec![SessionScript::new().scalar(1)]);
    let session = gateway.session().await.unwrap();

    let actor = TxnActor::new(
        "trx1",
        IsolationLevel::ReadCommitted,
        vec![Step::query("SELECT count(*) FROM logs", vec![])],
    );
    let record = actor.run(session, no_barriers()).await;

    assert_eq!(record.fate, ActorFate::RolledBack);
    assert_eq!(gateway.session_journal(1).last().unwrap(), "s1: rollback");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn step_after_commit_is_a_contract_violation() {
    let gateway = MockGateway::new(vec![SessionScript::new().scalar(1)]);
    let session = gateway.session().await.unwrap();

    let actor = TxnActor::new(
        "trx1",
        IsolationLevel::ReadCommitted,
        vec![
            Step::Commit,
            Step::query("SELECT count(*) FROM logs", vec![]),
        ],
    );
    let record = actor.run(session, no_barriers()).await;

    assert!(matches!(record.fate, ActorFate::ContractViolation(_)));
    // The offending step never ran.
    assert_eq!(record.log.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_commit_aborts_the_actor() {
    let gateway = MockGateway::new(vec![
        SessionScript::new()
            .scalar(1)
            .commit_error("could not serialize access due to read/write dependencies"),
    ]);
    let session = gateway.session().await.unwrap();

    let actor = TxnActor::new(
        "trx1",
        IsolationLevel::Serializable,
        vec![
            Step::query("SELECT count(*) FROM wallets", vec![]),
            Step::Commit,
        ],
    );
    let record = actor.run(session, no_barriers()).await;

    assert!(matches!(record.fate, ActorFate::Aborted(_)));
    assert!(!record.committed());
    // The failed commit left the transaction open; unwinding rolls it back.
    assert_eq!(gateway.session_journal(1).last().unwrap(), "s1: rollback");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn begin_failure_is_infrastructure() {
    let gateway = MockGateway::new(vec![
        SessionScript::new().begin_error("the database system is starting up"),
    ]);
    let session = gateway.session().await.unwrap();

    let actor = TxnActor::new("trx1", IsolationLevel::ReadCommitted, vec![Step::Commit]);
    let record = actor.run(session, no_barriers()).await;

    assert!(matches!(record.fate, ActorFate::Infrastructure(_)));
    assert!(record.log.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn barrier_timeout_deserts_the_actor() {
    let gateway = MockGateway::new(vec![SessionScript::new()]);
    let session = gateway.session().await.unwrap();

    // Two parties expected, only this actor ever arrives.
    let barriers = Arc::new(BarrierSet::new(
        vec![("never-completes".to_string(), 2)],
        Duration::from_millis(100),
    ));
    let actor = TxnActor::new(
        "trx1",
        IsolationLevel::ReadCommitted,
        vec![Step::await_barrier("never-completes"), Step::Commit],
    );
    let record = actor.run(session, barriers).await;

    assert!(matches!(record.fate, ActorFate::Deserted(_)));
    assert!(record.log[0].failed());
    assert_eq!(gateway.session_journal(1).last().unwrap(), "s1: rollback");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn aborting_actor_forfeits_its_unreached_barriers() {
    let gateway = MockGateway::new(vec![SessionScript::new().fail("deadlock detected")]);
    let session = gateway.session().await.unwrap();

    let barriers = Arc::new(BarrierSet::new(
        vec![("after-update".to_string(), 2)],
        Duration::from_secs(30),
    ));

    // A sibling already waiting on the barrier this actor will never reach.
    let sibling = {
        let barriers = Arc::clone(&barriers);
        tokio::spawn(async move { barriers.wait("after-update").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let actor = TxnActor::new(
        "trx1",
        IsolationLevel::ReadCommitted,
        vec![
            Step::exec(
                "UPDATE wallets SET amount = 0 WHERE id = $1",
                vec![SqlValue::Int(1)],
            ),
            Step::await_barrier("after-update"),
            Step::Commit,
        ],
    );
    let record = actor.run(session, barriers).await;

    assert!(matches!(record.fate, ActorFate::Aborted(_)));
    // The sibling is released promptly with a cancellation error instead of
    // waiting out its full timeout.
    let sibling_result = sibling.await.unwrap();
    assert!(matches!(sibling_result, Err(apep::Error::BarrierBroken(_))));
}
