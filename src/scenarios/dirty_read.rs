use crate::IsolationLevel;
use crate::actor::TxnActor;
use crate::gateway::SqlValue;
use crate::scenario::{Probe, Scenario, Verdict};
use crate::scenarios::fmt_opt;
use crate::step::Step;

const INSERTED: &str = "uncommitted-insert";
const COUNTED: &str = "count-taken";

/// The reader's counting query is its second step (after the first barrier).
const READER_COUNT_STEP: usize = 1;

/// Dirty read with the reader at read uncommitted.
pub fn dirty_read() -> Scenario {
    dirty_read_at(IsolationLevel::ReadUncommitted)
}

/// Dirty read with a chosen reader isolation level.
///
/// trx1 inserts a log row and holds it uncommitted while trx2 counts the
/// table; only then does trx1 roll back. At read uncommitted the count
/// includes the doomed row; at read committed and above it must not.
pub fn dirty_read_at(reader_isolation: IsolationLevel) -> Scenario {
    let writer = TxnActor::new(
        "trx1",
        IsolationLevel::ReadCommitted,
        vec![
            Step::exec(
                "INSERT INTO logs (deposit_user_id, withdraw_user_id, amount) VALUES ($1, $2, $3)",
                vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(1)],
            ),
            Step::await_barrier(INSERTED),
            Step::await_barrier(COUNTED),
            Step::Rollback,
        ],
    );

    let reader = TxnActor::new(
        "trx2",
        reader_isolation,
        vec![
            Step::await_barrier(INSERTED),
            Step::query("SELECT count(*) FROM logs", vec![]),
            Step::await_barrier(COUNTED),
            Step::Commit,
        ],
    );

    Scenario {
        name: "dirty_read",
        summary: "uncommitted insert visible to a concurrent reader, then rolled back",
        fixture: "TRUNCATE TABLE logs;",
        actors: vec![writer, reader],
        probes: vec![Probe::new("rows_after_rollback", "SELECT count(*) FROM logs")],
        predicate: Box::new(|evidence| {
            let seen = evidence
                .actor("trx2")
                .and_then(|r| r.scalar(READER_COUNT_STEP));
            let after = evidence.probe_int("rows_after_rollback");
            Verdict::new(seen == Some(1))
                .detail("observed_count", fmt_opt(seen))
                .detail("rows_after_rollback", fmt_opt(after))
        }),
    }
}
