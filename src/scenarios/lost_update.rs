use crate::IsolationLevel;
use crate::actor::TxnActor;
use crate::gateway::SqlValue;
use crate::scenario::{Probe, Scenario, Verdict};
use crate::scenarios::{OPENING_BALANCE, WALLET_FIXTURE, fmt_opt};
use crate::step::Step;

const BOTH_READ: &str = "both-read";
const FIRST_WRITE_COMMITTED: &str = "first-write-committed";

const READ_STEP: usize = 0;

const LATE_WRITE: i64 = 40_000;
const EARLY_WRITE: i64 = 60_000;

/// Lost update: two read-then-overwrite transactions on the same row.
///
/// Both actors read the opening balance, then each writes a value computed
/// from its own stale read. trx2 writes 60000 and commits first; trx1 writes
/// 40000 and commits last, silently erasing trx2's update. The anomaly is
/// observed when the final balance equals the last committer's literal write
/// rather than any merge of the two.
pub fn lost_update() -> Scenario {
    let late = TxnActor::new(
        "trx1",
        IsolationLevel::ReadCommitted,
        vec![
            Step::query(
                "SELECT amount FROM wallets WHERE id = $1",
                vec![SqlValue::Int(1)],
            ),
            Step::await_barrier(BOTH_READ),
            Step::await_barrier(FIRST_WRITE_COMMITTED),
            Step::exec(
                "UPDATE wallets SET amount = $1 WHERE id = $2",
                vec![SqlValue::Int(LATE_WRITE), SqlValue::Int(1)],
            ),
            Step::Commit,
        ],
    );

    let early = TxnActor::new(
        "trx2",
        IsolationLevel::ReadCommitted,
        vec![
            Step::query(
                "SELECT amount FROM wallets WHERE id = $1",
                vec![SqlValue::Int(1)],
            ),
            Step::await_barrier(BOTH_READ),
            Step::exec(
                "UPDATE wallets SET amount = $1 WHERE id = $2",
                vec![SqlValue::Int(EARLY_WRITE), SqlValue::Int(1)],
            ),
            Step::Commit,
            Step::await_barrier(FIRST_WRITE_COMMITTED),
        ],
    );

    Scenario {
        name: "lost_update",
        summary: "the later of two read-then-write commits silently erases the earlier one",
        fixture: WALLET_FIXTURE,
        actors: vec![late, early],
        probes: vec![Probe::new(
            "final_amount",
            "SELECT amount FROM wallets WHERE id = 1",
        )],
        predicate: Box::new(|evidence| {
            let trx1_read = evidence.actor("trx1").and_then(|r| r.scalar(READ_STEP));
            let trx2_read = evidence.actor("trx2").and_then(|r| r.scalar(READ_STEP));
            let early_committed = evidence.actor("trx2").is_some_and(|r| r.committed());
            let final_amount = evidence.probe_int("final_amount");

            let observed = trx1_read == Some(OPENING_BALANCE)
                && trx2_read == Some(OPENING_BALANCE)
                && early_committed
                && final_amount == Some(LATE_WRITE);
            Verdict::new(observed)
                .detail("trx1_read", fmt_opt(trx1_read))
                .detail("trx2_read", fmt_opt(trx2_read))
                .detail("trx2_write", EARLY_WRITE)
                .detail("trx1_write", LATE_WRITE)
                .detail("final_amount", fmt_opt(final_amount))
        }),
    }
}
