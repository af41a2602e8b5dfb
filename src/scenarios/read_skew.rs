use crate::IsolationLevel;
use crate::actor::TxnActor;
use crate::gateway::SqlValue;
use crate::scenario::{Probe, Scenario, Verdict};
use crate::scenarios::{WALLET_FIXTURE, fmt_opt};
use crate::step::Step;

const FIRST_READ: &str = "first-read";
const DEBIT_COMMITTED: &str = "debit-committed";

const FIRST_READ_STEP: usize = 0;
const SECOND_READ_STEP: usize = 3;

/// Read skew (non-repeatable read) with the reader at read committed.
pub fn read_skew() -> Scenario {
    read_skew_at(IsolationLevel::ReadCommitted)
}

/// Read skew with a chosen reader isolation level.
///
/// trx1 reads the wallet balance twice within one transaction; between the
/// two reads, trx2 debits 60000 and commits. At read committed the second
/// read observes 40000; at repeatable read and above both reads must return
/// the opening balance.
pub fn read_skew_at(reader_isolation: IsolationLevel) -> Scenario {
    let reader = TxnActor::new(
        "trx1",
        reader_isolation,
        vec![
            Step::query(
                "SELECT amount FROM wallets WHERE id = $1",
                vec![SqlValue::Int(1)],
            ),
            Step::await_barrier(FIRST_READ),
            Step::await_barrier(DEBIT_COMMITTED),
            Step::query(
                "SELECT amount FROM wallets WHERE id = $1",
                vec![SqlValue::Int(1)],
            ),
            Step::Commit,
        ],
    );

    let writer = TxnActor::new(
        "trx2",
        IsolationLevel::ReadCommitted,
        vec![
            Step::await_barrier(FIRST_READ),
            Step::exec(
                "UPDATE wallets SET amount = amount - $1 WHERE id = $2",
                vec![SqlValue::Int(60_000), SqlValue::Int(1)],
            ),
            Step::Commit,
            Step::await_barrier(DEBIT_COMMITTED),
        ],
    );

    Scenario {
        name: "read_skew",
        summary: "the same row read twice in one transaction returns two different values",
        fixture: WALLET_FIXTURE,
        actors: vec![reader, writer],
        probes: vec![Probe::new(
            "final_amount",
            "SELECT amount FROM wallets WHERE id = 1",
        )],
        predicate: Box::new(|evidence| {
            let reader = evidence.actor("trx1");
            let first = reader.and_then(|r| r.scalar(FIRST_READ_STEP));
            let second = reader.and_then(|r| r.scalar(SECOND_READ_STEP));
            let observed = match (first, second) {
                (Some(a), Some(b)) => a != b,
                _ => false,
            };
            Verdict::new(observed)
                .detail("first_read", fmt_opt(first))
                .detail("second_read", fmt_opt(second))
                .detail("final_amount", fmt_opt(evidence.probe_int("final_amount")))
        }),
    }
}
