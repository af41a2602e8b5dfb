use crate::IsolationLevel;
use crate::actor::TxnActor;
use crate::gateway::SqlValue;
use crate::scenario::{Probe, Scenario, Verdict};
use crate::scenarios::{OPENING_BALANCE, WALLET_FIXTURE, fmt_opt};
use crate::step::Step;

const BOTH_CHECKED: &str = "both-checked";
const FIRST_DEBIT_COMMITTED: &str = "first-debit-committed";

const READ_STEP: usize = 0;

const DEBIT: i64 = 60_000;

/// Write skew through a stale application-side balance check, at read
/// committed.
pub fn write_skew_debit() -> Scenario {
    write_skew_debit_at(IsolationLevel::ReadCommitted)
}

/// Write skew through a stale application-side balance check, at a chosen
/// isolation level.
///
/// Both actors read the balance (100000), and each decides in application
/// logic that a 60000 debit is permitted; the fixture guarantees both
/// decisions come out yes. Because the check and the debit are not atomic as
/// one relation operation, both debits apply and the balance lands at
/// -20000, below the floor either check alone would have allowed. Raising
/// the level does not reliably fix this one: snapshot-based repeatable read
/// engines abort the second debit, lock-based ones let it through.
pub fn write_skew_debit_at(isolation: IsolationLevel) -> Scenario {
    let first = TxnActor::new(
        "trx1",
        isolation,
        vec![
            Step::query(
                "SELECT amount FROM wallets WHERE id = $1",
                vec![SqlValue::Int(1)],
            ),
            Step::await_barrier(BOTH_CHECKED),
            Step::exec(
                "UPDATE wallets SET amount = amount - $1 WHERE id = $2",
                vec![SqlValue::Int(DEBIT), SqlValue::Int(1)],
            ),
            Step::Commit,
            Step::await_barrier(FIRST_DEBIT_COMMITTED),
        ],
    );

    let second = TxnActor::new(
        "trx2",
        isolation,
        vec![
            Step::query(
                "SELECT amount FROM wallets WHERE id = $1",
                vec![SqlValue::Int(1)],
            ),
            Step::await_barrier(BOTH_CHECKED),
            Step::await_barrier(FIRST_DEBIT_COMMITTED),
            Step::exec(
                "UPDATE wallets SET amount = amount - $1 WHERE id = $2",
                vec![SqlValue::Int(DEBIT), SqlValue::Int(1)],
            ),
            Step::Commit,
        ],
    );

    Scenario {
        name: "write_skew_debit",
        summary: "two debits each permitted by a balance check the other debit invalidates",
        fixture: WALLET_FIXTURE,
        actors: vec![first, second],
        probes: vec![Probe::new(
            "final_amount",
            "SELECT amount FROM wallets WHERE id = 1",
        )],
        predicate: Box::new(|evidence| {
            let trx1_read = evidence.actor("trx1").and_then(|r| r.scalar(READ_STEP));
            let trx2_read = evidence.actor("trx2").and_then(|r| r.scalar(READ_STEP));
            let final_amount = evidence.probe_int("final_amount");

            let observed = trx1_read == Some(OPENING_BALANCE)
                && trx2_read == Some(OPENING_BALANCE)
                && final_amount.is_some_and(|v| v < 0);
            Verdict::new(observed)
                .detail("trx1_read", fmt_opt(trx1_read))
                .detail("trx2_read", fmt_opt(trx2_read))
                .detail("debit", DEBIT)
                .detail("final_amount", fmt_opt(final_amount))
        }),
    }
}
