use crate::IsolationLevel;
use crate::actor::TxnActor;
use crate::gateway::SqlValue;
use crate::scenario::{Probe, Scenario, Verdict};
use crate::scenarios::{WALLET_FIXTURE, fmt_opt};
use crate::step::Step;

const BOTH_COUNTED: &str = "both-counted";
const BOTH_INSERTED: &str = "both-inserted";

const COUNT_STEP: usize = 0;

const BONUS_AMOUNT: i64 = 110_000;

/// Write skew through phantom inserts, at repeatable read.
pub fn write_skew_insert() -> Scenario {
    write_skew_insert_at(IsolationLevel::RepeatableRead)
}

/// Write skew through phantom inserts, at a chosen isolation level.
///
/// The business rule both actors enforce in application logic: a bonus
/// wallet may be opened only while fewer than two wallets exist. Each actor
/// counts the table (sees 1), decides the bonus is permitted, and inserts a
/// credited wallet the other's count never saw. At repeatable read both
/// commits succeed and the table ends up with two bonus wallets; at
/// serializable one of the two transactions must fail to commit.
pub fn write_skew_insert_at(isolation: IsolationLevel) -> Scenario {
    let actor = |label: &str, wallet_id: i64| {
        TxnActor::new(
            label,
            isolation,
            vec![
                Step::query("SELECT count(*) FROM wallets", vec![]),
                Step::await_barrier(BOTH_COUNTED),
                Step::exec(
                    "INSERT INTO wallets (id, user_id, amount) VALUES ($1, $2, $3)",
                    vec![
                        SqlValue::Int(wallet_id),
                        SqlValue::Int(wallet_id),
                        SqlValue::Int(BONUS_AMOUNT),
                    ],
                ),
                Step::await_barrier(BOTH_INSERTED),
                Step::Commit,
            ],
        )
    };

    Scenario {
        name: "write_skew_insert",
        summary: "two inserts each justified by a row count the other insert invalidates",
        fixture: WALLET_FIXTURE,
        actors: vec![actor("trx1", 2), actor("trx2", 3)],
        probes: vec![
            Probe::new("wallet_count", "SELECT count(*) FROM wallets"),
            Probe::new(
                "credited_count",
                "SELECT count(*) FROM wallets WHERE amount >= 110000",
            ),
        ],
        predicate: Box::new(|evidence| {
            let trx1 = evidence.actor("trx1");
            let trx2 = evidence.actor("trx2");
            let trx1_count = trx1.and_then(|r| r.scalar(COUNT_STEP));
            let trx2_count = trx2.and_then(|r| r.scalar(COUNT_STEP));
            let trx1_committed = trx1.is_some_and(|r| r.committed());
            let trx2_committed = trx2.is_some_and(|r| r.committed());
            let wallet_count = evidence.probe_int("wallet_count");

            let observed = trx1_count == Some(1)
                && trx2_count == Some(1)
                && trx1_committed
                && trx2_committed
                && wallet_count == Some(3);
            Verdict::new(observed)
                .detail("trx1_count", fmt_opt(trx1_count))
                .detail("trx2_count", fmt_opt(trx2_count))
                .detail("trx1_committed", trx1_committed)
                .detail("trx2_committed", trx2_committed)
                .detail("wallet_count", fmt_opt(wallet_count))
                .detail(
                    "credited_count",
                    fmt_opt(evidence.probe_int("credited_count")),
                )
        }),
    }
}
