use std::time::Duration;

use crate::IsolationLevel;
use crate::actor::TxnActor;
use crate::gateway::SqlValue;
use crate::scenario::{Probe, Scenario, Verdict};
use crate::scenarios::fmt_opt;
use crate::step::Step;

const LOCKS_HELD: &str = "locks-held";

const CREDIT_STEP: usize = 1;

/// How long trx1 keeps its exclusive row locks before rolling back.
const LOCK_HOLD: Duration = Duration::from_millis(1000);

const TRANSFER_FIXTURE: &str = "\
TRUNCATE TABLE wallets;
TRUNCATE TABLE logs;
INSERT INTO wallets (id, user_id, amount) VALUES (1, 1, 100000), (2, 2, 100000);";

fn transfer_steps() -> Vec<Step> {
    vec![
        Step::exec(
            "UPDATE wallets SET amount = amount + 1 WHERE user_id = $1",
            vec![SqlValue::Int(1)],
        ),
        Step::exec(
            "UPDATE wallets SET amount = amount - 1 WHERE user_id = $1",
            vec![SqlValue::Int(2)],
        ),
        Step::exec(
            "INSERT INTO logs (deposit_user_id, withdraw_user_id, amount) VALUES ($1, $2, $3)",
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(1)],
        ),
    ]
}

/// Concurrent transfers against the same wallets.
///
/// trx1 runs the credit/debit/log sequence and holds its exclusive row locks
/// before rolling back; trx2 runs the same sequence and must block on the
/// first update until trx1 releases. The observed phenomenon here is the
/// locks doing their job: trx2's write stalls for about the hold duration,
/// and the final state reflects trx2's transfer alone. Even the trx2 run at
/// read uncommitted cannot dirty-write past an exclusive row lock.
pub fn concurrent_transfer(blocked_threshold: Duration) -> Scenario {
    let mut holder_steps = transfer_steps();
    holder_steps.push(Step::await_barrier(LOCKS_HELD));
    holder_steps.push(Step::sleep(LOCK_HOLD));
    holder_steps.push(Step::Rollback);
    let holder = TxnActor::new("trx1", IsolationLevel::ReadCommitted, holder_steps);

    let mut blocked_steps = vec![Step::await_barrier(LOCKS_HELD)];
    blocked_steps.extend(transfer_steps());
    blocked_steps.push(Step::Commit);
    let blocked = TxnActor::new("trx2", IsolationLevel::ReadUncommitted, blocked_steps);

    Scenario {
        name: "concurrent_transfer",
        summary: "exclusive row locks serialize two concurrent transfers",
        fixture: TRANSFER_FIXTURE,
        actors: vec![holder, blocked],
        probes: vec![
            Probe::new("wallet1_amount", "SELECT amount FROM wallets WHERE id = 1"),
            Probe::new("wallet2_amount", "SELECT amount FROM wallets WHERE id = 2"),
            Probe::new("transfer_count", "SELECT count(*) FROM logs"),
        ],
        predicate: Box::new(move |evidence| {
            let blocked = evidence.actor("trx2");
            let credit_elapsed = blocked.and_then(|r| r.step(CREDIT_STEP)).map(|s| s.elapsed);
            let committed = blocked.is_some_and(|r| r.committed());
            let wallet1 = evidence.probe_int("wallet1_amount");
            let wallet2 = evidence.probe_int("wallet2_amount");
            let transfers = evidence.probe_int("transfer_count");

            // Only trx2's transfer survives: +1 / -1 and a single log row.
            let observed = committed
                && credit_elapsed.is_some_and(|elapsed| elapsed >= blocked_threshold)
                && wallet1 == Some(100_001)
                && wallet2 == Some(99_999)
                && transfers == Some(1);
            Verdict::new(observed)
                .detail(
                    "credit_blocked_ms",
                    credit_elapsed.map_or_else(|| "none".to_string(), |e| e.as_millis().to_string()),
                )
                .detail("blocked_threshold_ms", blocked_threshold.as_millis())
                .detail("wallet1_amount", fmt_opt(wallet1))
                .detail("wallet2_amount", fmt_opt(wallet2))
                .detail("transfer_count", fmt_opt(transfers))
        }),
    }
}
