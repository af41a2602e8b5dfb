use std::time::Duration;

use crate::IsolationLevel;
use crate::actor::TxnActor;
use crate::gateway::SqlValue;
use crate::scenario::{Probe, Scenario, Verdict};
use crate::scenarios::{WALLET_FIXTURE, fmt_opt};
use crate::step::Step;

const LOCK_HELD: &str = "lock-held";

const UPDATE_STEP: usize = 1;

/// How long trx1 keeps its lock before committing. trx2's update either
/// returns well under this (the lock never covered the clustered index) or
/// blocks for roughly this long.
const LOCK_HOLD: Duration = Duration::from_millis(1000);

/// How trx1 acquires its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockProbe {
    /// A share lock taken through a query the secondary index on `user_id`
    /// can answer alone. On engines that lock index records, nothing is
    /// taken on the clustered index, and a primary-key write slides past it.
    SharedSecondary,
    /// An exclusive lock via `FOR UPDATE`, which also covers the clustered
    /// index; the primary-key write must block until trx1 commits.
    ForUpdate,
}

impl LockProbe {
    fn sql(self) -> &'static str {
        match self {
            LockProbe::SharedSecondary => "SELECT id FROM wallets WHERE user_id = $1 FOR SHARE",
            LockProbe::ForUpdate => "SELECT id FROM wallets WHERE user_id = $1 FOR UPDATE",
        }
    }
}

/// Lock-escalation failure with the covering-index probe.
pub fn lock_escalation(blocked_threshold: Duration) -> Scenario {
    lock_escalation_with(LockProbe::SharedSecondary, blocked_threshold)
}

/// Lock-escalation failure with a chosen lock probe.
///
/// trx1 locks the wallet row through a secondary-index-only query and holds
/// the lock; trx2 updates the same logical row by primary key. The expected
/// behavior is that trx2 blocks until trx1 commits; the anomaly is trx2
/// completing immediately because the two transactions locked different
/// index structures for the same row. This one depends on engine-internal
/// index locking, so its ordering is inherently best-effort: the harness
/// reports the measured blocking time either way.
pub fn lock_escalation_with(probe: LockProbe, blocked_threshold: Duration) -> Scenario {
    let holder = TxnActor::new(
        "trx1",
        IsolationLevel::RepeatableRead,
        vec![
            Step::query(probe.sql(), vec![SqlValue::Int(1)]),
            Step::await_barrier(LOCK_HELD),
            Step::sleep(LOCK_HOLD),
            Step::Commit,
        ],
    );

    let updater = TxnActor::new(
        "trx2",
        IsolationLevel::RepeatableRead,
        vec![
            Step::await_barrier(LOCK_HELD),
            Step::exec(
                "UPDATE wallets SET amount = amount - $1 WHERE id = $2",
                vec![SqlValue::Int(10_000), SqlValue::Int(1)],
            ),
            Step::Commit,
        ],
    );

    Scenario {
        name: "lock_escalation",
        summary: "a share lock reachable only via the secondary index fails to block a primary-key write",
        fixture: WALLET_FIXTURE,
        actors: vec![holder, updater],
        probes: vec![Probe::new(
            "final_amount",
            "SELECT amount FROM wallets WHERE id = 1",
        )],
        predicate: Box::new(move |evidence| {
            let updater = evidence.actor("trx2");
            let update_elapsed = updater
                .and_then(|r| r.step(UPDATE_STEP))
                .map(|s| s.elapsed);
            let committed = updater.is_some_and(|r| r.committed());

            let observed = committed
                && update_elapsed.is_some_and(|elapsed| elapsed < blocked_threshold);
            Verdict::new(observed)
                .detail(
                    "update_ms",
                    update_elapsed.map_or_else(|| "none".to_string(), |e| e.as_millis().to_string()),
                )
                .detail("blocked_threshold_ms", blocked_threshold.as_millis())
                .detail("lock_hold_ms", LOCK_HOLD.as_millis())
                .detail("final_amount", fmt_opt(evidence.probe_int("final_amount")))
        }),
    }
}
