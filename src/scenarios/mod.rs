//! The built-in anomaly scenarios.
//!
//! Each scenario is a fixed [crate::Scenario] value, not new machinery: a
//! fixture, two interleaved actors, and a predicate over the captured
//! evidence. Interleavings are expressed with barriers so every run replays
//! the same global order; the only sleeps left are the ones that *are* the
//! semantics (how long a lock is held).
//!
//! Constructors take an isolation level or lock-probe parameter where the
//! interesting behavior flips between levels, so both sides can be exercised
//! without new scenario definitions.

mod dirty_read;
mod read_skew;
mod lost_update;
mod write_skew_insert;
mod write_skew_debit;
mod lock_escalation;
mod concurrent_transfer;

pub use concurrent_transfer::concurrent_transfer;
pub use dirty_read::{dirty_read, dirty_read_at};
pub use lock_escalation::{LockProbe, lock_escalation, lock_escalation_with};
pub use lost_update::lost_update;
pub use read_skew::{read_skew, read_skew_at};
pub use write_skew_debit::{write_skew_debit, write_skew_debit_at};
pub use write_skew_insert::{write_skew_insert, write_skew_insert_at};

/// Seeds wallet 1 for user 1 with the canonical opening balance.
pub(crate) const WALLET_FIXTURE: &str = "\
TRUNCATE TABLE wallets;
INSERT INTO wallets (id, user_id, amount) VALUES (1, 1, 100000);";

/// The canonical opening balance every wallet scenario starts from.
pub(crate) const OPENING_BALANCE: i64 = 100_000;

/// Renders a possibly-missing scalar for report evidence.
pub(crate) fn fmt_opt(value: Option<i64>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}
