use std::time::Duration;

use crate::gateway::{SqlRow, SqlValue};

/// One operation in an actor's ordered step sequence.
///
/// Steps execute strictly in order on the actor's dedicated session. Ordering
/// *between* actors exists only where their sequences share an
/// [Step::AwaitBarrier] point (or, best-effort, a [Step::Sleep]).
#[derive(Debug, Clone)]
pub enum Step {
    /// Runs a query and captures the returned rows into the result log.
    Query { sql: String, params: Vec<SqlValue> },
    /// Executes a statement and captures the affected-row count.
    Exec { sql: String, params: Vec<SqlValue> },
    /// Pauses the actor. Best-effort ordering only; scenarios that need a
    /// guaranteed interleaving use barriers instead.
    Sleep(Duration),
    /// Arrives at the named synchronization point and blocks until every
    /// referencing actor has arrived.
    AwaitBarrier(String),
    /// Commits the actor's transaction. Terminal: no further step may run.
    Commit,
    /// Rolls back the actor's transaction. Terminal: no further step may run.
    Rollback,
}

impl Step {
    pub fn query(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Step::Query {
            sql: sql.into(),
            params,
        }
    }

    pub fn exec(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Step::Exec {
            sql: sql.into(),
            params,
        }
    }

    pub fn sleep(duration: Duration) -> Self {
        Step::Sleep(duration)
    }

    pub fn await_barrier(name: impl Into<String>) -> Self {
        Step::AwaitBarrier(name.into())
    }

    /// The barrier name this step arrives at, if any.
    pub fn barrier_name(&self) -> Option<&str> {
        match self {
            Step::AwaitBarrier(name) => Some(name),
            _ => None,
        }
    }
}

/// What a completed (or failed) step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Rows(Vec<SqlRow>),
    Affected(u64),
    Slept,
    Arrived(String),
    Committed,
    RolledBack,
    Failed(String),
}

/// One entry in an actor's result log. Immutable once recorded; the log is
/// appended to as steps complete and is the raw evidence the anomaly
/// predicate works from.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub index: usize,
    pub outcome: StepOutcome,
    /// Wall-clock duration of the step. For statements this includes any
    /// time spent blocked on database locks, which is the signal the
    /// lock-escalation predicate reads.
    pub elapsed: Duration,
}

impl StepResult {
    /// The single scalar this step's query produced, if it produced exactly
    /// that shape (at least one row, first column an integer).
    pub fn scalar(&self) -> Option<i64> {
        match &self.outcome {
            StepOutcome::Rows(rows) => rows.first().and_then(|row| row.first())?.as_int(),
            _ => None,
        }
    }

    pub fn affected(&self) -> Option<u64> {
        match &self.outcome {
            StepOutcome::Affected(n) => Some(*n),
            _ => None,
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed(_))
    }
}
