pub mod errors;
pub mod config;
pub mod gateway;
pub mod barrier;
pub mod step;
pub mod actor;
pub mod scenario;
pub mod scenarios;
pub mod runner;
pub mod report;
pub mod inspect;
pub mod seed;

// Re-export key types and structs for easier access
pub use errors::{Error, Result};
pub use config::Config;
pub use gateway::postgres::PgGateway;
pub use gateway::{SqlGateway, SqlRow, SqlSession, SqlValue};
pub use barrier::{BarrierSet, SyncPoint};
pub use step::{Step, StepOutcome, StepResult};
pub use actor::{ActorFate, ActorRecord, TxnActor};
pub use scenario::{Evidence, Probe, Scenario, Verdict};
pub use report::{AnomalyReport, Outcome};
pub use runner::ScenarioRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
///
/// Transaction isolation levels the harness can request from the database.
///
/// Each actor begins its transaction at exactly one of these levels; the
/// gateway forwards the requested level to the backend verbatim. A backend
/// that quietly maps one level onto another (PostgreSQL accepts
/// [IsolationLevel::ReadUncommitted] but runs it as read committed) shows up
/// in the scenario report as an anomaly that failed to manifest, not as an
/// error.
pub enum IsolationLevel {
    ///
    /// [IsolationLevel::ReadUncommitted] permits reading rows written by
    /// transactions that have not committed yet. The weakest level, and the
    /// only one under which a dirty read can be observed.
    ReadUncommitted,
    ///
    /// [IsolationLevel::ReadCommitted] guarantees every read observes only
    /// committed data. Two reads of the same row within one transaction may
    /// still return different values if another transaction commits a write
    /// between them.
    ReadCommitted,
    ///
    /// [IsolationLevel::RepeatableRead] guarantees that re-reading a row
    /// within one transaction returns the value first observed. Phantom rows
    /// and write skew remain possible, with the details depending on whether
    /// the engine implements this level with snapshots or with index-record
    /// locks.
    RepeatableRead,
    ///
    /// [IsolationLevel::Serializable] guarantees an outcome equivalent to
    /// some serial execution of the transactions. Under this level one of two
    /// write-skewing transactions must fail to commit.
    Serializable,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IsolationLevel::ReadUncommitted => "read uncommitted",
            IsolationLevel::ReadCommitted => "read committed",
            IsolationLevel::RepeatableRead => "repeatable read",
            IsolationLevel::Serializable => "serializable",
        };
        f.write_str(name)
    }
}
