use std::future::Future;

use crate::IsolationLevel;
use crate::errors::Result;

pub mod postgres;

/// A single database cell or statement parameter.
///
/// The harness only ever moves integers and text across the wire (wallet
/// amounts, row counts, identifiers, nicknames), so the value space is kept
/// deliberately small; a column of any other type is a decode error rather
/// than a silent lossy conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    Null,
}

impl SqlValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Null => f.write_str("NULL"),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

/// One decoded result row.
pub type SqlRow = Vec<SqlValue>;

/// One dedicated connection to the database, owning at most one transaction
/// at a time.
///
/// An actor holds exactly one session for its entire lifetime and never
/// shares it; all cross-actor coordination happens through barriers and the
/// database's own locks. Dropping the session releases the connection, which
/// is how an actor reaches its closed state on every exit path.
pub trait SqlSession: Send {
    /// Begins a transaction at the requested isolation level. The level must
    /// be forwarded to the backend exactly as requested.
    fn begin(&mut self, isolation: IsolationLevel) -> impl Future<Output = Result<()>> + Send;

    /// Executes a statement, returning the number of affected rows.
    fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Runs a query, returning zero or more decoded rows.
    fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<Vec<SqlRow>>> + Send;

    /// Commits the session's open transaction.
    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Rolls back the session's open transaction.
    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Executes a multi-statement SQL block outside any explicit
    /// transaction. Used for fixtures (truncate + seed).
    fn batch(&mut self, sql: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Hands out dedicated sessions, enforcing the configured connection limit.
///
/// This is the seam between the harness core and the backend: the runner and
/// the actors are generic over it, and the test suite substitutes a scripted
/// implementation the same way the backend one is swapped in production.
pub trait SqlGateway: Send + Sync {
    type Session: SqlSession + 'static;

    /// Opens a new dedicated session. Fails with an infrastructure error if
    /// the backend is unreachable or the connection limit is exhausted.
    fn session(&self) -> impl Future<Output = Result<Self::Session>> + Send;

    /// The maximum number of sessions that may be open at once. The runner
    /// checks a scenario's actor count against this before launching.
    fn capacity(&self) -> usize {
        usize::MAX
    }
}
