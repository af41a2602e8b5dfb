//! Shared test utilities: a scripted in-process gateway.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use apep::{Error, IsolationLevel, Result, SqlGateway, SqlRow, SqlSession, SqlValue};

/// One scripted reply, consumed by the next `query` or `execute` call.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<SqlRow>),
    Affected(u64),
    Fail(String),
}

/// The script one session plays back, in call order.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    replies: VecDeque<Reply>,
    on_begin: Option<String>,
    on_commit: Option<String>,
    on_batch: Option<String>,
}

impl SessionScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(mut self, rows: Vec<SqlRow>) -> Self {
        self.replies.push_back(Reply::Rows(rows));
        self
    }

    /// Scripts a single-row single-column integer result.
    pub fn scalar(self, value: i64) -> Self {
        self.rows(vec![vec![SqlValue::Int(value)]])
    }

    pub fn affected(mut self, count: u64) -> Self {
        self.replies.push_back(Reply::Affected(count));
        self
    }

    pub fn fail(mut self, cause: &str) -> Self {
        self.replies.push_back(Reply::Fail(cause.to_string()));
        self
    }

    pub fn begin_error(mut self, cause: &str) -> Self {
        self.on_begin = Some(cause.to_string());
        self
    }

    pub fn commit_error(mut self, cause: &str) -> Self {
        self.on_commit = Some(cause.to_string());
        self
    }

    pub fn batch_error(mut self, cause: &str) -> Self {
        self.on_batch = Some(cause.to_string());
        self
    }
}

/// Scripted gateway: hands out sessions in the order the scripts were given
/// and journals every call each session receives.
pub struct MockGateway {
    scripts: Mutex<VecDeque<std::result::Result<SessionScript, String>>>,
    journal: Arc<Mutex<Vec<String>>>,
    opened: Mutex<usize>,
    capacity: usize,
}

impl MockGateway {
    pub fn new(scripts: Vec<SessionScript>) -> Self {
        Self::with_connects(scripts.into_iter().map(Ok).collect())
    }

    /// Like `new`, but an `Err` entry makes the corresponding `session()`
    /// call fail as if the backend were unreachable.
    pub fn with_connects(scripts: Vec<std::result::Result<SessionScript, String>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            journal: Arc::new(Mutex::new(Vec::new())),
            opened: Mutex::new(0),
            capacity: usize::MAX,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    /// Journal entries for one session, in the order they happened.
    pub fn session_journal(&self, tag: usize) -> Vec<String> {
        let prefix = format!("s{tag}:");
        self.journal
            .lock()
            .iter()
            .filter(|line| line.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

impl SqlGateway for MockGateway {
    type Session = MockSession;

    async fn session(&self) -> Result<MockSession> {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(SessionScript::default()))
            .map_err(Error::Connect)?;
        let tag = {
            let mut opened = self.opened.lock();
            *opened += 1;
            *opened
        };
        Ok(MockSession {
            tag,
            script,
            journal: Arc::clone(&self.journal),
        })
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

pub struct MockSession {
    tag: usize,
    script: SessionScript,
    journal: Arc<Mutex<Vec<String>>>,
}

impl MockSession {
    fn note(&self, entry: String) {
        self.journal.lock().push(format!("s{}: {entry}", self.tag));
    }

    fn next_reply(&mut self) -> Result<Reply> {
        self.script
            .replies
            .pop_front()
            .ok_or_else(|| Error::Sql("script exhausted".to_string()))
    }
}

fn render(params: &[SqlValue]) -> String {
    params
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl SqlSession for MockSession {
    async fn begin(&mut self, isolation: IsolationLevel) -> Result<()> {
        self.note(format!("begin {isolation}"));
        match self.script.on_begin.take() {
            Some(cause) => Err(Error::Sql(cause)),
            None => Ok(()),
        }
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.note(format!("exec {sql} [{}]", render(params)));
        match self.next_reply()? {
            Reply::Affected(count) => Ok(count),
            Reply::Fail(cause) => Err(Error::Sql(cause)),
            Reply::Rows(_) => Err(Error::Sql("scripted rows reply for an exec call".to_string())),
        }
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        self.note(format!("query {sql} [{}]", render(params)));
        match self.next_reply()? {
            Reply::Rows(rows) => Ok(rows),
            Reply::Fail(cause) => Err(Error::Sql(cause)),
            Reply::Affected(_) => {
                Err(Error::Sql("scripted affected reply for a query call".to_string()))
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.note("commit".to_string());
        match self.script.on_commit.take() {
            Some(cause) => Err(Error::Sql(cause)),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        self.note("rollback".to_string());
        Ok(())
    }

    async fn batch(&mut self, sql: &str) -> Result<()> {
        let first = sql.lines().next().unwrap_or_default();
        self.note(format!("batch {first}"));
        match self.script.on_batch.take() {
            Some(cause) => Err(Error::Sql(cause)),
            None => Ok(()),
        }
    }
}
