use ahash::AHashMap as HashMap;

use crate::actor::{ActorRecord, TxnActor};
use crate::errors::{Error, Result};
use crate::gateway::SqlValue;

/// A named scalar query the runner executes after every actor has closed,
/// capturing the database's final state for the predicate.
#[derive(Debug, Clone)]
pub struct Probe {
    pub label: &'static str,
    pub sql: &'static str,
}

impl Probe {
    pub fn new(label: &'static str, sql: &'static str) -> Self {
        Self { label, sql }
    }
}

/// The function that decides whether the targeted anomaly manifested, given
/// the captured evidence. It always yields the evidentiary values alongside
/// the boolean; a bare pass/fail without data is not a valid verdict.
pub type Predicate = Box<dyn Fn(&Evidence) -> Verdict + Send + Sync>;

/// A declarative description of one anomaly reproduction: an idempotent
/// fixture, the actors with their step sequences and isolation levels, final
/// state probes, and the anomaly predicate.
pub struct Scenario {
    pub name: &'static str,
    pub summary: &'static str,
    /// Idempotent truncate+seed SQL block, safe to apply repeatedly.
    pub fixture: &'static str,
    pub actors: Vec<TxnActor>,
    pub probes: Vec<Probe>,
    pub predicate: Predicate,
}

impl Scenario {
    /// Checks the scenario is well-formed before any actor launches: at
    /// least one actor, unique labels, and no actor referencing the same
    /// barrier twice (barriers are arrive-once within a run).
    pub fn validate(&self) -> Result<()> {
        if self.actors.is_empty() {
            return Err(self.invalid("scenario has no actors"));
        }

        let mut labels = HashMap::new();
        for actor in &self.actors {
            if labels.insert(actor.label().to_string(), ()).is_some() {
                return Err(self.invalid(format!("duplicate actor label {:?}", actor.label())));
            }

            let mut seen = HashMap::new();
            for step in actor.steps() {
                if let Some(name) = step.barrier_name() {
                    if seen.insert(name.to_string(), ()).is_some() {
                        return Err(self.invalid(format!(
                            "actor {:?} references barrier {name:?} more than once",
                            actor.label()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Party counts per barrier name: each point expects exactly one arrival
    /// from every actor that references it.
    pub fn barrier_parties(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for actor in &self.actors {
            for step in actor.steps() {
                if let Some(name) = step.barrier_name() {
                    *counts.entry(name.to_string()).or_insert(0) += 1;
                }
            }
        }
        counts.into_iter().collect()
    }

    fn invalid(&self, cause: impl Into<String>) -> Error {
        Error::InvalidScenario {
            scenario: self.name.to_string(),
            cause: cause.into(),
        }
    }
}

/// Everything a predicate may look at: the per-actor result logs and the
/// final-state probe values.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub actors: Vec<ActorRecord>,
    pub probes: HashMap<String, SqlValue>,
}

impl Evidence {
    pub fn new(
        actors: Vec<ActorRecord>,
        probes: impl IntoIterator<Item = (String, SqlValue)>,
    ) -> Self {
        Self {
            actors,
            probes: probes.into_iter().collect(),
        }
    }

    pub fn actor(&self, label: &str) -> Option<&ActorRecord> {
        self.actors.iter().find(|a| a.actor == label)
    }

    pub fn probe(&self, label: &str) -> Option<&SqlValue> {
        self.probes.get(label)
    }

    pub fn probe_int(&self, label: &str) -> Option<i64> {
        self.probes.get(label).and_then(SqlValue::as_int)
    }
}

/// A predicate's answer: did the anomaly manifest, and what was seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub observed: bool,
    pub details: Vec<(String, String)>,
}

impl Verdict {
    pub fn new(observed: bool) -> Self {
        Self {
            observed,
            details: Vec::new(),
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.push((key.into(), value.to_string()));
        self
    }
}
