use crate::IsolationLevel;

/// Three-valued scenario outcome.
///
/// Anomalies are often probabilistic, and a backend may legitimately prevent
/// one (serializable stopping write skew, PostgreSQL refusing dirty reads),
/// so "did not manifest" is an expected, valid result, distinct from both
/// "manifested" and "could not be evaluated".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The targeted anomaly manifested.
    Observed,
    /// The run completed but the anomaly did not manifest.
    Absent,
    /// A barrier was cancelled before all parties arrived; the predicate
    /// could not be meaningfully evaluated.
    Inconclusive,
}

/// The structured result of one scenario run: what was targeted, whether it
/// manifested, under which isolation levels, and the captured evidence.
/// Rendered as a single human-readable log line by the runner; asserted on
/// directly by the test suite.
#[derive(Debug, Clone)]
pub struct AnomalyReport {
    pub scenario: String,
    pub outcome: Outcome,
    pub isolation: Vec<(String, IsolationLevel)>,
    pub evidence: Vec<(String, String)>,
}

impl AnomalyReport {
    pub fn observed(&self) -> bool {
        self.outcome == Outcome::Observed
    }

    pub fn evidence_value(&self, key: &str) -> Option<&str> {
        self.evidence
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for AnomalyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outcome = match self.outcome {
            Outcome::Observed => "anomaly observed",
            Outcome::Absent => "anomaly did not manifest",
            Outcome::Inconclusive => "inconclusive",
        };
        write!(f, "scenario {}: {outcome}", self.scenario)?;
        if !self.isolation.is_empty() {
            write!(f, " [")?;
            for (idx, (actor, level)) in self.isolation.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{actor}={level}")?;
            }
            write!(f, "]")?;
        }
        for (key, value) in &self.evidence {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}
