use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use futures::future::join_all;
use log::{info, warn};

use crate::actor::ActorFate;
use crate::barrier::BarrierSet;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::gateway::{SqlGateway, SqlSession, SqlValue};
use crate::report::{AnomalyReport, Outcome};
use crate::scenario::{Evidence, Scenario};

/// Runs scenarios: fixture, fork, join, assert, report.
///
/// One concurrent task per actor, all launched together and joined before
/// the predicate is evaluated. The runner never retries a scenario: a run in
/// which the anomaly failed to reproduce is reported as such.
pub struct ScenarioRunner<G: SqlGateway> {
    gateway: G,
    barrier_timeout: Duration,
}

impl<G: SqlGateway> ScenarioRunner<G> {
    pub fn new(gateway: G, barrier_timeout: Duration) -> Self {
        Self {
            gateway,
            barrier_timeout,
        }
    }

    pub fn from_config(gateway: G, config: &Config) -> Self {
        Self::new(gateway, config.barrier_timeout())
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Executes one scenario run end to end and returns its report.
    ///
    /// Infrastructure failures (fixture, connections, begin, contract
    /// violations) return `Err`. Everything else, including actors aborted
    /// by step errors and anomalies that failed to manifest, completes with
    /// a report.
    pub async fn run(&self, scenario: Scenario) -> Result<AnomalyReport> {
        scenario.validate()?;
        if scenario.actors.len() > self.gateway.capacity() {
            return Err(Error::ConnectionLimit {
                needed: scenario.actors.len(),
                max: self.gateway.capacity(),
            });
        }

        info!("scenario {} starting: {}", scenario.name, scenario.summary);
        self.apply_fixture(scenario.fixture).await?;

        let barriers = Arc::new(BarrierSet::new(
            scenario.barrier_parties(),
            self.barrier_timeout,
        ));

        let Scenario {
            name,
            actors,
            probes,
            predicate,
            ..
        } = scenario;

        // Open every session up front so an unreachable backend is an
        // infrastructure error before any actor has started.
        let labels: Vec<String> = actors.iter().map(|a| a.label().to_string()).collect();
        let mut sessions = Vec::with_capacity(actors.len());
        for _ in &actors {
            sessions.push(self.gateway.session().await?);
        }

        let handles: Vec<_> = actors
            .into_iter()
            .zip(sessions)
            .map(|(actor, session)| tokio::spawn(actor.run(session, Arc::clone(&barriers))))
            .collect();

        let mut records = Vec::with_capacity(handles.len());
        for (label, joined) in labels.into_iter().zip(join_all(handles).await) {
            records.push(joined.map_err(|e| Error::ContractViolation {
                actor: label,
                cause: format!("actor task did not run to completion: {e}"),
            })?);
        }

        for record in &records {
            match &record.fate {
                ActorFate::Infrastructure(cause) => {
                    return Err(Error::Begin {
                        actor: record.actor.clone(),
                        cause: cause.clone(),
                    });
                }
                ActorFate::ContractViolation(cause) => {
                    return Err(Error::ContractViolation {
                        actor: record.actor.clone(),
                        cause: cause.clone(),
                    });
                }
                ActorFate::Aborted(cause) => {
                    warn!("actor {} aborted: {cause}", record.actor);
                }
                _ => {}
            }
        }

        let isolation = records
            .iter()
            .map(|r| (r.actor.clone(), r.isolation))
            .collect();

        let deserted: Vec<_> = records
            .iter()
            .filter(|r| matches!(r.fate, ActorFate::Deserted(_)))
            .map(|r| {
                let cause = match &r.fate {
                    ActorFate::Deserted(cause) => cause.clone(),
                    _ => String::new(),
                };
                (r.actor.clone(), cause)
            })
            .collect();

        if !deserted.is_empty() {
            let report = AnomalyReport {
                scenario: name.to_string(),
                outcome: Outcome::Inconclusive,
                isolation,
                evidence: deserted,
            };
            warn!("{report}");
            return Ok(report);
        }

        let probes = self.run_probes(&probes).await?;
        let evidence = Evidence {
            actors: records,
            probes,
        };
        let verdict = predicate(&evidence);

        let report = AnomalyReport {
            scenario: name.to_string(),
            outcome: if verdict.observed {
                Outcome::Observed
            } else {
                Outcome::Absent
            },
            isolation,
            evidence: verdict.details,
        };
        info!("{report}");
        Ok(report)
    }

    /// Applies a scenario fixture. Fixtures are idempotent truncate+seed
    /// blocks, so re-running a scenario always starts from the same state.
    pub async fn apply_fixture(&self, fixture: &str) -> Result<()> {
        let mut session = self.gateway.session().await?;
        session
            .batch(fixture)
            .await
            .map_err(|e| Error::Fixture(e.to_string()))
    }

    async fn run_probes(
        &self,
        probes: &[crate::scenario::Probe],
    ) -> Result<HashMap<String, SqlValue>> {
        let mut out = HashMap::new();
        if probes.is_empty() {
            return Ok(out);
        }
        let mut session = self.gateway.session().await?;
        for probe in probes {
            let rows = session
                .query(probe.sql, &[])
                .await
                .map_err(|e| Error::Fixture(format!("probe {} failed: {e}", probe.label)))?;
            let value = rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .ok_or_else(|| {
                    Error::Fixture(format!("probe {} returned no rows", probe.label))
                })?;
            out.insert(probe.label.to_string(), value);
        }
        Ok(out)
    }
}
