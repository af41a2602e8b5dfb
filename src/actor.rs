use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};

use crate::IsolationLevel;
use crate::barrier::BarrierSet;
use crate::gateway::SqlSession;
use crate::step::{Step, StepOutcome, StepResult};

/// Transaction lifecycle: `NotStarted → Active → {Committed, RolledBack}`.
/// The closed state is reached when the session is released, which happens on
/// every exit path once `run` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

/// One logical transaction: an ordered step sequence driven against a
/// dedicated session at a fixed isolation level.
#[derive(Debug, Clone)]
pub struct TxnActor {
    label: String,
    isolation: IsolationLevel,
    steps: Vec<Step>,
}

/// How an actor's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorFate {
    Committed,
    RolledBack,
    /// A step failed mid-transaction; the transaction was rolled back, the
    /// remaining steps were skipped, and sibling actors kept running.
    Aborted(String),
    /// A barrier wait was cancelled because it timed out or a party
    /// forfeited. The scenario outcome is inconclusive.
    Deserted(String),
    /// A step ran after the transaction reached a terminal state. Fatal for
    /// the whole scenario run.
    ContractViolation(String),
    /// The transaction could not be begun. Fatal for the whole scenario run.
    Infrastructure(String),
}

/// Everything one actor produced: its result log plus how it ended. This is
/// the per-actor slice of the evidence the anomaly predicate evaluates.
#[derive(Debug, Clone)]
pub struct ActorRecord {
    pub actor: String,
    pub isolation: IsolationLevel,
    pub log: Vec<StepResult>,
    pub fate: ActorFate,
}

impl ActorRecord {
    pub fn step(&self, index: usize) -> Option<&StepResult> {
        self.log.iter().find(|r| r.index == index)
    }

    /// The scalar captured by the query at `index`, if it completed and
    /// returned at least one integer-first row.
    pub fn scalar(&self, index: usize) -> Option<i64> {
        self.step(index).and_then(StepResult::scalar)
    }

    pub fn committed(&self) -> bool {
        self.fate == ActorFate::Committed
    }
}

impl TxnActor {
    pub fn new(
        label: impl Into<String>,
        isolation: IsolationLevel,
        steps: Vec<Step>,
    ) -> Self {
        Self {
            label: label.into(),
            isolation,
            steps,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Drives the step sequence to completion on `session`.
    ///
    /// Never panics and never returns early with the session still holding a
    /// transaction: whatever happens, the transaction is committed or rolled
    /// back exactly once before the session is dropped. A failed step aborts
    /// only this actor; its unreached barriers are forfeited so siblings
    /// waiting on them are released instead of hanging.
    pub async fn run<S: SqlSession>(self, mut session: S, barriers: Arc<BarrierSet>) -> ActorRecord {
        let mut state = TxnState::NotStarted;
        let mut log: Vec<StepResult> = Vec::with_capacity(self.steps.len());

        if let Err(e) = self.open(&mut session, &mut state).await {
            self.forfeit_from(&barriers, 0);
            return ActorRecord {
                actor: self.label.clone(),
                isolation: self.isolation,
                log,
                fate: ActorFate::Infrastructure(e.to_string()),
            };
        }

        let mut fate: Option<ActorFate> = None;

        for (index, step) in self.steps.iter().enumerate() {
            if state != TxnState::Active {
                let cause = format!(
                    "step {index} attempted after the transaction reached {state:?}"
                );
                warn!("{}: {cause}", self.label);
                self.forfeit_from(&barriers, index);
                fate = Some(ActorFate::ContractViolation(cause));
                break;
            }

            let started = Instant::now();
            let outcome = match step {
                Step::Query { sql, params } => match session.query(sql, params).await {
                    Ok(rows) => StepOutcome::Rows(rows),
                    Err(e) => StepOutcome::Failed(e.to_string()),
                },
                Step::Exec { sql, params } => match session.execute(sql, params).await {
                    Ok(affected) => StepOutcome::Affected(affected),
                    Err(e) => StepOutcome::Failed(e.to_string()),
                },
                Step::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    StepOutcome::Slept
                }
                Step::AwaitBarrier(name) => match barriers.wait(name).await {
                    Ok(()) => StepOutcome::Arrived(name.clone()),
                    Err(e) => {
                        let cause = e.to_string();
                        log.push(StepResult {
                            index,
                            outcome: StepOutcome::Failed(cause.clone()),
                            elapsed: started.elapsed(),
                        });
                        self.unwind(&mut session, &mut state).await;
                        self.forfeit_from(&barriers, index + 1);
                        fate = Some(ActorFate::Deserted(cause));
                        break;
                    }
                },
                Step::Commit => match session.commit().await {
                    Ok(()) => {
                        state = TxnState::Committed;
                        StepOutcome::Committed
                    }
                    Err(e) => StepOutcome::Failed(e.to_string()),
                },
                Step::Rollback => match session.rollback().await {
                    Ok(()) => {
                        state = TxnState::RolledBack;
                        StepOutcome::RolledBack
                    }
                    Err(e) => StepOutcome::Failed(e.to_string()),
                },
            };

            let failure = match &outcome {
                StepOutcome::Failed(cause) => {
                    debug!("{} step {index} failed: {cause}", self.label);
                    Some(cause.clone())
                }
                _ => None,
            };
            log.push(StepResult {
                index,
                outcome,
                elapsed: started.elapsed(),
            });

            if let Some(cause) = failure {
                self.unwind(&mut session, &mut state).await;
                self.forfeit_from(&barriers, index + 1);
                fate = Some(ActorFate::Aborted(cause));
                break;
            }
        }

        let fate = match fate {
            Some(fate) => fate,
            None => match state {
                TxnState::Committed => ActorFate::Committed,
                TxnState::RolledBack => ActorFate::RolledBack,
                TxnState::Active | TxnState::NotStarted => {
                    // The sequence ended without a terminal step; roll back so
                    // the commit-or-rollback-exactly-once invariant holds.
                    warn!(
                        "{} finished its steps with the transaction still open, rolling back",
                        self.label
                    );
                    self.unwind(&mut session, &mut state).await;
                    ActorFate::RolledBack
                }
            },
        };

        debug!("{} closed ({:?})", self.label, fate);
        // Dropping the session here releases the connection: the actor is
        // closed on every path through this function.
        ActorRecord {
            actor: self.label,
            isolation: self.isolation,
            log,
            fate,
        }
    }

    /// `NotStarted → Active`: opens the transaction at the configured
    /// isolation level.
    async fn open<S: SqlSession>(
        &self,
        session: &mut S,
        state: &mut TxnState,
    ) -> crate::errors::Result<()> {
        debug_assert_eq!(*state, TxnState::NotStarted);
        debug!("{} begin ({})", self.label, self.isolation);
        session.begin(self.isolation).await?;
        *state = TxnState::Active;
        Ok(())
    }

    async fn unwind<S: SqlSession>(&self, session: &mut S, state: &mut TxnState) {
        if *state == TxnState::Active {
            if let Err(e) = session.rollback().await {
                warn!("{} rollback during unwind failed: {e}", self.label);
            }
            *state = TxnState::RolledBack;
        }
    }

    /// Forfeits every barrier referenced at or after `from`, so that waiters
    /// on points this actor will now never reach are released.
    fn forfeit_from(&self, barriers: &BarrierSet, from: usize) {
        for step in &self.steps[from.min(self.steps.len())..] {
            if let Some(name) = step.barrier_name() {
                barriers.forfeit(name);
            }
        }
    }
}
