use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to connect to database: {0}")]
    Connect(String),

    #[error("connection limit exhausted: scenario needs {needed} sessions but the pool allows {max}")]
    ConnectionLimit { needed: usize, max: usize },

    #[error("failed to apply fixture: {0}")]
    Fixture(String),

    #[error("actor {actor} failed to begin transaction: {cause}")]
    Begin { actor: String, cause: String },

    #[error("sql statement failed: {0}")]
    Sql(String),

    #[error("query returned no rows where exactly one was expected")]
    NoRows,

    #[error("failed to decode row: {0}")]
    Decode(String),

    #[error("unknown barrier {0:?}")]
    UnknownBarrier(String),

    #[error("barrier {0:?} timed out before all parties arrived")]
    BarrierTimeout(String),

    #[error("barrier {0:?} was broken: a party aborted before arriving")]
    BarrierBroken(String),

    #[error("barrier {0:?} received more arrivals than parties")]
    BarrierOverArrival(String),

    #[error("invalid scenario {scenario:?}: {cause}")]
    InvalidScenario { scenario: String, cause: String },

    #[error("actor {actor} violated the transaction contract: {cause}")]
    ContractViolation { actor: String, cause: String },
}

impl Error {
    /// Whether this error aborts the whole scenario run.
    ///
    /// Infrastructure errors (cannot connect, cannot begin, fixture failed)
    /// and contract violations terminate the run with a non-zero exit. Step
    /// failures and barrier cancellations are recovered locally and surface
    /// through the scenario report instead.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Connect(_)
                | Error::ConnectionLimit { .. }
                | Error::Fixture(_)
                | Error::Begin { .. }
                | Error::InvalidScenario { .. }
                | Error::ContractViolation { .. }
                | Error::BarrierOverArrival(_)
        )
    }

    /// Whether this error is a barrier cancellation (a party never arrived
    /// or the wait timed out), which makes the scenario outcome inconclusive
    /// rather than failed.
    pub fn is_barrier_cancellation(&self) -> bool {
        matches!(self, Error::BarrierTimeout(_) | Error::BarrierBroken(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
